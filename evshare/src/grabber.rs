use crate::bus::{Notification, Observer};
use crate::focus::Focus;
use input::PhysicalDevice;
use std::sync::Arc;

/// A device that can be taken away from the local desktop.
pub trait Grab: Send + Sync + 'static {
    fn label(&self) -> String;
    fn grab(&self) -> Result<(), input::Error>;
    fn release(&self) -> Result<(), input::Error>;
    fn reopen(&self) -> Result<(), input::Error>;
}

impl Grab for PhysicalDevice {
    fn label(&self) -> String {
        self.path().display().to_string()
    }

    fn grab(&self) -> Result<(), input::Error> {
        PhysicalDevice::grab(self)
    }

    fn release(&self) -> Result<(), input::Error> {
        PhysicalDevice::release(self)
    }

    fn reopen(&self) -> Result<(), input::Error> {
        PhysicalDevice::reopen(self)
    }
}

/// Grabs every device while a remote client has focus and gives them back
/// when focus returns home.
pub struct Grabber<D> {
    devices: Vec<Arc<D>>,
}

impl<D: Grab> Grabber<D> {
    pub fn new(devices: Vec<Arc<D>>) -> Self {
        Self { devices }
    }

    pub fn apply(&self, focus: &Focus) {
        let grab = !focus.is_local();
        for device in &self.devices {
            apply_one(device.as_ref(), grab);
        }
    }
}

fn apply_one<D: Grab>(device: &D, grab: bool) {
    let operation = |device: &D| {
        if grab {
            device.grab()
        } else {
            device.release()
        }
    };

    let err = match operation(device) {
        Ok(()) => return,
        Err(err) => err,
    };

    let verb = if grab { "grab" } else { "release" };
    log::warn!("{}: {} failed, reopening: {}", device.label(), verb, err);

    if let Err(err) = device.reopen().and_then(|()| operation(device)) {
        log::error!("{}: {} failed again: {}", device.label(), verb, err);
    }
}

impl<D: Grab> Observer for Grabber<D> {
    fn on_notification(&mut self, notification: Notification) {
        if let Notification::Focus(focus) = notification {
            self.apply(&focus);
        }
    }
}
