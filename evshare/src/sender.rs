use crate::bus::{Notification, Observer};
use crate::focus::Transport;
use net::{DeviceEvent, Message};

/// Forwards local batches to whoever holds focus. Nothing leaves the machine
/// while the local sentinel does.
#[derive(Default)]
pub struct EventSender {
    target: Option<Transport>,
}

impl EventSender {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Observer for EventSender {
    fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Focus(focus) => self.target = focus.transport,
            Notification::Device(batch) => {
                let target = match &self.target {
                    Some(target) => target,
                    None => return,
                };

                // The receiving end closes every batch itself.
                let events: Vec<_> = batch
                    .events
                    .into_iter()
                    .filter(|event| !event.is_sync())
                    .collect();
                if events.is_empty() {
                    return;
                }

                let message = Message::DeviceEvent(DeviceEvent {
                    device: batch.device,
                    events,
                });
                if !target.send(message) {
                    log::debug!("Focused client is gone, dropping batch");
                }
            }
            _ => {}
        }
    }
}
