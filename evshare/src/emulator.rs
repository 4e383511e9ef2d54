use crate::bus::{Notification, Observer, Remote};
use anyhow::Error;
use input::WriterManager;
use tokio::sync::mpsc::UnboundedSender;

/// Replays what the server sends on virtual devices. Failing to use uinput
/// at all is reported back to the connection loop, which treats it as fatal.
pub struct Emulator {
    writers: WriterManager,
    failures: UnboundedSender<Error>,
}

impl Emulator {
    pub fn new(failures: UnboundedSender<Error>) -> Self {
        Self {
            writers: WriterManager::new(),
            failures,
        }
    }
}

impl Observer for Emulator {
    fn on_notification(&mut self, notification: Notification) {
        let remote = match notification {
            Notification::Remote(remote) => remote,
            _ => return,
        };

        match remote {
            Remote::CreateDevices(descriptors) => match self.writers.create(descriptors) {
                Ok(created) => log::info!(
                    "{} virtual devices created, {} in total",
                    created,
                    self.writers.len()
                ),
                Err(err) => {
                    let _ = self.failures.send(err.into());
                }
            },
            Remote::Events { device, events } => {
                if let Err(err) = self.writers.emit(&device, &events) {
                    log::warn!("{:?}: {}", device, err);
                }
            }
            Remote::Closed => {
                if !self.writers.is_empty() {
                    log::info!("Destroying {} virtual devices", self.writers.len());
                }

                self.writers.destroy_all();
            }
        }
    }
}
