//! In-process publish/subscribe. Every observer gets its own unbounded queue
//! and its own thread, so publishing never blocks and a slow observer only
//! delays itself.

use crate::focus::{Focus, Transport};
use crate::shortcut::Action;
use input::{DeviceDescriptor, InputEvent};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, UnboundedSender};

/// One batch read from a local physical device.
#[derive(Clone, Debug)]
pub struct DeviceBatch {
    pub device: String,
    pub events: Vec<InputEvent>,
}

#[derive(Clone, Debug)]
pub enum Connection {
    Made {
        identification: String,
        transport: Transport,
    },
    Lost {
        identification: String,
        transport: Transport,
    },
}

/// What the server told a client.
#[derive(Clone, Debug)]
pub enum Remote {
    CreateDevices(Vec<DeviceDescriptor>),
    Events {
        device: String,
        events: Vec<InputEvent>,
    },
    Closed,
}

#[derive(Clone, Debug)]
pub enum Notification {
    Device(DeviceBatch),
    Shortcut(Action),
    Focus(Focus),
    Connection(Connection),
    Remote(Remote),
}

pub trait Observer: Send + 'static {
    fn on_notification(&mut self, notification: Notification);
}

static NEXT_SUBSCRIPTION: AtomicUsize = AtomicUsize::new(0);

/// A running observer.
pub struct Subscription {
    id: usize,
    name: String,
    queue: UnboundedSender<Notification>,
    worker: JoinHandle<()>,
}

impl Subscription {
    #[cfg(test)]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Detaches the observer, lets it drain what is already queued and
    /// waits for it to finish. The observer is dropped on its own thread.
    pub fn stop(self, subject: &Subject) {
        subject.detach(self.id);
        drop(self.queue);

        if self.worker.join().is_err() {
            log::error!("Observer {} panicked", self.name);
        }
    }
}

/// Starts `observer` on a thread of its own.
pub fn spawn<O: Observer>(name: &str, mut observer: O) -> io::Result<Subscription> {
    let (queue, mut receiver) = mpsc::unbounded_channel();
    let worker = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            while let Some(notification) = receiver.blocking_recv() {
                observer.on_notification(notification);
            }
        })?;

    Ok(Subscription {
        id: NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed),
        name: name.to_owned(),
        queue,
        worker,
    })
}

/// The publishing side. Clones share one list of observers.
#[derive(Clone, Default)]
pub struct Subject {
    observers: Arc<Mutex<Vec<(usize, UnboundedSender<Notification>)>>>,
}

impl Subject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, subscription: &Subscription) {
        let mut observers = self.lock();
        if observers.iter().any(|(id, _)| *id == subscription.id) {
            return;
        }

        observers.push((subscription.id, subscription.queue.clone()));
    }

    pub fn detach(&self, id: usize) {
        self.lock().retain(|(attached, _)| *attached != id);
    }

    /// Queues the notification for every attached observer, in attach order.
    /// Observers whose thread is gone are dropped from the list.
    pub fn notify(&self, notification: Notification) {
        self.lock()
            .retain(|(_, queue)| queue.send(notification.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(usize, UnboundedSender<Notification>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
