use crate::error::Error;
use crate::event::{DeviceDescriptor, InputEvent, EV_SYN, SYN_DROPPED, SYN_REPORT};
use crate::linux::{event_writer, glue, probe};
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A physical event node we read from and can grab exclusively.
pub struct PhysicalDevice {
    path: PathBuf,
    descriptor: DeviceDescriptor,
    // Swapped out on reopen; readers hold their own clone while polling.
    file: Mutex<Arc<File>>,
    grabbed: AtomicBool,
}

impl PhysicalDevice {
    /// Opens and probes the node. Devices we synthesized ourselves carry a
    /// marked physical path and yield `None`, so they are never shared back.
    pub fn open(path: &Path) -> Result<Option<Self>, Error> {
        let file = probe::open(path)?;

        // Most devices without a physical path fail this query.
        if let Ok(phys) = probe::probe_phys(&file) {
            if event_writer::is_marked_phys(&phys) {
                log::debug!("{}: skipping virtual device", path.display());
                return Ok(None);
            }
        }

        let descriptor = probe::probe_file(&file, path)?;

        Ok(Some(Self {
            path: path.to_owned(),
            descriptor,
            file: Mutex::new(Arc::new(file)),
            grabbed: AtomicBool::new(false),
        }))
    }

    #[cfg(test)]
    pub(crate) fn from_file(path: &Path, descriptor: DeviceDescriptor, file: File) -> Self {
        Self {
            path: path.to_owned(),
            descriptor,
            file: Mutex::new(Arc::new(file)),
            grabbed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.descriptor.name = name;
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed.load(Ordering::SeqCst)
    }

    /// Takes the device away from every other reader, the local desktop
    /// included. Grabbing twice is a no-op.
    pub fn grab(&self) -> Result<(), Error> {
        self.set_grab(true)
    }

    pub fn release(&self) -> Result<(), Error> {
        self.set_grab(false)
    }

    fn set_grab(&self, grab: bool) -> Result<(), Error> {
        if self.is_grabbed() == grab {
            return Ok(());
        }

        let file = self.handle();
        unsafe { glue::eviocgrab(file.as_raw_fd(), grab as _) }
            .map_err(|err| Error::Io(err.into()))?;

        self.grabbed.store(grab, Ordering::SeqCst);
        log::debug!(
            "{}: {}",
            self.path.display(),
            if grab { "grabbed" } else { "released" }
        );

        Ok(())
    }

    /// Replaces the handle with a fresh one. A grab held through the old
    /// handle is carried over to the new one.
    pub fn reopen(&self) -> Result<(), Error> {
        let file = probe::open(&self.path)?;
        self.replace(file);

        log::info!("{}: reopened", self.path.display());
        if self.grabbed.swap(false, Ordering::SeqCst) {
            self.grab()?;
        }

        Ok(())
    }

    pub(crate) fn replace(&self, file: File) {
        *self.file.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(file);
    }

    /// Waits at most `timeout` for records on the current handle and reads
    /// them. `Ok(None)` means nothing arrived; the next call then picks up a
    /// handle swapped in by `reopen` meanwhile, which a grab may have made
    /// the only one the kernel still delivers to.
    pub fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let handle = self.handle();
        let mut pollfd = libc::pollfd {
            fd: handle.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let timeout = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout) };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        if ready == 0 {
            return Ok(None);
        }

        (&*handle).read(buf).map(Some)
    }

    fn handle(&self) -> Arc<File> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Groups records into the batches the kernel delimits with `SYN_REPORT`.
/// After a `SYN_DROPPED` everything up to and including the next report is
/// thrown away, since the batch is incomplete.
#[derive(Debug, Default)]
pub(crate) struct Batcher {
    pending: Vec<InputEvent>,
    dropping: bool,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a finished batch, without its closing report.
    pub fn push(&mut self, event: InputEvent) -> Option<Vec<InputEvent>> {
        match (event.type_, event.code) {
            (EV_SYN, SYN_REPORT) => {
                if self.dropping {
                    self.dropping = false;
                    self.pending.clear();
                    return None;
                }

                if self.pending.is_empty() {
                    return None;
                }

                Some(std::mem::take(&mut self.pending))
            }
            (EV_SYN, SYN_DROPPED) => {
                log::debug!("Events dropped by the kernel, discarding partial batch");
                self.dropping = true;
                self.pending.clear();
                None
            }
            _ => {
                if !self.dropping {
                    self.pending.push(event);
                }

                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.dropping = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EV_KEY, EV_MSC, EV_REL};

    #[test]
    fn batches_end_at_reports() {
        let mut batcher = Batcher::new();
        assert_eq!(batcher.push(InputEvent::new(EV_MSC, 4, 458_756)), None);
        assert_eq!(batcher.push(InputEvent::new(EV_KEY, 30, 1)), None);

        let batch = batcher.push(InputEvent::sync()).unwrap();
        assert_eq!(
            batch,
            vec![InputEvent::new(EV_MSC, 4, 458_756), InputEvent::new(EV_KEY, 30, 1)]
        );
    }

    #[test]
    fn empty_reports_yield_nothing() {
        let mut batcher = Batcher::new();
        assert_eq!(batcher.push(InputEvent::sync()), None);
    }

    #[test]
    fn dropped_batches_are_discarded() {
        let mut batcher = Batcher::new();
        batcher.push(InputEvent::new(EV_REL, 0, 5));
        assert_eq!(batcher.push(InputEvent::new(EV_SYN, SYN_DROPPED, 0)), None);
        batcher.push(InputEvent::new(EV_REL, 1, 3));
        assert_eq!(batcher.push(InputEvent::sync()), None);

        batcher.push(InputEvent::new(EV_REL, 0, -2));
        assert_eq!(
            batcher.push(InputEvent::sync()),
            Some(vec![InputEvent::new(EV_REL, 0, -2)])
        );
    }

    #[test]
    fn reset_forgets_state() {
        let mut batcher = Batcher::new();
        batcher.push(InputEvent::new(EV_SYN, SYN_DROPPED, 0));
        batcher.reset();
        batcher.push(InputEvent::new(EV_KEY, 2, 0));
        assert_eq!(
            batcher.push(InputEvent::sync()),
            Some(vec![InputEvent::new(EV_KEY, 2, 0)])
        );
    }
}
