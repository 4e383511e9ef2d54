use crate::error::Error;
use crate::event::{DeviceDescriptor, InputEvent};
use crate::linux::event::{parse_raw, RAW_EVENT_SIZE};
use crate::linux::event_reader::{Batcher, PhysicalDevice};
use crate::linux::probe;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const EVENT_PATH: &str = "/dev/input";

const READ_BUFFER_EVENTS: usize = 64;
const REOPEN_DELAY: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Every `event*` node under `/dev/input`, in natural order.
pub fn discover() -> io::Result<Vec<PathBuf>> {
    discover_in(Path::new(EVENT_PATH))
}

fn discover_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            continue;
        }

        // Skip non input event files.
        if handler_name(&path)
            .map(|name| name.starts_with("event"))
            .unwrap_or(false)
        {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| natural_cmp(handler_name(a).unwrap_or(""), handler_name(b).unwrap_or("")));
    Ok(paths)
}

fn handler_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Handler and device name of every event node, for listings. Nodes that
/// cannot be queried are listed without a name.
pub fn list() -> io::Result<Vec<(String, Option<String>)>> {
    let mut entries = Vec::new();
    for path in discover()? {
        let name = probe::open(&path)
            .ok()
            .and_then(|file| probe::probe_name(&file).ok());

        entries.push((handler_name(&path).unwrap_or_default().to_owned(), name));
    }

    Ok(entries)
}

/// Turns user supplied device selectors into node paths. A selector is a
/// handler (`event3`), a path, or a device name; selectors matching nothing
/// are logged and skipped.
pub fn resolve(selectors: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for selector in selectors {
        let path = if is_handler(selector) {
            Some(Path::new(EVENT_PATH).join(selector))
        } else if selector.starts_with('/') {
            Some(PathBuf::from(selector))
        } else {
            find_by_name(selector)
        };

        match path {
            Some(path) if path.exists() => {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            Some(path) => log::error!("Device {} does not exist", path.display()),
            None => log::error!("No device named {:?}", selector),
        }
    }

    paths
}

fn is_handler(selector: &str) -> bool {
    selector
        .strip_prefix("event")
        .map(|number| !number.is_empty() && number.bytes().all(|byte| byte.is_ascii_digit()))
        .unwrap_or(false)
}

fn find_by_name(name: &str) -> Option<PathBuf> {
    let paths = match discover() {
        Ok(paths) => paths,
        Err(err) => {
            log::error!("Cannot list {}: {}", EVENT_PATH, err);
            return None;
        }
    };

    paths.into_iter().find(|path| {
        probe::open(path)
            .ok()
            .and_then(|file| probe::probe_name(&file).ok())
            .map(|found| found == name)
            .unwrap_or(false)
    })
}

/// Compares runs of digits by value, so `event10` sorts after `event9`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x = take_number(&mut a);
                let y = take_number(&mut b);
                let ordering = x
                    .trim_start_matches('0')
                    .len()
                    .cmp(&y.trim_start_matches('0').len())
                    .then_with(|| x.trim_start_matches('0').cmp(y.trim_start_matches('0')));

                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }

                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut number = String::new();
    while let Some(digit) = chars.next_if(|c| c.is_ascii_digit()) {
        number.push(digit);
    }

    number
}

/// Owns the physical devices being shared and the threads reading them.
pub struct ReaderManager {
    devices: Vec<Arc<PhysicalDevice>>,
    readers: Vec<JoinHandle<()>>,
}

impl ReaderManager {
    /// Opens every node. Nodes that cannot be opened or probed are skipped,
    /// as are our own virtual devices. Names are made unique, since remote
    /// ends address devices by name.
    pub fn open(paths: &[PathBuf]) -> Self {
        let mut devices = Vec::new();
        let mut names = HashSet::new();

        for path in paths {
            let mut device = match PhysicalDevice::open(path) {
                Ok(Some(device)) => device,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("Skipping {}: {}", path.display(), err);
                    continue;
                }
            };

            let name = unique_name(device.name(), &names);
            if name != device.name() {
                log::info!("{}: shared as {:?}", path.display(), name);
                device.rename(name.clone());
            }
            names.insert(name);

            devices.push(Arc::new(device));
        }

        Self {
            devices,
            readers: Vec::new(),
        }
    }

    pub fn devices(&self) -> &[Arc<PhysicalDevice>] {
        &self.devices
    }

    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .map(|device| device.descriptor().clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Starts one reader thread per device. Each batch is handed to
    /// `on_batch` with the name of the device it came from; batches from one
    /// device arrive in order.
    pub fn start<F>(&mut self, on_batch: F) -> Result<(), Error>
    where
        F: FnMut(&str, Vec<InputEvent>) + Clone + Send + 'static,
    {
        for device in &self.devices {
            let device = device.clone();
            let on_batch = on_batch.clone();
            let handle = thread::Builder::new()
                .name(format!("reader {}", device.path().display()))
                .spawn(move || read_loop(device, on_batch))?;

            self.readers.push(handle);
        }

        Ok(())
    }

    /// Gives every device back to the local desktop.
    pub fn release_all(&self) {
        for device in &self.devices {
            if let Err(err) = device.release() {
                log::warn!("{}: release failed: {}", device.path().display(), err);
            }
        }
    }
}

fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_owned();
    }

    (2..)
        .map(|n| format!("{} ({})", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_owned())
}

fn read_loop<F>(device: Arc<PhysicalDevice>, mut on_batch: F)
where
    F: FnMut(&str, Vec<InputEvent>),
{
    let mut batcher = Batcher::new();
    let mut buf = vec![0u8; RAW_EVENT_SIZE * READ_BUFFER_EVENTS];

    loop {
        match device.read_timeout(&mut buf, POLL_INTERVAL) {
            Ok(None) => continue,
            Ok(Some(0)) => {
                log::info!("{}: end of stream", device.path().display());
                return;
            }
            Ok(Some(len)) => {
                for event in parse_raw(&buf[..len]) {
                    if let Some(batch) = batcher.push(event) {
                        on_batch(device.name(), batch);
                    }
                }
            }
            // This happens if the device is disconnected.
            // In that case simply terminate the reading thread.
            Err(err) if err.raw_os_error() == Some(libc::ENODEV) => {
                log::warn!("{}: device removed", device.path().display());
                return;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                log::warn!("{}: read failed: {}", device.path().display(), err);
                batcher.reset();

                thread::sleep(REOPEN_DELAY);
                if let Err(err) = device.reopen() {
                    log::error!("{}: giving up: {}", device.path().display(), err);
                    return;
                }
            }
        }
    }
}
