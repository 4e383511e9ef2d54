use crate::error::Error;
use crate::event::{self, Capability, DeviceDescriptor, InputEvent, EV_REP, EV_SYN};
use crate::linux::glue;
use bytemuck::Zeroable;
use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

const UINPUT_PATH: &str = "/dev/uinput";
const OPEN_STEP: &str = "open /dev/uinput";

/// Leads the physical path of every device we synthesize.
const PHYS_MARKER: &str = "evshare/";

/// Physical path for the replica of a device with `phys`. The identity block
/// stays untouched, since applications key device mappings on it.
pub(crate) fn marked_phys(phys: &str) -> String {
    format!("{}{}", PHYS_MARKER, phys)
}

pub(crate) fn is_marked_phys(phys: &str) -> bool {
    phys.starts_with(PHYS_MARKER)
}

/// A uinput device replicating a remote physical one.
pub struct VirtualDevice {
    name: String,
    file: Option<File>,
}

impl VirtualDevice {
    /// Synthesizes the device. Individual capabilities the kernel refuses are
    /// logged and left out; only failing to open uinput or to create the
    /// device at all is an error.
    pub fn new(mut descriptor: DeviceDescriptor) -> Result<Self, Error> {
        let name = descriptor.name.clone();
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(UINPUT_PATH)
            .map_err(|source| Error::Synthesis {
                name: name.clone(),
                step: OPEN_STEP,
                source,
            })?;
        let fd = file.as_raw_fd();

        let capabilities = std::mem::take(&mut descriptor.capabilities);
        for (type_, codes) in capabilities {
            enable_type(fd, &name, type_, codes);
        }

        for property in descriptor.properties.ones() {
            if let Err(err) = unsafe { glue::ui_set_propbit(fd, property as _) } {
                log::warn!("{:?}: UI_SET_PROPBIT({}) failed: {}", name, property, err);
            }
        }

        match CString::new(marked_phys(&descriptor.phys)) {
            Ok(phys) => {
                if let Err(err) = unsafe { glue::ui_set_phys(fd, phys.as_ptr()) } {
                    log::warn!("{:?}: UI_SET_PHYS failed: {}", name, err);
                }
            }
            Err(err) => log::warn!("{:?}: unusable physical path: {}", name, err),
        }

        let mut setup = glue::uinput_setup::zeroed();
        setup.id = glue::input_id {
            bustype: descriptor.bustype,
            vendor: descriptor.vendor,
            product: descriptor.product,
            version: descriptor.version,
        };
        glue::fill_c_buf(&mut setup.name, &name);

        unsafe { glue::ui_dev_setup(fd, &setup) }
            .map_err(|err| synthesis_error(&name, "UI_DEV_SETUP", err))?;
        unsafe { glue::ui_dev_create(fd) }
            .map_err(|err| synthesis_error(&name, "UI_DEV_CREATE", err))?;

        log::info!("Created virtual device {:?}", name);

        Ok(Self {
            name,
            file: Some(file),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes the batch followed by a `SYN_REPORT`.
    pub fn emit(&mut self, events: &[InputEvent]) -> Result<(), Error> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::AlreadyDestroyed(self.name.clone()))?;

        write_batch(file, events)?;
        Ok(())
    }

    pub fn destroy(&mut self) -> Result<(), Error> {
        let file = self
            .file
            .take()
            .ok_or_else(|| Error::AlreadyDestroyed(self.name.clone()))?;

        unsafe { glue::ui_dev_destroy(file.as_raw_fd()) }.map_err(|err| Error::Io(err.into()))?;
        log::info!("Destroyed virtual device {:?}", self.name);

        Ok(())
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if self.file.is_none() {
            return;
        }

        if let Err(err) = self.destroy() {
            log::warn!("{}", err);
        }
    }
}

fn synthesis_error(name: &str, step: &'static str, err: nix::errno::Errno) -> Error {
    Error::Synthesis {
        name: name.to_owned(),
        step,
        source: err.into(),
    }
}

fn enable_type(fd: RawFd, name: &str, type_: u16, codes: Vec<Capability>) {
    let setter = glue::code_setter(type_);
    if setter.is_none() && type_ != EV_SYN && type_ != EV_REP {
        log::warn!("{:?}: skipping unsupported {}", name, event::type_name(type_));
        return;
    }

    if let Err(err) = unsafe { glue::ui_set_evbit(fd, type_ as _) } {
        log::warn!("{:?}: UI_SET_EVBIT({}) failed: {}", name, event::type_name(type_), err);
        return;
    }

    // The kernel handles autorepeat itself once the type bit is set.
    let setter = match setter {
        Some(setter) => setter,
        None => return,
    };

    for capability in codes {
        let code = capability.code();
        if let Err(err) = unsafe { setter(fd, code as _) } {
            log::warn!(
                "{:?}: enabling {} code {:#x} failed: {}",
                name,
                event::type_name(type_),
                code,
                err
            );
            continue;
        }

        if let Capability::Axis { info, .. } = capability {
            let setup = glue::uinput_abs_setup {
                code,
                absinfo: glue::input_absinfo {
                    value: info.value,
                    minimum: info.minimum,
                    maximum: info.maximum,
                    fuzz: info.fuzz,
                    flat: info.flat,
                    resolution: info.resolution,
                },
            };

            if let Err(err) = unsafe { glue::ui_abs_setup(fd, &setup) } {
                log::warn!("{:?}: UI_ABS_SETUP({:#x}) failed: {}", name, code, err);
            }
        }
    }
}

/// Exactly `events.len() + 1` raw records go out in a single write.
pub(crate) fn write_batch<W: Write>(writer: &mut W, events: &[InputEvent]) -> io::Result<()> {
    let mut raw: Vec<glue::input_event> = events.iter().map(InputEvent::to_raw).collect();
    raw.push(InputEvent::sync().to_raw());

    writer.write_all(bytemuck::cast_slice(&raw))
}

/// Virtual devices by the name of the device they replicate.
#[derive(Default)]
pub struct WriterManager {
    writers: HashMap<String, VirtualDevice>,
}

impl WriterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesizes every device not yet present and returns how many were
    /// created. A device the kernel refuses is logged and skipped; not being
    /// able to use uinput at all is an error.
    pub fn create(&mut self, descriptors: Vec<DeviceDescriptor>) -> Result<usize, Error> {
        let mut created = 0;

        for descriptor in descriptors {
            if self.writers.contains_key(&descriptor.name) {
                log::debug!("Virtual device {:?} already exists", descriptor.name);
                continue;
            }

            let name = descriptor.name.clone();
            match VirtualDevice::new(descriptor) {
                Ok(writer) => {
                    self.writers.insert(name, writer);
                    created += 1;
                }
                Err(err @ Error::Synthesis { step: OPEN_STEP, .. }) => return Err(err),
                Err(err) => log::error!("{}", err),
            }
        }

        Ok(created)
    }

    /// Events for a device we never created are dropped.
    pub fn emit(&mut self, device: &str, events: &[InputEvent]) -> Result<(), Error> {
        match self.writers.get_mut(device) {
            Some(writer) => writer.emit(events),
            None => {
                log::warn!("Events for unknown device {:?} dropped", device);
                Ok(())
            }
        }
    }

    pub fn destroy_all(&mut self) {
        for (_, mut writer) in self.writers.drain() {
            if let Err(err) = writer.destroy() {
                log::warn!("{}", err);
            }
        }
    }

    pub fn contains(&self, device: &str) -> bool {
        self.writers.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EV_KEY, EV_REL};
    use crate::linux::event::{parse_raw, RAW_EVENT_SIZE};

    #[test]
    fn batch_is_followed_by_one_report() {
        let events = [InputEvent::new(EV_REL, 0, 3), InputEvent::new(EV_REL, 1, -1)];
        let mut written = Vec::new();
        write_batch(&mut written, &events).unwrap();

        assert_eq!(written.len(), (events.len() + 1) * RAW_EVENT_SIZE);
        let parsed: Vec<_> = parse_raw(&written).collect();
        assert_eq!(&parsed[..2], &events[..]);
        assert!(parsed[2].is_sync());
    }

    #[test]
    fn empty_batch_is_a_lone_report() {
        let mut written = Vec::new();
        write_batch(&mut written, &[]).unwrap();
        assert_eq!(written.len(), RAW_EVENT_SIZE);
    }

    #[test]
    fn destroyed_device_refuses_work() {
        let mut device = VirtualDevice {
            name: "keyboard".to_owned(),
            file: None,
        };

        assert!(matches!(
            device.destroy(),
            Err(Error::AlreadyDestroyed(name)) if name == "keyboard"
        ));
        assert!(matches!(
            device.emit(&[InputEvent::new(EV_KEY, 30, 1)]),
            Err(Error::AlreadyDestroyed(_))
        ));
    }

    #[test]
    fn replicas_are_recognizable() {
        let phys = marked_phys("usb-0000:00:14.0-1/input0");
        assert_eq!(phys, "evshare/usb-0000:00:14.0-1/input0");
        assert!(is_marked_phys(&phys));
        assert!(is_marked_phys(&marked_phys("")));
        assert!(!is_marked_phys("usb-0000:00:14.0-1/input0"));
        assert!(!is_marked_phys(""));
    }

    #[test]
    fn unknown_devices_are_ignored() {
        let mut manager = WriterManager::new();
        assert!(manager.emit("nowhere", &[InputEvent::new(EV_KEY, 30, 1)]).is_ok());
        assert!(manager.is_empty());
        manager.destroy_all();
    }
}
