use crate::bits::BitSet;
use crate::error::Error;
use crate::event::{self, AxisInfo, Capabilities, Capability, DeviceDescriptor, Properties};
use crate::linux::glue;
use libc::c_int;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

type StringQuery = unsafe fn(RawFd, &mut [u8]) -> nix::Result<c_int>;

pub(crate) fn open(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::DeviceAccess {
            path: path.to_owned(),
            source,
        })
}

/// Describes the device behind an event node: identity, properties, and every
/// event type and code it reports, with calibration for absolute axes.
pub fn probe(path: &Path) -> Result<DeviceDescriptor, Error> {
    let file = open(path)?;
    probe_file(&file, path)
}

pub(crate) fn probe_file(file: &File, path: &Path) -> Result<DeviceDescriptor, Error> {
    let fd = file.as_raw_fd();

    let mut id = glue::input_id::default();
    if let Err(err) = unsafe { glue::eviocgid(fd, &mut id) } {
        log::warn!("{}: EVIOCGID failed: {}", path.display(), err);
        id = glue::input_id::default();
    }

    let name = query_string(fd, glue::eviocgname).unwrap_or_else(|err| {
        log::warn!("{}: EVIOCGNAME failed: {}", path.display(), err);
        String::new()
    });

    // Not every device has a physical topology or a unique id.
    let phys = query_string(fd, glue::eviocgphys).unwrap_or_else(|err| {
        log::debug!("{}: no physical path: {}", path.display(), err);
        String::new()
    });
    let unique = query_string(fd, glue::eviocguniq).unwrap_or_else(|err| {
        log::debug!("{}: no unique id: {}", path.display(), err);
        String::new()
    });

    let mut properties = Properties::new();
    if let Err(err) = unsafe { glue::eviocgprop(fd, properties.as_mut_bytes()) } {
        log::warn!("{}: EVIOCGPROP failed: {}", path.display(), err);
        properties = Properties::new();
    }

    let capabilities = probe_capabilities(fd, path)?;

    log::info!("{}: found {:?}", path.display(), name);
    for type_ in capabilities.types() {
        log::info!("{}: supports {}", path.display(), event::type_name(type_));
    }

    Ok(DeviceDescriptor {
        bustype: id.bustype,
        vendor: id.vendor,
        product: id.product,
        version: id.version,
        name,
        phys,
        unique,
        properties,
        capabilities,
    })
}

/// Reads only the device name, for listings.
pub(crate) fn probe_name(file: &File) -> io::Result<String> {
    query_string(file.as_raw_fd(), glue::eviocgname)
}

pub(crate) fn probe_phys(file: &File) -> io::Result<String> {
    query_string(file.as_raw_fd(), glue::eviocgphys)
}

fn query_string(fd: RawFd, query: StringQuery) -> io::Result<String> {
    let mut buf = [0u8; glue::MAX_NAME_SIZE];
    unsafe { query(fd, &mut buf) }?;
    Ok(glue::c_buf_to_string(&buf))
}

/// Two passes: the event type bitmask first, then the code bitmask of every
/// type found, in ascending order.
fn probe_capabilities(fd: RawFd, path: &Path) -> Result<Capabilities, Error> {
    let mut types = BitSet::<{ event::EV_CNT / 8 }>::new();
    unsafe { glue::eviocgbit(fd, 0, types.as_mut_bytes()) }.map_err(|err| {
        Error::CapabilityQuery {
            path: path.to_owned(),
            query: "EVIOCGBIT",
            source: err.into(),
        }
    })?;

    let mut capabilities = Capabilities::new();
    for type_ in types.ones() {
        let type_ = type_ as u16;

        let mut codes = BitSet::<{ glue::CODE_BITS_SIZE }>::new();
        if let Err(err) = unsafe { glue::eviocgbit(fd, type_, codes.as_mut_bytes()) } {
            log::warn!(
                "{}: cannot enumerate codes of {}: {}",
                path.display(),
                event::type_name(type_),
                err
            );
            continue;
        }

        capabilities.declare(type_);
        for code in codes.ones() {
            let code = code as u16;
            let capability = if type_ == event::EV_ABS {
                Capability::Axis {
                    code,
                    info: probe_axis(fd, code, path),
                }
            } else {
                Capability::Code(code)
            };

            capabilities.insert(type_, capability);
        }
    }

    Ok(capabilities)
}

fn probe_axis(fd: RawFd, code: u16, path: &Path) -> AxisInfo {
    let mut raw = glue::input_absinfo::default();
    if let Err(err) = unsafe { glue::eviocgabs(fd, code, &mut raw) } {
        log::warn!("{}: EVIOCGABS({:#x}) failed: {}", path.display(), code, err);
        return AxisInfo::default();
    }

    AxisInfo {
        value: raw.value,
        minimum: raw.minimum,
        maximum: raw.maximum,
        fuzz: raw.fuzz,
        flat: raw.flat,
        resolution: raw.resolution,
    }
}
