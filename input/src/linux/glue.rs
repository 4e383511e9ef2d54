//! Kernel ABI for evdev and uinput: the structs from `linux/input.h` and
//! `linux/uinput.h` with their exact layout, and the ioctls we issue.

#![allow(non_camel_case_types)]

use bytemuck::{Pod, Zeroable};
use libc::{c_char, c_int, c_void};
use nix::errno::Errno;
use std::mem;
use std::os::unix::io::RawFd;

use crate::event::{EV_ABS, EV_KEY, EV_LED, EV_MSC, EV_REL, EV_SND, EV_SW};

pub const UINPUT_MAX_NAME_SIZE: usize = 80;

/// Size of the buffers handed to the string queries.
pub const MAX_NAME_SIZE: usize = 256;

/// `EVIOCGBIT` buffer for one event type, wide enough for 2048 codes.
pub const CODE_BITS_SIZE: usize = 2048 / 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct timeval {
    pub tv_sec: libc::time_t,
    pub tv_usec: libc::suseconds_t,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct input_event {
    pub time: timeval,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct input_id {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct input_absinfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable)]
pub struct uinput_setup {
    pub id: input_id,
    pub name: [c_char; UINPUT_MAX_NAME_SIZE],
    pub ff_effects_max: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable)]
pub struct uinput_abs_setup {
    pub code: u16,
    pub absinfo: input_absinfo,
}

nix::ioctl_read!(eviocgid, b'E', 0x02, input_id);
nix::ioctl_read_buf!(eviocgname, b'E', 0x06, u8);
nix::ioctl_read_buf!(eviocgphys, b'E', 0x07, u8);
nix::ioctl_read_buf!(eviocguniq, b'E', 0x08, u8);
nix::ioctl_read_buf!(eviocgprop, b'E', 0x09, u8);
nix::ioctl_write_int!(eviocgrab, b'E', 0x90);

nix::ioctl_none!(ui_dev_create, b'U', 1);
nix::ioctl_none!(ui_dev_destroy, b'U', 2);
nix::ioctl_write_ptr!(ui_dev_setup, b'U', 3, uinput_setup);
nix::ioctl_write_ptr!(ui_abs_setup, b'U', 4, uinput_abs_setup);
nix::ioctl_write_int!(ui_set_evbit, b'U', 100);
nix::ioctl_write_int!(ui_set_keybit, b'U', 101);
nix::ioctl_write_int!(ui_set_relbit, b'U', 102);
nix::ioctl_write_int!(ui_set_absbit, b'U', 103);
nix::ioctl_write_int!(ui_set_mscbit, b'U', 104);
nix::ioctl_write_int!(ui_set_ledbit, b'U', 105);
nix::ioctl_write_int!(ui_set_sndbit, b'U', 106);
nix::ioctl_write_int!(ui_set_swbit, b'U', 109);
nix::ioctl_write_int!(ui_set_propbit, b'U', 110);

/// `EVIOCGBIT(type, len)`: the request number depends on the event type.
pub unsafe fn eviocgbit(fd: RawFd, type_: u16, buf: &mut [u8]) -> nix::Result<c_int> {
    let request = nix::request_code_read!(b'E', 0x20 + type_ as u32, buf.len());
    Errno::result(libc::ioctl(fd, request, buf.as_mut_ptr() as *mut c_void))
}

/// `EVIOCGABS(code)`.
pub unsafe fn eviocgabs(fd: RawFd, code: u16, info: *mut input_absinfo) -> nix::Result<c_int> {
    let request =
        nix::request_code_read!(b'E', 0x40 + code as u32, mem::size_of::<input_absinfo>());
    Errno::result(libc::ioctl(fd, request, info))
}

/// `UI_SET_PHYS` is declared with a `char *` argument, so its size field is
/// that of a pointer rather than of the string.
pub unsafe fn ui_set_phys(fd: RawFd, phys: *const c_char) -> nix::Result<c_int> {
    let request = nix::request_code_write!(b'U', 108, mem::size_of::<*const c_char>());
    Errno::result(libc::ioctl(fd, request, phys))
}

pub type CodeSetter = unsafe fn(RawFd, nix::sys::ioctl::ioctl_param_type) -> nix::Result<c_int>;

/// The `UI_SET_*BIT` ioctl enabling codes of `type_`, if uinput has one.
/// `EV_FF` is left out: uinput refuses to create a device with force feedback
/// bits unless effect slots are reserved, and we never upload effects.
pub fn code_setter(type_: u16) -> Option<CodeSetter> {
    let setter: CodeSetter = match type_ {
        EV_KEY => ui_set_keybit,
        EV_REL => ui_set_relbit,
        EV_ABS => ui_set_absbit,
        EV_MSC => ui_set_mscbit,
        EV_LED => ui_set_ledbit,
        EV_SND => ui_set_sndbit,
        EV_SW => ui_set_swbit,
        _ => return None,
    };

    Some(setter)
}

/// Copies a Rust string into a fixed, NUL terminated C buffer, truncating on
/// a character boundary.
pub fn fill_c_buf(buf: &mut [c_char], value: &str) {
    let mut end = value.len().min(buf.len().saturating_sub(1));
    while !value.is_char_boundary(end) {
        end -= 1;
    }

    for (dst, src) in buf.iter_mut().zip(value.as_bytes()[..end].iter()) {
        *dst = *src as c_char;
    }
    for dst in buf.iter_mut().skip(end) {
        *dst = 0;
    }
}

/// Reads the NUL terminated string the kernel left in `buf`.
pub fn c_buf_to_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|byte| *byte == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EV_FF, EV_REP, EV_SYN};

    #[test]
    fn struct_layouts_match_the_kernel() {
        assert_eq!(mem::size_of::<input_id>(), 8);
        assert_eq!(mem::size_of::<input_absinfo>(), 24);
        assert_eq!(mem::size_of::<uinput_setup>(), 92);
        assert_eq!(mem::size_of::<uinput_abs_setup>(), 28);
        assert_eq!(
            mem::size_of::<input_event>(),
            mem::size_of::<libc::timeval>() + 8
        );
    }

    #[test]
    fn ioctl_numbers() {
        let eviocgid = nix::request_code_read!(b'E', 0x02, mem::size_of::<input_id>());
        let eviocgrab = nix::request_code_write!(b'E', 0x90, mem::size_of::<c_int>());
        let ui_dev_create = nix::request_code_none!(b'U', 1);
        let ui_dev_setup = nix::request_code_write!(b'U', 3, mem::size_of::<uinput_setup>());
        let ui_abs_setup = nix::request_code_write!(b'U', 4, mem::size_of::<uinput_abs_setup>());

        assert_eq!(eviocgid as u32, 0x8008_4502);
        assert_eq!(eviocgrab as u32, 0x4004_4590);
        assert_eq!(ui_dev_create as u32, 0x5501);
        assert_eq!(ui_dev_setup as u32, 0x405c_5503);
        assert_eq!(ui_abs_setup as u32, 0x401c_5504);
    }

    #[test]
    fn c_strings() {
        let mut buf = [0 as c_char; 8];
        fill_c_buf(&mut buf, "keyboard!");
        let bytes: Vec<u8> = buf.iter().map(|c| *c as u8).collect();
        assert_eq!(c_buf_to_string(&bytes), "keyboar");
        assert_eq!(buf[7], 0);

        fill_c_buf(&mut buf, "ab");
        let bytes: Vec<u8> = buf.iter().map(|c| *c as u8).collect();
        assert_eq!(c_buf_to_string(&bytes), "ab");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut buf = [0 as c_char; 4];
        fill_c_buf(&mut buf, "aéé");
        let bytes: Vec<u8> = buf.iter().map(|c| *c as u8).collect();
        assert_eq!(c_buf_to_string(&bytes), "aé");
    }

    #[test]
    fn only_settable_types_have_setters() {
        assert!(code_setter(EV_KEY).is_some());
        assert!(code_setter(EV_ABS).is_some());
        assert!(code_setter(EV_SYN).is_none());
        assert!(code_setter(EV_FF).is_none());
        assert!(code_setter(EV_REP).is_none());
    }
}
