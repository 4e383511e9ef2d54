use crate::bits::BitSet;
use crate::error::Error;
use serde::{Deserialize, Serialize};

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_SW: u16 = 0x05;
pub const EV_LED: u16 = 0x11;
pub const EV_SND: u16 = 0x12;
pub const EV_REP: u16 = 0x14;
pub const EV_FF: u16 = 0x15;
pub const EV_PWR: u16 = 0x16;
pub const EV_FF_STATUS: u16 = 0x17;
pub const EV_MAX: u16 = 0x1f;
pub const EV_CNT: usize = EV_MAX as usize + 1;

pub const SYN_REPORT: u16 = 0;
pub const SYN_DROPPED: u16 = 3;

pub const INPUT_PROP_MAX: usize = 0x1f;
pub const INPUT_PROP_CNT: usize = INPUT_PROP_MAX + 1;

/// Symbolic name of an event type, for logs.
pub fn type_name(type_: u16) -> &'static str {
    match type_ {
        EV_SYN => "EV_SYN",
        EV_KEY => "EV_KEY",
        EV_REL => "EV_REL",
        EV_ABS => "EV_ABS",
        EV_MSC => "EV_MSC",
        EV_SW => "EV_SW",
        EV_LED => "EV_LED",
        EV_SND => "EV_SND",
        EV_REP => "EV_REP",
        EV_FF => "EV_FF",
        EV_PWR => "EV_PWR",
        EV_FF_STATUS => "EV_FF_STATUS",
        _ => "EV_UNKNOWN",
    }
}

/// Property bits reported by `EVIOCGPROP`.
pub type Properties = BitSet<{ INPUT_PROP_CNT / 8 }>;

/// One raw input record, field for field what the kernel hands out of an
/// event node and accepts on a uinput node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub sec: i64,
    pub usec: i64,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Direction {
    Up,   // The key is released.
    Down, // The key is pressed.
}

impl InputEvent {
    pub const fn new(type_: u16, code: u16, value: i32) -> Self {
        InputEvent {
            sec: 0,
            usec: 0,
            type_,
            code,
            value,
        }
    }

    /// The `EV_SYN`/`SYN_REPORT` record closing a batch.
    pub const fn sync() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    pub fn is_sync(&self) -> bool {
        self.type_ == EV_SYN && self.code == SYN_REPORT
    }

    /// Key code and direction of an `EV_KEY` press or release. Autorepeat
    /// records (value 2) are not a direction change and yield `None`.
    pub fn key(&self) -> Option<(u16, Direction)> {
        match (self.type_, self.value) {
            (EV_KEY, 0) => Some((self.code, Direction::Up)),
            (EV_KEY, 1) => Some((self.code, Direction::Down)),
            _ => None,
        }
    }
}

/// Calibration of an absolute axis, as in `struct input_absinfo`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Code(u16),
    Axis { code: u16, info: AxisInfo },
}

impl Capability {
    pub fn code(&self) -> u16 {
        match *self {
            Capability::Code(code) => code,
            Capability::Axis { code, .. } => code,
        }
    }
}

/// Event types mapped to the codes a device supports, in probe order.
/// Some kernels are picky about the order axes are set up in, so neither the
/// types nor the codes are ever reordered.
/// Deserialization goes through the same checks as `insert`, so a peer
/// cannot hand us a type or a code twice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(u16, Vec<Capability>)>")]
pub struct Capabilities(Vec<(u16, Vec<Capability>)>);

impl Capabilities {
    pub fn new() -> Self {
        Capabilities(Vec::new())
    }

    /// Declares support for an event type, even if it ends up with no codes.
    pub fn declare(&mut self, type_: u16) -> &mut Vec<Capability> {
        let index = match self.0.iter().position(|(existing, _)| *existing == type_) {
            Some(index) => index,
            None => {
                self.0.push((type_, Vec::new()));
                self.0.len() - 1
            }
        };

        &mut self.0[index].1
    }

    /// Returns false if the code was already present for this type.
    pub fn insert(&mut self, type_: u16, capability: Capability) -> bool {
        let codes = self.declare(type_);
        if codes.iter().any(|existing| existing.code() == capability.code()) {
            return false;
        }

        codes.push(capability);
        true
    }

    pub fn codes(&self, type_: u16) -> Option<&[Capability]> {
        self.0
            .iter()
            .find(|(existing, _)| *existing == type_)
            .map(|(_, codes)| codes.as_slice())
    }

    pub fn supports(&self, type_: u16, code: u16) -> bool {
        self.codes(type_)
            .map(|codes| codes.iter().any(|capability| capability.code() == code))
            .unwrap_or(false)
    }

    pub fn types(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().map(|(type_, _)| *type_)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &[Capability])> {
        self.0.iter().map(|(type_, codes)| (*type_, codes.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<(u16, Vec<Capability>)>> for Capabilities {
    type Error = Error;

    fn try_from(entries: Vec<(u16, Vec<Capability>)>) -> Result<Self, Error> {
        let mut capabilities = Capabilities::new();
        for (type_, codes) in entries {
            if capabilities.codes(type_).is_some() {
                return Err(Error::DuplicateType(type_));
            }

            capabilities.declare(type_);
            for capability in codes {
                if !capabilities.insert(type_, capability) {
                    return Err(Error::DuplicateCode {
                        type_,
                        code: capability.code(),
                    });
                }
            }
        }

        Ok(capabilities)
    }
}

impl IntoIterator for Capabilities {
    type Item = (u16, Vec<Capability>);
    type IntoIter = std::vec::IntoIter<(u16, Vec<Capability>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Everything needed to rebuild a device somewhere else.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub name: String,
    pub phys: String,
    pub unique: String,
    pub properties: Properties,
    pub capabilities: Capabilities,
}
