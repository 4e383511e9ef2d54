mod bits;
mod error;
mod event;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::{
    discover, list, natural_cmp, probe, resolve, PhysicalDevice, ReaderManager, VirtualDevice,
    WriterManager, EVENT_PATH,
};

pub use bits::BitSet;
pub use error::Error;
pub use event::{
    type_name, AxisInfo, Capabilities, Capability, DeviceDescriptor, Direction, InputEvent,
    Properties, EV_ABS, EV_CNT, EV_FF, EV_FF_STATUS, EV_KEY, EV_LED, EV_MAX, EV_MSC, EV_PWR,
    EV_REL, EV_REP, EV_SND, EV_SW, EV_SYN, INPUT_PROP_CNT, INPUT_PROP_MAX, SYN_DROPPED,
    SYN_REPORT,
};
