use crate::error::Error;
use input::{DeviceDescriptor, InputEvent};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// First message of a client: who it is and which protocol it speaks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub identification: String,
    pub version: u16,
}

/// The server's answer to an announcement. On rejection `devices` is empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementResponse {
    pub status: bool,
    pub devices: Vec<DeviceDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDevice {
    pub devices: Vec<DeviceDescriptor>,
}

/// One batch read from a device, without its closing report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device: String,
    pub events: Vec<InputEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Announcement(Announcement),
    AnnouncementResponse(AnnouncementResponse),
    CreateDevice(CreateDevice),
    DeviceEvent(DeviceEvent),
}

impl Message {
    pub fn name(&self) -> EventName {
        match self {
            Message::Announcement(_) => EventName::Announcement,
            Message::AnnouncementResponse(_) => EventName::AnnouncementResponse,
            Message::CreateDevice(_) => EventName::CreateDevice,
            Message::DeviceEvent(_) => EventName::DeviceEvent,
        }
    }
}

/// Names carried in the envelope, as they appear on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
    Announcement,
    AnnouncementResponse,
    CreateDevice,
    DeviceEvent,
}

impl EventName {
    pub const ALL: [EventName; 4] = [
        EventName::Announcement,
        EventName::AnnouncementResponse,
        EventName::CreateDevice,
        EventName::DeviceEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Announcement => "ANNOUNCEMENT",
            EventName::AnnouncementResponse => "ANNOUNCEMENT_RESPONSE",
            EventName::CreateDevice => "CREATE_DEVICE",
            EventName::DeviceEvent => "DEVICE_EVENT",
        }
    }
}

impl Display for EventName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == name)
            .ok_or_else(|| Error::UnknownEvent(name.to_owned()))
    }
}
