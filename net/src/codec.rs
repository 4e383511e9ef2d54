use crate::error::Error;
use crate::message::{
    Announcement, AnnouncementResponse, CreateDevice, DeviceEvent, EventName, Message,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Envelope {
    name: String,
    data: Vec<u8>,
}

type Decoder = fn(&[u8]) -> Result<Message, Error>;

static DECODERS: [(&str, Decoder); 4] = [
    ("ANNOUNCEMENT", |data: &[u8]| {
        payload(data).map(Message::Announcement)
    }),
    ("ANNOUNCEMENT_RESPONSE", |data: &[u8]| {
        payload(data).map(Message::AnnouncementResponse)
    }),
    ("CREATE_DEVICE", |data: &[u8]| {
        payload(data).map(Message::CreateDevice)
    }),
    ("DEVICE_EVENT", |data: &[u8]| {
        payload(data).map(Message::DeviceEvent)
    }),
];

fn decoder(name: &str) -> Option<Decoder> {
    DECODERS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, decoder)| *decoder)
}

fn payload<T: DeserializeOwned>(data: &[u8]) -> Result<T, Error> {
    bincode::deserialize(data).map_err(Error::MalformedFrame)
}

/// Wraps the message's payload in a named envelope.
pub fn encode(message: &Message) -> Result<Vec<u8>, Error> {
    let data = match message {
        Message::Announcement(payload) => bincode::serialize::<Announcement>(payload),
        Message::AnnouncementResponse(payload) => {
            bincode::serialize::<AnnouncementResponse>(payload)
        }
        Message::CreateDevice(payload) => bincode::serialize::<CreateDevice>(payload),
        Message::DeviceEvent(payload) => bincode::serialize::<DeviceEvent>(payload),
    }
    .map_err(Error::MalformedFrame)?;

    let envelope = Envelope {
        name: message.name().as_str().to_owned(),
        data,
    };

    bincode::serialize(&envelope).map_err(Error::MalformedFrame)
}

pub fn decode(frame: &[u8]) -> Result<Message, Error> {
    let envelope: Envelope = bincode::deserialize(frame).map_err(Error::MalformedFrame)?;
    let decoder = decoder(&envelope.name).ok_or(Error::UnknownEvent(envelope.name))?;

    decoder(&envelope.data)
}

/// Names the dispatch table can decode.
pub fn registered() -> impl Iterator<Item = EventName> {
    DECODERS
        .iter()
        .filter_map(|(name, _)| name.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use input::{Capability, InputEvent, Properties, EV_KEY};

    #[test]
    fn every_name_has_a_decoder() {
        let registered: Vec<_> = registered().collect();
        assert_eq!(registered, EventName::ALL.to_vec());
    }

    #[test]
    fn device_event_survives_the_envelope() {
        let message = Message::DeviceEvent(DeviceEvent {
            device: "keyboard".to_owned(),
            events: vec![InputEvent::new(EV_KEY, 30, 1)],
        });

        assert_eq!(decode(&encode(&message).unwrap()).unwrap(), message);
    }

    #[test]
    fn unknown_names_are_fatal() {
        let frame = bincode::serialize(&Envelope {
            name: "KEEP_ALIVE".to_owned(),
            data: Vec::new(),
        })
        .unwrap();

        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, Error::UnknownEvent(ref name) if name == "KEEP_ALIVE"));
        assert!(err.is_fatal());
    }

    #[test]
    fn corrupt_payload_is_malformed() {
        let frame = bincode::serialize(&Envelope {
            name: "ANNOUNCEMENT".to_owned(),
            data: vec![0xff, 0xff],
        })
        .unwrap();

        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn duplicate_capabilities_are_malformed() {
        // Same layout as `DeviceDescriptor`, without its checks.
        #[derive(Serialize)]
        struct LooseDescriptor {
            bustype: u16,
            vendor: u16,
            product: u16,
            version: u16,
            name: String,
            phys: String,
            unique: String,
            properties: Properties,
            capabilities: Vec<(u16, Vec<Capability>)>,
        }

        let loose = LooseDescriptor {
            bustype: 0x03,
            vendor: 0x046d,
            product: 0xc31c,
            version: 0x110,
            name: "keyboard".to_owned(),
            phys: String::new(),
            unique: String::new(),
            properties: Properties::new(),
            capabilities: vec![(EV_KEY, vec![Capability::Code(30), Capability::Code(30)])],
        };
        let frame = bincode::serialize(&Envelope {
            name: "CREATE_DEVICE".to_owned(),
            data: bincode::serialize(&vec![loose]).unwrap(),
        })
        .unwrap();

        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn truncated_envelope_is_malformed() {
        assert!(matches!(decode(&[1, 2, 3]), Err(Error::MalformedFrame(_))));
    }
}
