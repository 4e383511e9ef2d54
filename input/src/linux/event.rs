use crate::event::InputEvent;
use crate::linux::glue;
use std::mem;

pub(crate) const RAW_EVENT_SIZE: usize = mem::size_of::<glue::input_event>();

impl InputEvent {
    pub(crate) fn to_raw(&self) -> glue::input_event {
        glue::input_event {
            time: glue::timeval {
                tv_sec: self.sec as _,
                tv_usec: self.usec as _,
            },
            type_: self.type_,
            code: self.code,
            value: self.value,
        }
    }

    pub(crate) fn from_raw(raw: glue::input_event) -> Self {
        InputEvent {
            sec: raw.time.tv_sec as _,
            usec: raw.time.tv_usec as _,
            type_: raw.type_,
            code: raw.code,
            value: raw.value,
        }
    }
}

/// Splits a buffer filled by `read(2)` into records. A trailing partial record
/// is dropped; the kernel only ever hands out whole ones.
pub(crate) fn parse_raw(bytes: &[u8]) -> impl Iterator<Item = InputEvent> + '_ {
    bytes
        .chunks_exact(RAW_EVENT_SIZE)
        .map(|chunk| InputEvent::from_raw(bytemuck::pod_read_unaligned(chunk)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EV_KEY, EV_SYN};

    #[test]
    fn raw_round_trip_keeps_timestamps() {
        let event = InputEvent {
            sec: 1_700_000_000,
            usec: 999_999,
            type_: EV_KEY,
            code: 30,
            value: 1,
        };

        assert_eq!(InputEvent::from_raw(event.to_raw()), event);
    }

    #[test]
    fn parses_whole_records_only() {
        let records = [
            InputEvent::new(EV_KEY, 30, 1).to_raw(),
            InputEvent::new(EV_SYN, 0, 0).to_raw(),
        ];
        let mut bytes = bytemuck::cast_slice::<_, u8>(&records).to_vec();
        bytes.extend_from_slice(&[0xff; 5]);

        let events: Vec<_> = parse_raw(&bytes).collect();
        assert_eq!(events, vec![InputEvent::new(EV_KEY, 30, 1), InputEvent::sync()]);
    }
}
