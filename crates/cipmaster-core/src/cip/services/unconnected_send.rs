use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

pub const SERVICE_UNCONNECTED_SEND: u8 = 0x52;

/// Route to port 1, link address 0 (the backplane slot of the adapter).
pub const DEFAULT_ROUTE_PATH: [u8; 2] = [0x01, 0x00];

/// An embedded request routed through the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnconnectedSend<'a> {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub message: &'a [u8],
    pub route_path: &'a [u8],
}

impl<'a> UnconnectedSend<'a> {
    pub const fn new(message: &'a [u8]) -> Self {
        Self {
            priority_time_tick: 0x05,
            timeout_ticks: 0x9D,
            message,
            route_path: &DEFAULT_ROUTE_PATH,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let msg_len = u16::try_from(self.message.len()).map_err(|_| EncodeError::InvalidLength)?;
        if self.route_path.len() % 2 != 0 {
            return Err(EncodeError::InvalidLength);
        }
        let route_words =
            u8::try_from(self.route_path.len() / 2).map_err(|_| EncodeError::InvalidLength)?;
        w.write_u8(self.priority_time_tick)?;
        w.write_u8(self.timeout_ticks)?;
        w.write_le_u16(msg_len)?;
        w.write_all(self.message)?;
        if self.message.len() % 2 != 0 {
            w.write_u8(0)?;
        }
        w.write_u8(route_words)?;
        w.write_u8(0)?;
        w.write_all(self.route_path)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let priority_time_tick = r.read_u8()?;
        let timeout_ticks = r.read_u8()?;
        let msg_len = r.read_le_u16()? as usize;
        let message = r.read_exact(msg_len)?;
        if msg_len % 2 != 0 {
            r.skip(1)?;
        }
        let route_words = r.read_u8()? as usize;
        let _reserved = r.read_u8()?;
        let route_path = r.read_exact(route_words * 2)?;
        Ok(Self {
            priority_time_tick,
            timeout_ticks,
            message,
            route_path,
        })
    }
}
