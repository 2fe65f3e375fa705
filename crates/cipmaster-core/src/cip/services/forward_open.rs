use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

pub const SERVICE_FORWARD_OPEN: u8 = 0x54;
pub const SERVICE_FORWARD_CLOSE: u8 = 0x4E;

/// Electronic key followed by the assembly class, the configuration instance
/// and the OT (0x65) / TO (0x64) connection points.
pub const DEFAULT_CONNECTION_PATH: [u8; 18] = [
    0x34, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x04, 0x24, 0x01, 0x2C,
    0x65, 0x2C, 0x64,
];

const DEFAULT_PRIORITY_TIME_TICK: u8 = 0x0A;
const DEFAULT_TIMEOUT_TICKS: u8 = 0xF9;
const DEFAULT_RPI_US: u32 = 0x007A_1200;
const DEFAULT_TRANSPORT_TRIGGER: u8 = 0xA3;

/// Connection serial, vendor id and originator serial identifying a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionTriad {
    pub connection_serial: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
}

impl Default for ConnectionTriad {
    fn default() -> Self {
        Self {
            connection_serial: 0x1337,
            vendor_id: 0x004D,
            originator_serial: 0xDEAD_BEEF,
        }
    }
}

impl ConnectionTriad {
    fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u16(self.connection_serial)?;
        w.write_le_u16(self.vendor_id)?;
        w.write_le_u32(self.originator_serial)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            connection_serial: r.read_le_u16()?,
            vendor_id: r.read_le_u16()?,
            originator_serial: r.read_le_u32()?,
        })
    }
}

fn path_words(path: &[u8]) -> Result<u8, EncodeError> {
    if path.len() % 2 != 0 {
        return Err(EncodeError::InvalidLength);
    }
    u8::try_from(path.len() / 2).map_err(|_| EncodeError::InvalidLength)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOpenRequest<'a> {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub ot_connection_id: u32,
    pub to_connection_id: u32,
    pub triad: ConnectionTriad,
    pub timeout_multiplier: u8,
    pub ot_rpi_us: u32,
    pub ot_params: u16,
    pub to_rpi_us: u32,
    pub to_params: u16,
    pub transport_trigger: u8,
    pub connection_path: &'a [u8],
}

impl ForwardOpenRequest<'static> {
    pub fn new(ot_params: u16, to_params: u16) -> Self {
        Self {
            priority_time_tick: DEFAULT_PRIORITY_TIME_TICK,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            ot_connection_id: 0x8000_0031,
            to_connection_id: 0x80FE_0030,
            triad: ConnectionTriad::default(),
            timeout_multiplier: 0,
            ot_rpi_us: DEFAULT_RPI_US,
            ot_params,
            to_rpi_us: DEFAULT_RPI_US,
            to_params,
            transport_trigger: DEFAULT_TRANSPORT_TRIGGER,
            connection_path: &DEFAULT_CONNECTION_PATH,
        }
    }
}

impl<'a> ForwardOpenRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let words = path_words(self.connection_path)?;
        w.write_u8(self.priority_time_tick)?;
        w.write_u8(self.timeout_ticks)?;
        w.write_le_u32(self.ot_connection_id)?;
        w.write_le_u32(self.to_connection_id)?;
        self.triad.encode(w)?;
        w.write_u8(self.timeout_multiplier)?;
        w.write_all(&[0, 0, 0])?;
        w.write_le_u32(self.ot_rpi_us)?;
        w.write_le_u16(self.ot_params)?;
        w.write_le_u32(self.to_rpi_us)?;
        w.write_le_u16(self.to_params)?;
        w.write_u8(self.transport_trigger)?;
        w.write_u8(words)?;
        w.write_all(self.connection_path)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let priority_time_tick = r.read_u8()?;
        let timeout_ticks = r.read_u8()?;
        let ot_connection_id = r.read_le_u32()?;
        let to_connection_id = r.read_le_u32()?;
        let triad = ConnectionTriad::decode(r)?;
        let timeout_multiplier = r.read_u8()?;
        r.skip(3)?;
        let ot_rpi_us = r.read_le_u32()?;
        let ot_params = r.read_le_u16()?;
        let to_rpi_us = r.read_le_u32()?;
        let to_params = r.read_le_u16()?;
        let transport_trigger = r.read_u8()?;
        let words = r.read_u8()? as usize;
        let connection_path = r.read_exact(words * 2)?;
        Ok(Self {
            priority_time_tick,
            timeout_ticks,
            ot_connection_id,
            to_connection_id,
            triad,
            timeout_multiplier,
            ot_rpi_us,
            ot_params,
            to_rpi_us,
            to_params,
            transport_trigger,
            connection_path,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOpenReply<'a> {
    pub ot_connection_id: u32,
    pub to_connection_id: u32,
    pub triad: ConnectionTriad,
    pub ot_api_us: u32,
    pub to_api_us: u32,
    pub application_reply: &'a [u8],
}

impl<'a> ForwardOpenReply<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let words = path_words(self.application_reply)?;
        w.write_le_u32(self.ot_connection_id)?;
        w.write_le_u32(self.to_connection_id)?;
        self.triad.encode(w)?;
        w.write_le_u32(self.ot_api_us)?;
        w.write_le_u32(self.to_api_us)?;
        w.write_u8(words)?;
        w.write_u8(0)?;
        w.write_all(self.application_reply)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let ot_connection_id = r.read_le_u32()?;
        let to_connection_id = r.read_le_u32()?;
        let triad = ConnectionTriad::decode(r)?;
        let ot_api_us = r.read_le_u32()?;
        let to_api_us = r.read_le_u32()?;
        let words = r.read_u8()? as usize;
        let _reserved = r.read_u8()?;
        let application_reply = r.read_exact(words * 2)?;
        Ok(Self {
            ot_connection_id,
            to_connection_id,
            triad,
            ot_api_us,
            to_api_us,
            application_reply,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardCloseRequest<'a> {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub triad: ConnectionTriad,
    pub connection_path: &'a [u8],
}

impl ForwardCloseRequest<'static> {
    pub fn new() -> Self {
        Self {
            priority_time_tick: DEFAULT_PRIORITY_TIME_TICK,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            triad: ConnectionTriad::default(),
            connection_path: &DEFAULT_CONNECTION_PATH,
        }
    }
}

impl Default for ForwardCloseRequest<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ForwardCloseRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let words = path_words(self.connection_path)?;
        w.write_u8(self.priority_time_tick)?;
        w.write_u8(self.timeout_ticks)?;
        self.triad.encode(w)?;
        w.write_u8(words)?;
        w.write_u8(0)?;
        w.write_all(self.connection_path)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let priority_time_tick = r.read_u8()?;
        let timeout_ticks = r.read_u8()?;
        let triad = ConnectionTriad::decode(r)?;
        let words = r.read_u8()? as usize;
        let _reserved = r.read_u8()?;
        let connection_path = r.read_exact(words * 2)?;
        Ok(Self {
            priority_time_tick,
            timeout_ticks,
            triad,
            connection_path,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardCloseReply {
    pub triad: ConnectionTriad,
}

impl ForwardCloseReply {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        self.triad.encode(w)?;
        w.write_u8(0)?;
        w.write_u8(0)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ForwardCloseRequest, ForwardOpenReply, ForwardOpenRequest, DEFAULT_CONNECTION_PATH,
    };
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::EncodeError;

    #[test]
    fn forward_open_request_carries_params_and_path() {
        let req = ForwardOpenRequest::new(0x4808, 0x280A);
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();
        let out = w.as_written();

        assert_eq!(out.len(), 36 + DEFAULT_CONNECTION_PATH.len());
        assert_eq!(&out[26..28], &[0x08, 0x48]);
        assert_eq!(&out[32..34], &[0x0A, 0x28]);
        assert_eq!(out[35], 9);
        assert_eq!(&out[36..], &DEFAULT_CONNECTION_PATH);

        let mut r = Reader::new(out);
        assert_eq!(ForwardOpenRequest::decode(&mut r).unwrap(), req);
    }

    #[test]
    fn forward_open_reply_decodes_connection_ids() {
        let reply = ForwardOpenReply {
            ot_connection_id: 111,
            to_connection_id: 222,
            triad: Default::default(),
            ot_api_us: 10_000,
            to_api_us: 10_000,
            application_reply: &[],
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        reply.encode(&mut w).unwrap();
        assert_eq!(w.as_written().len(), 26);

        let mut r = Reader::new(w.as_written());
        let decoded = ForwardOpenReply::decode(&mut r).unwrap();
        assert_eq!(decoded.ot_connection_id, 111);
        assert_eq!(decoded.to_connection_id, 222);
    }

    #[test]
    fn forward_close_places_reserved_after_path_size() {
        let req = ForwardCloseRequest::new();
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();
        let out = w.as_written();
        assert_eq!(out[10], 9);
        assert_eq!(out[11], 0);
        assert_eq!(&out[12..], &DEFAULT_CONNECTION_PATH);
    }

    #[test]
    fn odd_connection_path_is_rejected() {
        let mut req = ForwardOpenRequest::new(0, 0);
        req.connection_path = &[0x20, 0x04, 0x24];
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        assert_eq!(req.encode(&mut w).unwrap_err(), EncodeError::InvalidLength);
    }
}
