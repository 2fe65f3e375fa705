use cipmaster_core::encoding::{reader::Reader, writer::Writer};
use cipmaster_core::{DecodeError, EncodeError};

pub const ENCAPSULATION_HEADER_LEN: usize = 24;
pub const ENIP_PROTOCOL_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncapsulationCommand {
    Nop,
    ListServices,
    ListIdentity,
    ListInterfaces,
    RegisterSession,
    UnregisterSession,
    SendRRData,
    SendUnitData,
    Unknown(u16),
}

impl EncapsulationCommand {
    pub const fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => Self::Nop,
            0x0004 => Self::ListServices,
            0x0063 => Self::ListIdentity,
            0x0064 => Self::ListInterfaces,
            0x0065 => Self::RegisterSession,
            0x0066 => Self::UnregisterSession,
            0x006F => Self::SendRRData,
            0x0070 => Self::SendUnitData,
            v => Self::Unknown(v),
        }
    }

    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Nop => 0x0000,
            Self::ListServices => 0x0004,
            Self::ListIdentity => 0x0063,
            Self::ListInterfaces => 0x0064,
            Self::RegisterSession => 0x0065,
            Self::UnregisterSession => 0x0066,
            Self::SendRRData => 0x006F,
            Self::SendUnitData => 0x0070,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncapsulationHeader {
    pub command: EncapsulationCommand,
    /// Length of the data following the header.
    pub length: u16,
    pub session_handle: u32,
    pub status: u32,
    pub sender_context: u64,
    pub options: u32,
}

impl EncapsulationHeader {
    pub const fn new(command: EncapsulationCommand, session_handle: u32, length: u16) -> Self {
        Self {
            command,
            length,
            session_handle,
            status: 0,
            sender_context: 0,
            options: 0,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u16(self.command.to_u16())?;
        w.write_le_u16(self.length)?;
        w.write_le_u32(self.session_handle)?;
        w.write_le_u32(self.status)?;
        w.write_le_u64(self.sender_context)?;
        w.write_le_u32(self.options)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            command: EncapsulationCommand::from_u16(r.read_le_u16()?),
            length: r.read_le_u16()?,
            session_handle: r.read_le_u32()?,
            status: r.read_le_u32()?,
            sender_context: r.read_le_u64()?,
            options: r.read_le_u32()?,
        })
    }
}

/// Body of a RegisterSession request and reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSessionData {
    pub protocol_version: u16,
    pub options: u16,
}

impl Default for RegisterSessionData {
    fn default() -> Self {
        Self {
            protocol_version: ENIP_PROTOCOL_VERSION,
            options: 0,
        }
    }
}

impl RegisterSessionData {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u16(self.protocol_version)?;
        w.write_le_u16(self.options)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            protocol_version: r.read_le_u16()?,
            options: r.read_le_u16()?,
        })
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out[..2].copy_from_slice(&self.protocol_version.to_le_bytes());
        out[2..].copy_from_slice(&self.options.to_le_bytes());
        out
    }
}

/// Builds a complete frame: header followed by `body`.
pub fn encode_frame(
    command: EncapsulationCommand,
    session_handle: u32,
    body: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let length = u16::try_from(body.len()).map_err(|_| EncodeError::InvalidLength)?;
    let mut frame = vec![0u8; ENCAPSULATION_HEADER_LEN + body.len()];
    let mut w = Writer::new(&mut frame);
    EncapsulationHeader::new(command, session_handle, length).encode(&mut w)?;
    w.write_all(body)?;
    Ok(frame)
}

/// Splits a complete frame into its header and body.
pub fn decode_frame(frame: &[u8]) -> Result<(EncapsulationHeader, &[u8]), DecodeError> {
    let mut r = Reader::new(frame);
    let header = EncapsulationHeader::decode(&mut r)?;
    let body = r.read_exact(header.length as usize)?;
    Ok((header, body))
}
