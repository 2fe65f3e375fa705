use crate::cip::path::CipPath;
use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};
use alloc::vec::Vec;

/// Bit set on the service byte of every reply.
pub const REPLY_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRequest<'a> {
    pub service: u8,
    pub path: CipPath,
    pub data: &'a [u8],
}

impl<'a> MessageRequest<'a> {
    pub const fn new(service: u8, path: CipPath, data: &'a [u8]) -> Self {
        Self {
            service,
            path,
            data,
        }
    }

    pub fn encoded_len(&self) -> usize {
        2 + self.path.as_bytes().len() + self.data.len()
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.service & !REPLY_FLAG)?;
        self.path.encode(w)?;
        w.write_all(self.data)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let service = r.read_u8()?;
        if service & REPLY_FLAG != 0 {
            return Err(DecodeError::UnexpectedService(service));
        }
        let path = CipPath::decode(r)?;
        let data = r.read_rest();
        Ok(Self {
            service,
            path,
            data,
        })
    }
}

/// General status plus the optional additional status words.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseStatus {
    pub general: u8,
    pub additional: Vec<u16>,
}

impl ResponseStatus {
    pub const fn success() -> Self {
        Self {
            general: 0,
            additional: Vec::new(),
        }
    }
}

/// A decoded reply. `service` has the reply flag stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse<'a> {
    pub service: u8,
    pub status: Option<ResponseStatus>,
    pub data: &'a [u8],
}

impl<'a> MessageResponse<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.service | REPLY_FLAG)?;
        if let Some(status) = &self.status {
            let words = u8::try_from(status.additional.len())
                .map_err(|_| EncodeError::ValueOutOfRange)?;
            w.write_u8(0)?;
            w.write_u8(status.general)?;
            w.write_u8(words)?;
            for word in &status.additional {
                w.write_le_u16(*word)?;
            }
        }
        w.write_all(self.data)
    }

    /// Decodes a reply. A reply that ends before the reserved/status/size
    /// triple carries no status block at all.
    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let raw_service = r.read_u8()?;
        if raw_service & REPLY_FLAG == 0 {
            return Err(DecodeError::UnexpectedService(raw_service));
        }
        let service = raw_service & !REPLY_FLAG;
        if r.remaining() < 3 {
            return Ok(Self {
                service,
                status: None,
                data: r.read_rest(),
            });
        }

        let _reserved = r.read_u8()?;
        let general = r.read_u8()?;
        let words = r.read_u8()? as usize;
        let mut additional = Vec::with_capacity(words);
        for _ in 0..words {
            additional.push(r.read_le_u16()?);
        }
        Ok(Self {
            service,
            status: Some(ResponseStatus {
                general,
                additional,
            }),
            data: r.read_rest(),
        })
    }

    pub fn general_status(&self) -> u8 {
        crate::cip::status::status_details(self.status.as_ref()).0
    }
}
