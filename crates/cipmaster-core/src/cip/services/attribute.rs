use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};
use alloc::vec::Vec;

pub const SERVICE_GET_ATTRIBUTE_LIST: u8 = 0x03;
pub const SERVICE_SET_ATTRIBUTE_LIST: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAttributeListRequest<'a> {
    pub attributes: &'a [u16],
}

impl<'a> GetAttributeListRequest<'a> {
    pub const fn new(attributes: &'a [u16]) -> Self {
        Self { attributes }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let count =
            u16::try_from(self.attributes.len()).map_err(|_| EncodeError::ValueOutOfRange)?;
        w.write_le_u16(count)?;
        for attribute in self.attributes {
            w.write_le_u16(*attribute)?;
        }
        Ok(())
    }

    pub fn decode_ids(r: &mut Reader<'_>) -> Result<Vec<u16>, DecodeError> {
        let count = r.read_le_u16()? as usize;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(r.read_le_u16()?);
        }
        Ok(ids)
    }
}

/// One entry of a Get-Attribute-List reply. Only single-attribute replies
/// are decoded: the value runs to the end of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeReply<'a> {
    pub attribute_id: u16,
    pub status: u16,
    pub value: &'a [u8],
}

impl<'a> AttributeReply<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u16(1)?;
        w.write_le_u16(self.attribute_id)?;
        w.write_le_u16(self.status)?;
        w.write_all(self.value)
    }

    pub fn decode_single(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let count = r.read_le_u16()?;
        if count != 1 {
            return Err(DecodeError::InvalidValue);
        }
        Ok(Self {
            attribute_id: r.read_le_u16()?,
            status: r.read_le_u16()?,
            value: r.read_rest(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetAttributeListRequest<'a> {
    pub attribute_id: u16,
    pub value: &'a [u8],
}

impl<'a> SetAttributeListRequest<'a> {
    pub const fn new(attribute_id: u16, value: &'a [u8]) -> Self {
        Self {
            attribute_id,
            value,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u16(1)?;
        w.write_le_u16(self.attribute_id)?;
        w.write_all(self.value)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let count = r.read_le_u16()?;
        if count != 1 {
            return Err(DecodeError::InvalidValue);
        }
        Ok(Self {
            attribute_id: r.read_le_u16()?,
            value: r.read_rest(),
        })
    }
}
