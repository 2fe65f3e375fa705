use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};
use alloc::vec::Vec;

pub const ITEM_NULL_ADDRESS: u16 = 0x0000;
pub const ITEM_CONNECTED_ADDRESS: u16 = 0x00A1;
pub const ITEM_CONNECTED_DATA: u16 = 0x00B1;
pub const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;
pub const ITEM_SEQUENCED_ADDRESS: u16 = 0x8002;

/// One entry of a Common Packet Format item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpfItem<'a> {
    pub type_id: u16,
    pub data: &'a [u8],
}

impl<'a> CpfItem<'a> {
    pub const fn new(type_id: u16, data: &'a [u8]) -> Self {
        Self { type_id, data }
    }

    pub const fn null_address() -> Self {
        Self::new(ITEM_NULL_ADDRESS, &[])
    }

    pub fn encoded_len(&self) -> usize {
        4 + self.data.len()
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let len = u16::try_from(self.data.len()).map_err(|_| EncodeError::InvalidLength)?;
        w.write_le_u16(self.type_id)?;
        w.write_le_u16(len)?;
        w.write_all(self.data)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let type_id = r.read_le_u16()?;
        let len = r.read_le_u16()? as usize;
        let data = r.read_exact(len)?;
        Ok(Self { type_id, data })
    }
}

pub fn encode_items(w: &mut Writer<'_>, items: &[CpfItem<'_>]) -> Result<(), EncodeError> {
    let count = u16::try_from(items.len()).map_err(|_| EncodeError::ValueOutOfRange)?;
    w.write_le_u16(count)?;
    for item in items {
        item.encode(w)?;
    }
    Ok(())
}

pub fn decode_items<'a>(r: &mut Reader<'a>) -> Result<Vec<CpfItem<'a>>, DecodeError> {
    let count = r.read_le_u16()? as usize;
    // Each item needs at least its 4-byte header.
    if count * 4 > r.remaining() {
        return Err(DecodeError::InvalidLength);
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(CpfItem::decode(r)?);
    }
    Ok(items)
}

/// Body of SendRRData / SendUnitData: interface handle, timeout and the item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandData<'a> {
    pub interface_handle: u32,
    pub timeout: u16,
    pub items: Vec<CpfItem<'a>>,
}

impl<'a> CommandData<'a> {
    pub fn new(timeout: u16, items: Vec<CpfItem<'a>>) -> Self {
        Self {
            interface_handle: 0,
            timeout,
            items,
        }
    }

    pub fn encoded_len(&self) -> usize {
        8 + self.items.iter().map(CpfItem::encoded_len).sum::<usize>()
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u32(self.interface_handle)?;
        w.write_le_u16(self.timeout)?;
        encode_items(w, &self.items)
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let interface_handle = r.read_le_u32()?;
        let timeout = r.read_le_u16()?;
        let items = decode_items(r)?;
        Ok(Self {
            interface_handle,
            timeout,
            items,
        })
    }

    /// Last item with the given type id.
    pub fn item(&self, type_id: u16) -> Option<&CpfItem<'a>> {
        self.items.iter().rev().find(|item| item.type_id == type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CommandData, CpfItem, ITEM_CONNECTED_DATA, ITEM_NULL_ADDRESS, ITEM_UNCONNECTED_DATA,
    };
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::DecodeError;

    #[test]
    fn rr_data_layout() {
        let payload = [0x54, 0x02, 0x20, 0x06, 0x24, 0x01];
        let data = CommandData::new(
            255,
            vec![
                CpfItem::null_address(),
                CpfItem::new(ITEM_UNCONNECTED_DATA, &payload),
            ],
        );
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        data.encode(&mut w).unwrap();
        let out = w.as_written();
        assert_eq!(out.len(), data.encoded_len());
        assert_eq!(
            &out[..16],
            &[0, 0, 0, 0, 0xFF, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB2, 0x00, 0x06, 0x00]
        );

        let mut r = Reader::new(out);
        let decoded = CommandData::decode(&mut r).unwrap();
        assert_eq!(decoded.items[0].type_id, ITEM_NULL_ADDRESS);
        assert_eq!(decoded.item(ITEM_UNCONNECTED_DATA).unwrap().data, &payload);
        assert!(decoded.item(ITEM_CONNECTED_DATA).is_none());
    }

    #[test]
    fn item_length_past_end_is_eof() {
        let raw = [0, 0, 0, 0, 0, 0, 1, 0, 0xB2, 0x00, 0x10, 0x00, 0xAA];
        let mut r = Reader::new(&raw);
        assert_eq!(
            CommandData::decode(&mut r).unwrap_err(),
            DecodeError::UnexpectedEof
        );
    }

    #[test]
    fn absurd_item_count_is_rejected() {
        let raw = [0, 0, 0, 0, 0, 0, 0xFF, 0xFF];
        let mut r = Reader::new(&raw);
        assert_eq!(
            CommandData::decode(&mut r).unwrap_err(),
            DecodeError::InvalidLength
        );
    }
}
