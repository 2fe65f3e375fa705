//! Cyclic (implicit) I/O datagrams carried over UDP.

use crate::cpf::{CpfItem, ITEM_CONNECTED_DATA, ITEM_SEQUENCED_ADDRESS};
use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

pub const SEQUENCED_ADDRESS_LEN: usize = 8;
pub const CIP_IO_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequencedAddress {
    pub connection_id: u32,
    pub sequence: u32,
}

impl SequencedAddress {
    pub fn to_bytes(self) -> [u8; SEQUENCED_ADDRESS_LEN] {
        let mut out = [0u8; SEQUENCED_ADDRESS_LEN];
        out[..4].copy_from_slice(&self.connection_id.to_le_bytes());
        out[4..].copy_from_slice(&self.sequence.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != SEQUENCED_ADDRESS_LEN {
            return Err(DecodeError::InvalidLength);
        }
        let mut r = Reader::new(data);
        Ok(Self {
            connection_id: r.read_le_u32()?,
            sequence: r.read_le_u32()?,
        })
    }
}

/// Sequence count and the one-byte run/idle header preceding the assembly bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CipIoHeader {
    pub sequence_count: u16,
    pub header: u8,
}

impl CipIoHeader {
    pub const fn new(sequence_count: u16, header: u8) -> Self {
        Self {
            sequence_count,
            header,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_le_u16(self.sequence_count)?;
        w.write_u8(self.header)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            sequence_count: r.read_le_u16()?,
            header: r.read_u8()?,
        })
    }
}

/// A connected-data datagram: optional sequenced address item followed by
/// the connected data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicFrame<'a> {
    pub address: Option<SequencedAddress>,
    pub io_header: CipIoHeader,
    pub payload: &'a [u8],
}

impl<'a> CyclicFrame<'a> {
    pub fn encoded_len(&self) -> usize {
        let address_len = if self.address.is_some() {
            4 + SEQUENCED_ADDRESS_LEN
        } else {
            0
        };
        2 + address_len + 4 + CIP_IO_HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let data_len = u16::try_from(CIP_IO_HEADER_LEN + self.payload.len())
            .map_err(|_| EncodeError::InvalidLength)?;
        let count = if self.address.is_some() { 2 } else { 1 };
        w.write_le_u16(count)?;
        if let Some(address) = self.address {
            CpfItem::new(ITEM_SEQUENCED_ADDRESS, &address.to_bytes()).encode(w)?;
        }
        w.write_le_u16(ITEM_CONNECTED_DATA)?;
        w.write_le_u16(data_len)?;
        self.io_header.encode(w)?;
        w.write_all(self.payload)
    }

    /// Uses the last connected data item and the first sequenced address item.
    /// An address item that fails to decode is ignored.
    pub fn decode(data: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let items = crate::cpf::decode_items(&mut r)?;
        let address = items
            .iter()
            .find(|item| item.type_id == ITEM_SEQUENCED_ADDRESS)
            .and_then(|item| SequencedAddress::decode(item.data).ok());
        let connected = items
            .iter()
            .rev()
            .find(|item| item.type_id == ITEM_CONNECTED_DATA)
            .ok_or(DecodeError::MissingItem(ITEM_CONNECTED_DATA))?;

        let mut body = Reader::new(connected.data);
        let io_header = CipIoHeader::decode(&mut body)?;
        Ok(Self {
            address,
            io_header,
            payload: body.read_rest(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CipIoHeader, CyclicFrame, SequencedAddress};
    use crate::encoding::writer::Writer;
    use crate::DecodeError;

    #[test]
    fn frame_carries_address_then_data() {
        let frame = CyclicFrame {
            address: Some(SequencedAddress {
                connection_id: 0x1122_3344,
                sequence: 7,
            }),
            io_header: CipIoHeader::new(65500, 1),
            payload: &[0xAB, 0xCD],
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        frame.encode(&mut w).unwrap();
        let out = w.as_written();
        assert_eq!(out.len(), frame.encoded_len());
        assert_eq!(
            out,
            &[
                0x02, 0x00, 0x02, 0x80, 0x08, 0x00, 0x44, 0x33, 0x22, 0x11, 0x07, 0x00, 0x00,
                0x00, 0xB1, 0x00, 0x05, 0x00, 0xDC, 0xFF, 0x01, 0xAB, 0xCD
            ]
        );
        assert_eq!(CyclicFrame::decode(out).unwrap(), frame);
    }

    #[test]
    fn last_connected_item_wins() {
        let raw = [
            0x02, 0x00, 0xB1, 0x00, 0x04, 0x00, 0x01, 0x00, 0x01, 0x11, 0xB1, 0x00, 0x04, 0x00,
            0x02, 0x00, 0x01, 0x22,
        ];
        let frame = CyclicFrame::decode(&raw).unwrap();
        assert_eq!(frame.address, None);
        assert_eq!(frame.io_header.sequence_count, 2);
        assert_eq!(frame.payload, &[0x22]);
    }

    #[test]
    fn missing_connected_item_is_reported() {
        let raw = [
            0x01, 0x00, 0x02, 0x80, 0x08, 0x00, 1, 0, 0, 0, 1, 0, 0, 0,
        ];
        assert_eq!(
            CyclicFrame::decode(&raw).unwrap_err(),
            DecodeError::MissingItem(0x00B1)
        );
    }

    #[test]
    fn truncated_io_header_is_eof() {
        let raw = [0x01, 0x00, 0xB1, 0x00, 0x02, 0x00, 0x01, 0x00];
        assert_eq!(
            CyclicFrame::decode(&raw).unwrap_err(),
            DecodeError::UnexpectedEof
        );
    }
}
