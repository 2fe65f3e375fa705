use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

const MAX_PATH_LEN: usize = 24;

const SEGMENT_CLASS_8: u8 = 0x20;
const SEGMENT_CLASS_16: u8 = 0x21;
const SEGMENT_INSTANCE_8: u8 = 0x24;
const SEGMENT_INSTANCE_16: u8 = 0x25;
const SEGMENT_INSTANCE_32: u8 = 0x26;
const SEGMENT_ATTRIBUTE_8: u8 = 0x30;
const SEGMENT_ATTRIBUTE_16: u8 = 0x31;

/// A padded EPATH, always an even number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipPath {
    bytes: [u8; MAX_PATH_LEN],
    len: u8,
}

impl CipPath {
    /// Connection Manager object, class 0x06 instance 1.
    pub const CONNECTION_MANAGER: Self = Self::from_static([0x20, 0x06, 0x24, 0x01]);
    /// Message Router object, class 0x02 instance 1.
    pub const MESSAGE_ROUTER: Self = Self::from_static([0x20, 0x02, 0x24, 0x01]);

    const fn from_static(raw: [u8; 4]) -> Self {
        let mut bytes = [0u8; MAX_PATH_LEN];
        bytes[0] = raw[0];
        bytes[1] = raw[1];
        bytes[2] = raw[2];
        bytes[3] = raw[3];
        Self { bytes, len: 4 }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, EncodeError> {
        if raw.len() > MAX_PATH_LEN || raw.len() % 2 != 0 {
            return Err(EncodeError::InvalidLength);
        }
        let mut bytes = [0u8; MAX_PATH_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    pub fn class_instance(class_id: u16, instance_id: u32) -> Self {
        let mut path = Self {
            bytes: [0u8; MAX_PATH_LEN],
            len: 0,
        };
        path.push_class(class_id);
        path.push_instance(instance_id);
        path
    }

    pub fn class_instance_attribute(class_id: u16, instance_id: u32, attribute_id: u16) -> Self {
        let mut path = Self::class_instance(class_id, instance_id);
        if let Ok(small) = u8::try_from(attribute_id) {
            path.push(&[SEGMENT_ATTRIBUTE_8, small]);
        } else {
            let [lo, hi] = attribute_id.to_le_bytes();
            path.push(&[SEGMENT_ATTRIBUTE_16, 0, lo, hi]);
        }
        path
    }

    fn push_class(&mut self, class_id: u16) {
        if let Ok(small) = u8::try_from(class_id) {
            self.push(&[SEGMENT_CLASS_8, small]);
        } else {
            let [lo, hi] = class_id.to_le_bytes();
            self.push(&[SEGMENT_CLASS_16, 0, lo, hi]);
        }
    }

    fn push_instance(&mut self, instance_id: u32) {
        if let Ok(small) = u8::try_from(instance_id) {
            self.push(&[SEGMENT_INSTANCE_8, small]);
        } else if let Ok(medium) = u16::try_from(instance_id) {
            let [lo, hi] = medium.to_le_bytes();
            self.push(&[SEGMENT_INSTANCE_16, 0, lo, hi]);
        } else {
            let [b0, b1, b2, b3] = instance_id.to_le_bytes();
            self.push(&[SEGMENT_INSTANCE_32, 0, b0, b1, b2, b3]);
        }
    }

    // Segments built here never exceed 14 bytes, well inside the buffer.
    fn push(&mut self, segment: &[u8]) {
        let start = self.len as usize;
        self.bytes[start..start + segment.len()].copy_from_slice(segment);
        self.len += segment.len() as u8;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Path size in 16-bit words, as carried on the wire.
    pub const fn word_len(&self) -> u8 {
        self.len / 2
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.word_len())?;
        w.write_all(self.as_bytes())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let words = r.read_u8()? as usize;
        let raw = r.read_exact(words * 2)?;
        Self::from_bytes(raw).map_err(|_| DecodeError::InvalidLength)
    }

    /// Extracts the logical class and instance ids, if the path starts with them.
    pub fn class_and_instance(&self) -> Option<(u16, u32)> {
        let mut r = Reader::new(self.as_bytes());
        let class_id = match r.read_u8().ok()? {
            SEGMENT_CLASS_8 => u16::from(r.read_u8().ok()?),
            SEGMENT_CLASS_16 => {
                r.read_u8().ok()?;
                r.read_le_u16().ok()?
            }
            _ => return None,
        };
        let instance_id = match r.read_u8().ok()? {
            SEGMENT_INSTANCE_8 => u32::from(r.read_u8().ok()?),
            SEGMENT_INSTANCE_16 => {
                r.read_u8().ok()?;
                u32::from(r.read_le_u16().ok()?)
            }
            SEGMENT_INSTANCE_32 => {
                r.read_u8().ok()?;
                r.read_le_u32().ok()?
            }
            _ => return None,
        };
        Some((class_id, instance_id))
    }
}
