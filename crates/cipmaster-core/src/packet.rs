use crate::codec::{self, codec_for, HumanValue, ValidationError, WireValue};
use crate::layout::{AssemblyLayout, FieldSpec, FieldType};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    UnknownField(String),
    Unsupported { id: String, field_type: FieldType },
    TypeMismatch(String),
    TooLong { id: String, max: u32 },
    TooShort { expected: usize, actual: usize },
    Validation(ValidationError),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField(id) => write!(f, "Field {id} does not exist in this assembly."),
            Self::Unsupported { id, field_type } => write!(
                f,
                "Field {id} has unsupported type {field_type} and cannot be set via this command."
            ),
            Self::TypeMismatch(id) => write!(f, "value kind does not match field {id}"),
            Self::TooLong { id, max } => write!(f, "value for field {id} exceeds {max} bytes"),
            Self::TooShort { expected, actual } => {
                write!(f, "payload has {actual} bytes, assembly needs {expected}")
            }
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PacketError {}

impl From<ValidationError> for PacketError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Byte buffer of one assembly plus the layout describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketInstance {
    layout: Arc<AssemblyLayout>,
    bytes: Vec<u8>,
}

impl PacketInstance {
    /// All-zero instance.
    pub fn new(layout: Arc<AssemblyLayout>) -> Self {
        let bytes = vec![0u8; layout.size_bytes()];
        Self { layout, bytes }
    }

    /// Builds an instance from received bytes. Extra trailing bytes are ignored.
    pub fn from_bytes(layout: Arc<AssemblyLayout>, data: &[u8]) -> Result<Self, PacketError> {
        let expected = layout.size_bytes();
        if data.len() < expected {
            return Err(PacketError::TooShort {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            bytes: data[..expected].to_vec(),
            layout,
        })
    }

    pub fn layout(&self) -> &Arc<AssemblyLayout> {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn field(&self, id: &str) -> Result<&FieldSpec, PacketError> {
        self.layout
            .field(id)
            .ok_or_else(|| PacketError::UnknownField(id.into()))
    }

    pub fn wire(&self, id: &str) -> Result<WireValue, PacketError> {
        let field = self.field(id)?;
        let start = field.byte_offset();
        let raw = self
            .bytes
            .get(start..start + field.width_bytes().max(1))
            .ok_or_else(|| PacketError::UnknownField(id.into()))?;
        Ok(match field.field_type {
            FieldType::Bool => WireValue::Bit(raw[0] & field.bit_mask() != 0),
            FieldType::UInt8 => WireValue::U8(raw[0]),
            FieldType::Int8 => WireValue::I8(raw[0] as i8),
            FieldType::UInt16 => WireValue::U16(u16::from_be_bytes([raw[0], raw[1]])),
            FieldType::UInt32 => {
                WireValue::U32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            FieldType::Float32 => {
                WireValue::Float32(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            FieldType::Float64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&raw[..8]);
                WireValue::Float64(u64::from_be_bytes(buf))
            }
            FieldType::FixedString => WireValue::Bytes(raw.to_vec()),
        })
    }

    pub fn set_wire(&mut self, id: &str, value: &WireValue) -> Result<(), PacketError> {
        let field = self.field(id)?.clone();
        let start = field.byte_offset();
        let slot = self
            .bytes
            .get_mut(start..start + field.width_bytes().max(1))
            .ok_or_else(|| PacketError::UnknownField(field.id.clone()))?;
        match (field.field_type, value) {
            (FieldType::Bool, WireValue::Bit(set)) => {
                if *set {
                    slot[0] |= field.bit_mask();
                } else {
                    slot[0] &= !field.bit_mask();
                }
            }
            (FieldType::UInt8, WireValue::U8(v)) => slot[0] = *v,
            (FieldType::Int8, WireValue::I8(v)) => slot[0] = *v as u8,
            (FieldType::UInt16, WireValue::U16(v)) => slot[..2].copy_from_slice(&v.to_be_bytes()),
            (FieldType::UInt32, WireValue::U32(v)) => slot[..4].copy_from_slice(&v.to_le_bytes()),
            (FieldType::Float32, WireValue::Float32(bits)) => {
                slot[..4].copy_from_slice(&bits.to_be_bytes())
            }
            (FieldType::Float64, WireValue::Float64(bits)) => {
                slot[..8].copy_from_slice(&bits.to_be_bytes())
            }
            (FieldType::FixedString, WireValue::Bytes(data)) => {
                if data.len() > slot.len() {
                    return Err(PacketError::TooLong {
                        id: field.id,
                        max: field.length,
                    });
                }
                slot[..data.len()].copy_from_slice(data);
                slot[data.len()..].fill(0);
            }
            _ => return Err(PacketError::TypeMismatch(field.id)),
        }
        Ok(())
    }

    /// Validates and stores a human value. On error the buffer is unchanged.
    pub fn set(&mut self, id: &str, value: &HumanValue) -> Result<(), PacketError> {
        let field = self.field(id)?;
        let codec = codec_for(field.field_type).ok_or_else(|| PacketError::Unsupported {
            id: field.id.clone(),
            field_type: field.field_type,
        })?;
        let wire = codec.encode(field, value)?;
        self.set_wire(id, &wire)
    }

    /// Empty text for strings, zero for everything else.
    pub fn clear(&mut self, id: &str) -> Result<(), PacketError> {
        let field = self.field(id)?;
        let value = match field.field_type {
            FieldType::FixedString => HumanValue::Text(String::new()),
            _ => HumanValue::Int(0),
        };
        self.set(id, &value)
    }

    pub fn get(&self, id: &str) -> Result<HumanValue, PacketError> {
        let field = self.field(id)?;
        Ok(codec::decode(field, &self.wire(id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{PacketError, PacketInstance};
    use crate::codec::{HumanValue, WireValue};
    use crate::layout::{AssemblyLayout, FieldSpec, FieldType};
    use std::sync::Arc;

    fn layout() -> Arc<AssemblyLayout> {
        Arc::new(
            AssemblyLayout::compile(
                vec![
                    FieldSpec::new("Alive", 0, FieldType::UInt8, 1),
                    FieldSpec::new("Flag", 9, FieldType::Bool, 1),
                    FieldSpec::new("Word", 16, FieldType::UInt16, 1),
                    FieldSpec::new("Secs", 32, FieldType::UInt32, 1),
                    FieldSpec::new("Speed", 64, FieldType::Float32, 1),
                    FieldSpec::new("Name", 96, FieldType::FixedString, 4),
                ],
                128,
            )
            .unwrap(),
        )
    }

    #[test]
    fn values_land_at_their_offsets() {
        let mut packet = PacketInstance::new(layout());
        packet.set("Alive", &"7".into()).unwrap();
        packet.set("Flag", &"true".into()).unwrap();
        packet.set("Word", &"0x1234".into()).unwrap();
        packet.set_wire("Secs", &WireValue::U32(0x0102_0304)).unwrap();
        packet.set("Speed", &"1.0".into()).unwrap();
        packet.set("Name", &"ab".into()).unwrap();

        assert_eq!(
            packet.as_bytes(),
            &[
                0x07, 0x40, 0x34, 0x12, 0x04, 0x03, 0x02, 0x01, 0x00, 0x00, 0x80, 0x3F, b'a', b'b',
                0, 0
            ]
        );
        assert_eq!(packet.get("Word").unwrap(), HumanValue::Int(0x1234));
        assert_eq!(packet.get("Speed").unwrap(), HumanValue::Float(1.0));
        assert_eq!(packet.get("Name").unwrap(), HumanValue::Text("ab".into()));
        assert_eq!(packet.get("Secs").unwrap(), HumanValue::Int(0x0102_0304));
    }

    #[test]
    fn rejected_value_keeps_previous_bytes() {
        let mut packet = PacketInstance::new(layout());
        packet.set("Alive", &"0x10".into()).unwrap();
        let before = packet.as_bytes().to_vec();
        assert!(matches!(
            packet.set("Alive", &"300".into()),
            Err(PacketError::Validation(_))
        ));
        assert_eq!(packet.as_bytes(), before.as_slice());
    }

    #[test]
    fn clear_resets_strings_and_numbers() {
        let mut packet = PacketInstance::new(layout());
        packet.set("Name", &"abcd".into()).unwrap();
        packet.set("Flag", &"1".into()).unwrap();
        packet.clear("Name").unwrap();
        packet.clear("Flag").unwrap();
        assert!(packet.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn codecless_field_is_unsupported() {
        let mut packet = PacketInstance::new(layout());
        let err = packet.set("Secs", &"1".into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Field Secs has unsupported type udint and cannot be set via this command."
        );
        assert!(matches!(
            packet.clear("Secs"),
            Err(PacketError::Unsupported { .. })
        ));
    }

    #[test]
    fn short_payload_is_rejected_long_is_truncated() {
        let err = PacketInstance::from_bytes(layout(), &[0u8; 4]).unwrap_err();
        assert_eq!(
            err,
            PacketError::TooShort {
                expected: 16,
                actual: 4
            }
        );
        let packet = PacketInstance::from_bytes(layout(), &[1u8; 20]).unwrap();
        assert_eq!(packet.as_bytes().len(), 16);
    }

    #[test]
    fn unknown_field_is_reported() {
        let packet = PacketInstance::new(layout());
        assert_eq!(
            packet.get("Nope").unwrap_err(),
            PacketError::UnknownField("Nope".into())
        );
    }
}
