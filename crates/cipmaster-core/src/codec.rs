//! Field codec registry.
//!
//! Each supported [`FieldType`] has a codec translating between the value a
//! user types ([`HumanValue`]) and what is stored in the assembly
//! ([`WireValue`]). `UInt16` and `Float32` values are byte-reversed on the
//! wire; the transform is its own inverse so decode applies it again.

use crate::layout::{FieldSpec, FieldType};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// A value as entered or displayed.
#[derive(Debug, Clone, PartialEq)]
pub enum HumanValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for HumanValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HumanValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for HumanValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for HumanValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for HumanValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for HumanValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl fmt::Display for HumanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Bytes(v) => {
                f.write_str("0x")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A value in its stored form. Floats are kept as raw bit patterns so the
/// byte-reversed representation survives untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Bit(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    U32(u32),
    Float32(u32),
    Float64(u64),
    Bytes(Vec<u8>),
}

/// Constraints used to build validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDescription {
    pub range: Option<(u64, u64)>,
    pub allowed_values: &'static [&'static str],
    pub max_length: Option<u32>,
    pub format: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field_id: String,
    pub reason: String,
    pub description: ValidationDescription,
    /// Declared type and bit offset; absent for compiler-inserted spares.
    pub context: Option<(FieldType, u32)>,
}

impl ValidationError {
    fn new(field: &FieldSpec, reason: impl Into<String>, description: ValidationDescription) -> Self {
        Self {
            field_id: field.id.clone(),
            reason: reason.into(),
            description,
            context: (!field.spare).then_some((field.field_type, field.bit_offset)),
        }
    }

    pub fn details(&self) -> Vec<String> {
        let desc = &self.description;
        let mut details = Vec::new();
        if let Some((low, high)) = desc.range {
            details.push(format!("allowed range {low}-{high}"));
        }
        if !desc.allowed_values.is_empty() {
            details.push(format!("allowed values {}", desc.allowed_values.join(", ")));
        }
        if let Some(max) = desc.max_length {
            details.push(format!("max length {max} bytes"));
        }
        if let Some(fmt) = desc.format {
            details.push(format!("format {fmt}"));
        }
        if let Some((field_type, offset)) = self.context {
            details.push(format!("type {}", field_type.xml_tag()));
            details.push(format!("offset {offset}"));
        }
        details
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field {} {}", self.field_id, self.reason)?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({})", details.join("; "))?;
        }
        f.write_str(".")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ValidationError {}

pub trait FieldCodec: Sync {
    fn name(&self) -> &'static str;
    fn describe(&self, field: &FieldSpec) -> ValidationDescription;
    fn encode(&self, field: &FieldSpec, value: &HumanValue) -> Result<WireValue, ValidationError>;
    fn decode(&self, field: &FieldSpec, wire: &WireValue) -> HumanValue;
}

struct FloatCodec;
struct ShortCodec;
struct ByteCodec;
struct BoolCodec;
struct StringCodec;

/// Codec for a field type; `UInt32`, `Int8` and `Float64` have none.
pub fn codec_for(field_type: FieldType) -> Option<&'static dyn FieldCodec> {
    match field_type {
        FieldType::Float32 => Some(&FloatCodec),
        FieldType::UInt16 => Some(&ShortCodec),
        FieldType::UInt8 => Some(&ByteCodec),
        FieldType::Bool => Some(&BoolCodec),
        FieldType::FixedString => Some(&StringCodec),
        FieldType::UInt32 | FieldType::Int8 | FieldType::Float64 => None,
    }
}

/// Decodes through the registered codec, or returns the raw value.
pub fn decode(field: &FieldSpec, wire: &WireValue) -> HumanValue {
    match codec_for(field.field_type) {
        Some(codec) => codec.decode(field, wire),
        None => raw_value(wire),
    }
}

pub fn describe(field: &FieldSpec) -> ValidationDescription {
    codec_for(field.field_type)
        .map(|codec| codec.describe(field))
        .unwrap_or_default()
}

fn raw_value(wire: &WireValue) -> HumanValue {
    match wire {
        WireValue::Bit(v) => HumanValue::Int(i64::from(*v)),
        WireValue::U8(v) => HumanValue::Int(i64::from(*v)),
        WireValue::I8(v) => HumanValue::Int(i64::from(*v)),
        WireValue::U16(v) => HumanValue::Int(i64::from(*v)),
        WireValue::U32(v) => HumanValue::Int(i64::from(*v)),
        WireValue::Float32(bits) => HumanValue::Float(f64::from(f32::from_bits(*bits))),
        WireValue::Float64(bits) => HumanValue::Float(f64::from_bits(*bits)),
        WireValue::Bytes(v) => HumanValue::Bytes(v.clone()),
    }
}

fn coerce_int(value: &HumanValue) -> Option<i128> {
    match value {
        HumanValue::Bool(v) => Some(i128::from(*v)),
        HumanValue::Int(v) => Some(i128::from(*v)),
        HumanValue::Float(v) if v.is_finite() && *v == (*v as i128) as f64 => Some(*v as i128),
        HumanValue::Float(_) | HumanValue::Bytes(_) => None,
        HumanValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => i128::from_str_radix(hex, 16).ok(),
                None => text.parse().ok(),
            }
        }
    }
}

fn coerce_float(value: &HumanValue) -> Option<f64> {
    match value {
        HumanValue::Bool(v) => Some(f64::from(u8::from(*v))),
        HumanValue::Int(v) => Some(*v as f64),
        HumanValue::Float(v) => Some(*v),
        HumanValue::Text(text) => text.trim().parse().ok(),
        HumanValue::Bytes(_) => None,
    }
}

fn ranged_int(
    field: &FieldSpec,
    value: &HumanValue,
    desc: ValidationDescription,
    max: u64,
) -> Result<u64, ValidationError> {
    let numeric = coerce_int(value)
        .ok_or_else(|| ValidationError::new(field, "expects an integer value", desc.clone()))?;
    if !(0..=i128::from(max)).contains(&numeric) {
        return Err(ValidationError::new(field, "expects a value within range", desc));
    }
    Ok(numeric as u64)
}

impl FieldCodec for FloatCodec {
    fn name(&self) -> &'static str {
        "float"
    }

    fn describe(&self, _field: &FieldSpec) -> ValidationDescription {
        ValidationDescription {
            format: Some("floating point number"),
            ..Default::default()
        }
    }

    fn encode(&self, field: &FieldSpec, value: &HumanValue) -> Result<WireValue, ValidationError> {
        let numeric = coerce_float(value).ok_or_else(|| {
            ValidationError::new(field, "expects a floating point value", self.describe(field))
        })?;
        let single = numeric as f32;
        if numeric.is_finite() && !single.is_finite() {
            return Err(ValidationError::new(
                field,
                "expects a value within range",
                self.describe(field),
            ));
        }
        Ok(WireValue::Float32(single.to_bits().swap_bytes()))
    }

    fn decode(&self, _field: &FieldSpec, wire: &WireValue) -> HumanValue {
        match wire {
            WireValue::Float32(bits) => {
                HumanValue::Float(f64::from(f32::from_bits(bits.swap_bytes())))
            }
            other => raw_value(other),
        }
    }
}

impl FieldCodec for ShortCodec {
    fn name(&self) -> &'static str {
        "short"
    }

    fn describe(&self, _field: &FieldSpec) -> ValidationDescription {
        ValidationDescription {
            range: Some((0, 0xFFFF)),
            format: Some("decimal or hex (0x0000-0xFFFF)"),
            ..Default::default()
        }
    }

    fn encode(&self, field: &FieldSpec, value: &HumanValue) -> Result<WireValue, ValidationError> {
        let numeric = ranged_int(field, value, self.describe(field), 0xFFFF)?;
        Ok(WireValue::U16((numeric as u16).swap_bytes()))
    }

    fn decode(&self, _field: &FieldSpec, wire: &WireValue) -> HumanValue {
        match wire {
            WireValue::U16(v) => HumanValue::Int(i64::from(v.swap_bytes())),
            other => raw_value(other),
        }
    }
}

impl FieldCodec for ByteCodec {
    fn name(&self) -> &'static str {
        "byte"
    }

    fn describe(&self, _field: &FieldSpec) -> ValidationDescription {
        ValidationDescription {
            range: Some((0, 0xFF)),
            format: Some("decimal or hex (0x00-0xFF)"),
            ..Default::default()
        }
    }

    fn encode(&self, field: &FieldSpec, value: &HumanValue) -> Result<WireValue, ValidationError> {
        let numeric = ranged_int(field, value, self.describe(field), 0xFF)?;
        Ok(WireValue::U8(numeric as u8))
    }

    fn decode(&self, _field: &FieldSpec, wire: &WireValue) -> HumanValue {
        raw_value(wire)
    }
}

impl FieldCodec for BoolCodec {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn describe(&self, _field: &FieldSpec) -> ValidationDescription {
        ValidationDescription {
            allowed_values: &["0", "1", "true", "false"],
            ..Default::default()
        }
    }

    fn encode(&self, field: &FieldSpec, value: &HumanValue) -> Result<WireValue, ValidationError> {
        let bit = match value {
            HumanValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
            HumanValue::Bool(v) => Some(*v),
            HumanValue::Int(0) => Some(false),
            HumanValue::Int(1) => Some(true),
            HumanValue::Float(v) if *v == 0.0 => Some(false),
            HumanValue::Float(v) if *v == 1.0 => Some(true),
            _ => None,
        };
        bit.map(WireValue::Bit).ok_or_else(|| {
            ValidationError::new(field, "expects a boolean value", self.describe(field))
        })
    }

    fn decode(&self, _field: &FieldSpec, wire: &WireValue) -> HumanValue {
        let set = match wire {
            WireValue::Bit(v) => *v,
            WireValue::Bytes(v) => v.iter().any(|byte| *byte != 0),
            other => !matches!(raw_value(other), HumanValue::Int(0)),
        };
        HumanValue::Int(i64::from(set))
    }
}

impl FieldCodec for StringCodec {
    fn name(&self) -> &'static str {
        "string"
    }

    fn describe(&self, field: &FieldSpec) -> ValidationDescription {
        ValidationDescription {
            max_length: Some(field.length),
            format: Some("UTF-8 text"),
            ..Default::default()
        }
    }

    fn encode(&self, field: &FieldSpec, value: &HumanValue) -> Result<WireValue, ValidationError> {
        let bytes = match value {
            HumanValue::Text(text) => text.as_bytes().to_vec(),
            HumanValue::Bytes(bytes) => bytes.clone(),
            _ => {
                return Err(ValidationError::new(
                    field,
                    "expects text or bytes",
                    self.describe(field),
                ))
            }
        };
        if bytes.len() > field.length as usize {
            return Err(ValidationError::new(
                field,
                format!("expects at most {} bytes", field.length),
                self.describe(field),
            ));
        }
        Ok(WireValue::Bytes(bytes))
    }

    fn decode(&self, _field: &FieldSpec, wire: &WireValue) -> HumanValue {
        match wire {
            WireValue::Bytes(bytes) => match core::str::from_utf8(bytes) {
                Ok(text) => HumanValue::Text(text.trim_end_matches('\0').to_string()),
                Err(_) => HumanValue::Bytes(bytes.clone()),
            },
            other => raw_value(other),
        }
    }
}
