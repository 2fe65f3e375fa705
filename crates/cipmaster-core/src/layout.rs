//! Assembly layout compiler.
//!
//! Turns the declared fields of an assembly into a gap-free list covering
//! every bit of the assembly exactly once. Unused bytes become FixedString
//! spares named `spare_byte_{start}` and unused bits of a byte holding bools
//! become `spare_bit_{byte}_{bit}`.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Concrete field types an assembly may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldType {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Float32,
    Float64,
    FixedString,
}

impl FieldType {
    /// Maps an assembly XML element name to a field type. `int`, `dint`,
    /// `lint` and anything unknown have no mapping.
    pub fn from_xml_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "bool" => Self::Bool,
            "usint" => Self::UInt8,
            "uint" => Self::UInt16,
            "udint" => Self::UInt32,
            "sint" => Self::Int8,
            "real" => Self::Float32,
            "lreal" => Self::Float64,
            "string" => Self::FixedString,
            _ => return None,
        })
    }

    pub const fn xml_tag(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::UInt8 => "usint",
            Self::UInt16 => "uint",
            Self::UInt32 => "udint",
            Self::Int8 => "sint",
            Self::Float32 => "real",
            Self::Float64 => "lreal",
            Self::FixedString => "string",
        }
    }

    /// Bytes per element. Bools are sub-byte and report 0.
    pub const fn unit_size(self) -> u32 {
        match self {
            Self::Bool => 0,
            Self::UInt8 | Self::Int8 | Self::FixedString => 1,
            Self::UInt16 => 2,
            Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xml_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSpec {
    pub id: String,
    pub bit_offset: u32,
    pub field_type: FieldType,
    /// Element count; bytes for strings, always 1 for bools.
    pub length: u32,
    /// Placeholder inserted by the compiler rather than declared.
    pub spare: bool,
}

impl FieldSpec {
    /// `length` is ignored for `Bool` fields, which always occupy one bit.
    pub fn new(id: impl Into<String>, bit_offset: u32, field_type: FieldType, length: u32) -> Self {
        let length = if field_type == FieldType::Bool {
            1
        } else {
            length
        };
        Self {
            id: id.into(),
            bit_offset,
            field_type,
            length,
            spare: false,
        }
    }

    fn placeholder(id: String, bit_offset: u32, field_type: FieldType, length: u32) -> Self {
        Self {
            spare: true,
            ..Self::new(id, bit_offset, field_type, length)
        }
    }

    pub fn width_bits(&self) -> u64 {
        match self.field_type {
            FieldType::Bool => 1,
            other => u64::from(self.length) * u64::from(other.unit_size()) * 8,
        }
    }

    pub fn width_bytes(&self) -> usize {
        (self.width_bits() / 8) as usize
    }

    pub const fn byte_offset(&self) -> usize {
        (self.bit_offset / 8) as usize
    }

    /// Mask of this bool inside its byte, most significant bit first.
    pub const fn bit_mask(&self) -> u8 {
        0x80 >> (self.bit_offset % 8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    SizeNotByteAligned(u32),
    DuplicateId(String),
    OutOfBounds(String),
    Misaligned(String),
    ZeroLength(String),
    Overlap(String),
    Coverage(u32),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeNotByteAligned(bits) => {
                write!(f, "assembly size {bits} bits is not a multiple of 8")
            }
            Self::DuplicateId(id) => write!(f, "field {id} is declared more than once"),
            Self::OutOfBounds(id) => write!(f, "field {id} does not fit in the assembly"),
            Self::Misaligned(id) => write!(f, "field {id} is not byte aligned"),
            Self::ZeroLength(id) => write!(f, "field {id} has zero length"),
            Self::Overlap(id) => write!(f, "field {id} overlaps another field"),
            Self::Coverage(bit) => write!(f, "layout does not cover bit {bit} exactly once"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LayoutError {}

/// Compiled, read-only layout of one assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyLayout {
    fields: Vec<FieldSpec>,
    total_bits: u32,
    index: BTreeMap<String, usize>,
}

impl AssemblyLayout {
    pub fn compile(specs: Vec<FieldSpec>, total_bits: u32) -> Result<Self, LayoutError> {
        if total_bits % 8 != 0 {
            return Err(LayoutError::SizeNotByteAligned(total_bits));
        }
        check_declared(&specs, total_bits)?;

        let mut sorted = specs;
        sorted.sort_by_key(|spec| spec.bit_offset);

        let total_bytes = (total_bits / 8) as usize;
        let mut emitted: Vec<FieldSpec> = Vec::with_capacity(sorted.len());
        let mut spare_run: Option<(usize, u32)> = None;
        let mut next = 0usize;
        let mut byte = 0usize;

        while byte < total_bytes {
            if let Some(behind) = sorted[next..]
                .iter()
                .find(|spec| spec.byte_offset() < byte)
            {
                return Err(LayoutError::Overlap(behind.id.clone()));
            }
            let here = sorted[next..]
                .iter()
                .take_while(|spec| spec.byte_offset() == byte)
                .count();

            if here == 0 {
                let (_, len) = spare_run.get_or_insert((byte, 0));
                *len += 1;
                byte += 1;
                continue;
            }

            flush_spare_run(&mut emitted, &mut spare_run);
            let group = &sorted[next..next + here];
            next += here;

            if let Some(field) = group.iter().find(|spec| spec.field_type != FieldType::Bool) {
                if group.len() > 1 {
                    let other = group.iter().find(|spec| spec.id != field.id).unwrap_or(field);
                    return Err(LayoutError::Overlap(other.id.clone()));
                }
                emitted.push(field.clone());
                byte += field.width_bytes();
                continue;
            }

            let mut bits: [Option<&FieldSpec>; 8] = [None; 8];
            for spec in group {
                let slot = &mut bits[(spec.bit_offset % 8) as usize];
                if slot.is_some() {
                    return Err(LayoutError::Overlap(spec.id.clone()));
                }
                *slot = Some(spec);
            }
            for (bit, slot) in bits.iter().enumerate() {
                match slot {
                    Some(spec) => emitted.push((*spec).clone()),
                    None => emitted.push(FieldSpec::placeholder(
                        format!("spare_bit_{byte}_{bit}"),
                        (byte * 8 + bit) as u32,
                        FieldType::Bool,
                        1,
                    )),
                }
            }
            byte += 1;
        }
        flush_spare_run(&mut emitted, &mut spare_run);

        if let Some(left) = sorted.get(next) {
            return Err(LayoutError::Overlap(left.id.clone()));
        }
        verify_partition(&emitted, total_bits)?;

        let index = emitted
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.id.clone(), idx))
            .collect();
        Ok(Self {
            fields: emitted,
            total_bits,
            index,
        })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn declared_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|spec| !spec.spare)
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.index.get(id).map(|idx| &self.fields[*idx])
    }

    pub const fn total_bits(&self) -> u32 {
        self.total_bits
    }

    pub const fn size_bytes(&self) -> usize {
        (self.total_bits / 8) as usize
    }
}

fn check_declared(specs: &[FieldSpec], total_bits: u32) -> Result<(), LayoutError> {
    let mut seen = BTreeMap::new();
    for spec in specs {
        if seen.insert(spec.id.as_str(), ()).is_some() {
            return Err(LayoutError::DuplicateId(spec.id.clone()));
        }
        if spec.field_type != FieldType::Bool {
            if spec.length == 0 {
                return Err(LayoutError::ZeroLength(spec.id.clone()));
            }
            if spec.bit_offset % 8 != 0 {
                return Err(LayoutError::Misaligned(spec.id.clone()));
            }
        }
        if u64::from(spec.bit_offset) + spec.width_bits() > u64::from(total_bits) {
            return Err(LayoutError::OutOfBounds(spec.id.clone()));
        }
    }
    Ok(())
}

fn flush_spare_run(emitted: &mut Vec<FieldSpec>, run: &mut Option<(usize, u32)>) {
    if let Some((start, len)) = run.take() {
        emitted.push(FieldSpec::placeholder(
            format!("spare_byte_{start}"),
            (start * 8) as u32,
            FieldType::FixedString,
            len,
        ));
    }
}

fn verify_partition(fields: &[FieldSpec], total_bits: u32) -> Result<(), LayoutError> {
    let mut cursor = 0u64;
    for spec in fields {
        if u64::from(spec.bit_offset) != cursor {
            return Err(LayoutError::Coverage(cursor as u32));
        }
        cursor += spec.width_bits();
    }
    if cursor != u64::from(total_bits) {
        return Err(LayoutError::Coverage(cursor as u32));
    }
    Ok(())
}
