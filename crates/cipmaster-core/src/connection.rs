use crate::layout::AssemblyLayout;
use core::fmt;

/// Fixed owner / point-to-point bits of the OT network connection parameters.
pub const OT_PARAM_BASE: u32 = 0x4800;
/// Fixed multicast bits of the TO network connection parameters.
pub const TO_PARAM_BASE: u32 = 0x2800;
/// Sequence count, run/idle header and item overhead added to the assembly size.
pub const CONNECTION_SIZE_OVERHEAD: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Originator to target (master output).
    OriginatorToTarget,
    /// Target to originator (master input).
    TargetToOriginator,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OriginatorToTarget => f.write_str("OT"),
            Self::TargetToOriginator => f.write_str("TO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingAssembly(pub Direction);

impl fmt::Display for MissingAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} assembly size is unknown", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MissingAssembly {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionParameters {
    pub ot_param: u32,
    pub to_param: u32,
}

impl ConnectionParameters {
    pub const fn from_sizes(ot_size_bytes: u32, to_size_bytes: u32) -> Self {
        Self {
            ot_param: OT_PARAM_BASE | (ot_size_bytes + CONNECTION_SIZE_OVERHEAD),
            to_param: TO_PARAM_BASE | (to_size_bytes + CONNECTION_SIZE_OVERHEAD),
        }
    }

    pub fn from_layouts(
        ot: Option<&AssemblyLayout>,
        to: Option<&AssemblyLayout>,
    ) -> Result<Self, MissingAssembly> {
        let ot = ot.ok_or(MissingAssembly(Direction::OriginatorToTarget))?;
        let to = to.ok_or(MissingAssembly(Direction::TargetToOriginator))?;
        Ok(Self::from_sizes(
            ot.size_bytes() as u32,
            to.size_bytes() as u32,
        ))
    }
}
