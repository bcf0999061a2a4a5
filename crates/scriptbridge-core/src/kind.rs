//! Value kinds and conversion hints.
//!
//! Every value crossing the bridge is classified by a [`BridgeKind`]. When a
//! script value is converted back into a host value, the expected shape of
//! the destination is described by a [`TypeHint`], which refines
//! [`BridgeKind::Number`] with the concrete host width.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::value::HostValue;

/// The closed set of value kinds the bridge knows how to move across the
/// host/script boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    Nil,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
    Channel,
    StructLike,
    Function,
    PointerLike,
}

impl BridgeKind {
    /// Whether values of this kind are exposed to scripts as proxies.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Self::Sequence | Self::Mapping | Self::Channel | Self::StructLike | Self::PointerLike
        )
    }

    /// Whether values of this kind are converted by value.
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Nil | Self::Bool | Self::Number | Self::String)
    }
}

/// Host numeric widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NumberKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
}

impl NumberKind {
    /// Whether this is a floating point width.
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Whether this is an unsigned integer width.
    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64 | Self::Usize)
    }

    /// Narrow an integer to this width.
    ///
    /// Integer-to-integer narrowing wraps, integer-to-float rounds to the
    /// nearest representable value.
    pub fn from_i64(self, v: i64) -> HostValue {
        match self {
            Self::I8 => HostValue::Int(v as i8 as i64),
            Self::I16 => HostValue::Int(v as i16 as i64),
            Self::I32 => HostValue::Int(v as i32 as i64),
            Self::I64 => HostValue::Int(v),
            Self::Isize => HostValue::Int(v as isize as i64),
            Self::U8 => HostValue::UInt(v as u8 as u64),
            Self::U16 => HostValue::UInt(v as u16 as u64),
            Self::U32 => HostValue::UInt(v as u32 as u64),
            Self::U64 => HostValue::UInt(v as u64),
            Self::Usize => HostValue::UInt(v as usize as u64),
            Self::F32 => HostValue::Float(v as f32 as f64),
            Self::F64 => HostValue::Float(v as f64),
        }
    }

    /// Narrow a float to this width. Float-to-integer truncates toward zero.
    pub fn from_f64(self, v: f64) -> HostValue {
        match self {
            Self::I8 => HostValue::Int(v as i8 as i64),
            Self::I16 => HostValue::Int(v as i16 as i64),
            Self::I32 => HostValue::Int(v as i32 as i64),
            Self::I64 => HostValue::Int(v as i64),
            Self::Isize => HostValue::Int(v as isize as i64),
            Self::U8 => HostValue::UInt(v as u8 as u64),
            Self::U16 => HostValue::UInt(v as u16 as u64),
            Self::U32 => HostValue::UInt(v as u32 as u64),
            Self::U64 => HostValue::UInt(v as u64),
            Self::Usize => HostValue::UInt(v as usize as u64),
            Self::F32 => HostValue::Float(v as f32 as f64),
            Self::F64 => HostValue::Float(v),
        }
    }
}

/// Description of a conversion destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeHint {
    Nil,
    Bool,
    Number(NumberKind),
    String,
    Sequence,
    Mapping,
    Channel,
    StructLike,
    Function,
    PointerLike,
}

impl TypeHint {
    /// The kind this hint refines.
    pub fn kind(self) -> BridgeKind {
        match self {
            Self::Nil => BridgeKind::Nil,
            Self::Bool => BridgeKind::Bool,
            Self::Number(_) => BridgeKind::Number,
            Self::String => BridgeKind::String,
            Self::Sequence => BridgeKind::Sequence,
            Self::Mapping => BridgeKind::Mapping,
            Self::Channel => BridgeKind::Channel,
            Self::StructLike => BridgeKind::StructLike,
            Self::Function => BridgeKind::Function,
            Self::PointerLike => BridgeKind::PointerLike,
        }
    }

    /// Whether a script value can be converted into this destination.
    ///
    /// Only strings, numbers of any width and booleans qualify; anything
    /// else is reported as unsupported.
    pub fn is_convertible(self) -> bool {
        matches!(self, Self::Bool | Self::Number(_) | Self::String)
    }
}

impl std::fmt::Display for TypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(width) => write!(f, "number({width})"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

impl From<NumberKind> for TypeHint {
    fn from(kind: NumberKind) -> Self {
        Self::Number(kind)
    }
}
