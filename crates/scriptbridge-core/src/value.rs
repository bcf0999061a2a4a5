//! Host-side values.
//!
//! [`HostValue`] is what the host hands to the bridge and what it gets back.
//! Primitives are carried by value; composites are shared references, so a
//! script holding a proxy and the host holding the original observe the same
//! storage.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::composite::{ChannelRef, MappingRef, PointerRef, SequenceRef, StructRef};
use crate::error::{BridgeError, BridgeResult};
use crate::kind::{BridgeKind, NumberKind, TypeHint};

/// A value owned by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Absent value.
    #[default]
    Nil,

    /// Boolean value.
    Bool(bool),

    /// Signed integer of any width.
    Int(i64),

    /// Unsigned integer of any width.
    UInt(u64),

    /// Floating point value of any width.
    Float(f64),

    /// UTF-8 string.
    String(String),

    /// Growable sequence of values sharing one element type.
    Sequence(SequenceRef),

    /// String-keyed mapping.
    Mapping(MappingRef),

    /// Bounded channel.
    Channel(ChannelRef),

    /// Struct-like record with fields and methods.
    Struct(StructRef),

    /// Host function callable from scripts.
    Function(HostFunction),

    /// Mutable reference to another value.
    Pointer(PointerRef),
}

impl HostValue {
    /// Wrap a value in a fresh pointer cell.
    ///
    /// Composites reached through a pointer are exposed to scripts as
    /// mutable handles.
    pub fn pointer(value: impl Into<HostValue>) -> Self {
        Self::Pointer(PointerRef::new(value.into()))
    }

    /// The bridge kind of this value.
    pub fn kind(&self) -> BridgeKind {
        match self {
            Self::Nil => BridgeKind::Nil,
            Self::Bool(_) => BridgeKind::Bool,
            Self::Int(_) | Self::UInt(_) | Self::Float(_) => BridgeKind::Number,
            Self::String(_) => BridgeKind::String,
            Self::Sequence(_) => BridgeKind::Sequence,
            Self::Mapping(_) => BridgeKind::Mapping,
            Self::Channel(_) => BridgeKind::Channel,
            Self::Struct(_) => BridgeKind::StructLike,
            Self::Function(_) => BridgeKind::Function,
            Self::Pointer(_) => BridgeKind::PointerLike,
        }
    }

    /// The widest hint that describes this value.
    pub fn hint(&self) -> TypeHint {
        match self {
            Self::Int(_) => TypeHint::Number(NumberKind::I64),
            Self::UInt(_) => TypeHint::Number(NumberKind::U64),
            Self::Float(_) => TypeHint::Number(NumberKind::F64),
            Self::Nil => TypeHint::Nil,
            Self::Bool(_) => TypeHint::Bool,
            Self::String(_) => TypeHint::String,
            Self::Sequence(_) => TypeHint::Sequence,
            Self::Mapping(_) => TypeHint::Mapping,
            Self::Channel(_) => TypeHint::Channel,
            Self::Struct(_) => TypeHint::StructLike,
            Self::Function(_) => TypeHint::Function,
            Self::Pointer(_) => TypeHint::PointerLike,
        }
    }

    /// The zero value for a destination hint.
    pub fn zero(hint: TypeHint) -> Self {
        match hint {
            TypeHint::Bool => Self::Bool(false),
            TypeHint::Number(kind) => kind.from_i64(0),
            TypeHint::String => Self::String(String::new()),
            _ => Self::Nil,
        }
    }

    /// Check if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => Some(*u as i64),
            _ => None,
        }
    }

    /// Try to get this value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Signature of a host function body.
pub type HostFn = dyn Fn(Vec<HostValue>) -> BridgeResult<HostValue> + Send + Sync;

/// A host function exposed to scripts.
///
/// Arguments coming from a script are converted with the declared parameter
/// hints before the body runs; missing arguments are converted from nil.
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    params: Arc<[TypeHint]>,
    func: Arc<HostFn>,
}

impl HostFunction {
    /// Create a host function with declared parameter hints.
    pub fn new<F>(name: impl Into<String>, params: impl Into<Vec<TypeHint>>, func: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> BridgeResult<HostValue> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            params: Arc::from(params.into()),
            func: Arc::new(func),
        }
    }

    /// Function name, used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter hints.
    pub fn params(&self) -> &[TypeHint] {
        &self.params
    }

    /// Invoke the function body.
    pub fn call(&self, args: Vec<HostValue>) -> BridgeResult<HostValue> {
        (self.func)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

/// A primitive value that can be written in configuration files or on the
/// command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Primitive {
    /// Parse a literal: booleans, then integers, then floats, else a string.
    pub fn parse(s: &str) -> Self {
        match s {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Self::Float(f);
        }
        Self::String(s.to_string())
    }
}

impl From<Primitive> for HostValue {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Bool(b) => Self::Bool(b),
            Primitive::Int(i) => Self::Int(i),
            Primitive::Float(f) => Self::Float(f),
            Primitive::String(s) => Self::String(s),
        }
    }
}

/// A host type that a script value can be unmarshalled into.
///
/// Each implementation names its destination [`TypeHint`]; the bridge
/// converts the script value with that hint and then extracts the typed
/// value. Destinations whose hint is outside the convertible set compile,
/// but unmarshalling into them fails with [`BridgeError::UnsupportedType`].
pub trait Unmarshal: Sized {
    /// Destination hint for this type.
    const HINT: TypeHint;

    /// Extract `Self` from a converted host value.
    fn from_host(value: HostValue) -> Option<Self>;

    /// Extract `Self`, reporting a mismatch if the value has another kind.
    fn unmarshal(value: HostValue) -> BridgeResult<Self> {
        let found = value.kind().to_string();
        Self::from_host(value).ok_or_else(|| BridgeError::mismatch(Self::HINT, found))
    }
}

impl Unmarshal for String {
    const HINT: TypeHint = TypeHint::String;

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Unmarshal for bool {
    const HINT: TypeHint = TypeHint::Bool;

    fn from_host(value: HostValue) -> Option<Self> {
        value.as_bool()
    }
}

macro_rules! number_conversions {
    ($variant:ident as $wide:ty: $($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Unmarshal for $ty {
            const HINT: TypeHint = TypeHint::Number(NumberKind::$kind);

            fn from_host(value: HostValue) -> Option<Self> {
                match value {
                    HostValue::Int(v) => Some(v as $ty),
                    HostValue::UInt(v) => Some(v as $ty),
                    HostValue::Float(v) => Some(v as $ty),
                    _ => None,
                }
            }
        }

        impl From<$ty> for HostValue {
            fn from(v: $ty) -> Self {
                Self::$variant(v as $wide)
            }
        }
    )*};
}

number_conversions!(Int as i64: i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize);
number_conversions!(UInt as u64: u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize);
number_conversions!(Float as f64: f32 => F32, f64 => F64);

macro_rules! composite_conversions {
    ($($ty:ty => $variant:ident, $hint:ident);* $(;)?) => {$(
        impl Unmarshal for $ty {
            const HINT: TypeHint = TypeHint::$hint;

            fn from_host(value: HostValue) -> Option<Self> {
                match value {
                    HostValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for HostValue {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }
    )*};
}

composite_conversions! {
    SequenceRef => Sequence, Sequence;
    MappingRef => Mapping, Mapping;
    ChannelRef => Channel, Channel;
    StructRef => Struct, StructLike;
    PointerRef => Pointer, PointerLike;
    HostFunction => Function, Function;
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

impl<T: Into<HostValue> + Unmarshal> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        Self::Sequence(SequenceRef::of(items))
    }
}
