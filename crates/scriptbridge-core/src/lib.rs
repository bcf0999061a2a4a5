//! Core value model for scriptbridge.
//!
//! This crate defines what crosses the boundary between a host program and
//! embedded scripts: the kinds of values, the host-side representation of
//! primitives and shared composites, the proxy handles scripts operate on,
//! and the error type shared by every bridge operation. It knows nothing
//! about any particular interpreter.

mod composite;
mod error;
mod handle;
mod kind;
mod value;

pub use composite::{
    BoundMethod, ChannelRef, MappingRef, Method, MethodFn, PointerRef, SequenceRef, StructRef,
    StructType, StructTypeBuilder,
};
pub use error::{BridgeError, BridgeResult};
pub use handle::{Builtin, Handle, HandleIter, Key, Member, Target};
pub use kind::{BridgeKind, NumberKind, TypeHint};
pub use value::{HostFn, HostFunction, HostValue, Primitive, Unmarshal};
