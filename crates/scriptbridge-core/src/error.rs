//! Error types for bridge operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::kind::{BridgeKind, TypeHint};

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while moving values or calls across the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A script file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The interpreter reported a syntax or runtime fault.
    #[error("{operation}: {message}")]
    Script { operation: String, message: String },

    /// A callable or namespace could not be resolved.
    #[error("function does not exist: {name}")]
    NotFound { name: String },

    /// A script value had the wrong kind for its destination.
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: TypeHint, found: String },

    /// The destination kind is outside the supported conversion set.
    #[error("unsupported destination type: {hint}")]
    UnsupportedType { hint: TypeHint },

    /// A mutating operation was attempted through a value handle.
    #[error("invalid operation on value handle: {operation}")]
    ValueHandle { operation: &'static str },

    /// A sequence index was outside `[1, len]`.
    #[error("index out of range: {index} (length {len})")]
    OutOfRange { index: i64, len: usize },

    /// An equality check mixed a mutable handle and a value handle.
    #[error("invalid operation == on mixed {kind} value and pointer handles")]
    MixedHandles { kind: BridgeKind },

    /// A key of the wrong shape was used on a composite.
    #[error("invalid key for {kind}: {key}")]
    InvalidKey { kind: BridgeKind, key: String },

    /// An operation is not defined for this kind of composite.
    #[error("operation '{operation}' is not defined for {kind}")]
    Unsupported {
        kind: BridgeKind,
        operation: &'static str,
    },

    /// A channel was used after it was closed.
    #[error("{operation} on closed channel")]
    ChannelClosed { operation: &'static str },

    /// Invalid bridge configuration.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// A plugin path's file stem is not a Lua identifier.
    #[error("cannot derive a plugin name from {path}: the file stem must be an identifier")]
    InvalidPluginName { path: PathBuf },

    /// A host function reported a failure.
    #[error("{message}")]
    Host { message: String },
}

impl BridgeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a script error tagged with the operation that triggered it.
    pub fn script(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Script {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error for a callable name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a type mismatch error.
    pub fn mismatch(expected: TypeHint, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Create an error reported by host code.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Whether this is a conversion failure.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. } | Self::UnsupportedType { .. })
    }
}
