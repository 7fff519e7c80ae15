//! Error types for the container.
//!
//! The taxonomy follows the propagation policy: [`ContainerError::Decode`]
//! and [`ContainerError::Link`] abort actor creation,
//! [`ConfigurationError`] is fatal at registration before any actor
//! exists, and everything else aborts only the current invocation and is
//! surfaced to the hypervisor as a structured [`TrapRecord`] on the
//! message response, never as a raw engine error object.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Malformed module bytecode. Aborts actor creation.
    #[error("decode error: {0}")]
    Decode(String),

    /// Bad or incompatible imports at instantiation. Aborts actor creation.
    #[error("link error: {0}")]
    Link(String),

    /// Duplicate interface-provider names at registration. Fatal to setup.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Unknown export or argument arity/type mismatch at dispatch.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A function reference that does not resolve to a callable entry.
    #[error("bad function reference: {0}")]
    BadFuncRef(String),

    /// Accessor range outside the current memory/table size.
    #[error("bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// Engine-level failure outside the taxonomy above.
    #[error("engine error: {0}")]
    Engine(String),
}

/// Registration-time errors. Raised synchronously, before any actor exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("interface provider {0:?} is already registered")]
    DuplicateProvider(String),

    #[error("interface provider {provider:?} declares function {function:?} more than once")]
    DuplicateFunction { provider: String, function: String },

    #[error("interface provider name must not be empty")]
    EmptyProviderName,
}

/// Accessor range errors. Out-of-range requests fail with these rather
/// than truncating or wrapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundsError {
    #[error("memory range {offset}+{len} out of bounds for memory of {size} bytes")]
    Memory { offset: u64, len: u64, size: u64 },

    #[error("table range {index}+{len} out of bounds for table of {size} entries")]
    Table { index: u64, len: u64, size: u64 },

    #[error("module exports no linear memory")]
    MissingMemory,

    #[error("module exports no table")]
    MissingTable,
}

/// A structured failure marker for one invocation.
///
/// This is what crosses the message response channel; the raw engine error
/// never escapes the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapRecord {
    /// Machine-readable failure reason.
    pub reason: TrapReason,
    /// Human-readable detail.
    pub message: String,
}

impl TrapRecord {
    pub fn new(reason: TrapReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// Classify a raw engine error from a call into the module.
    pub(crate) fn from_runtime(err: &anyhow::Error) -> Self {
        if let Some(host) = err.downcast_ref::<HostTrap>() {
            return host.0.clone();
        }
        if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
            let reason = match trap {
                wasmtime::Trap::OutOfFuel => TrapReason::OutOfGas,
                wasmtime::Trap::UnreachableCodeReached => TrapReason::Unreachable,
                wasmtime::Trap::MemoryOutOfBounds => TrapReason::MemoryOutOfBounds,
                wasmtime::Trap::TableOutOfBounds => TrapReason::TableOutOfBounds,
                wasmtime::Trap::IndirectCallToNull => TrapReason::IndirectCallToNull,
                wasmtime::Trap::BadSignature => TrapReason::BadSignature,
                wasmtime::Trap::IntegerOverflow => TrapReason::IntegerOverflow,
                wasmtime::Trap::IntegerDivisionByZero => TrapReason::IntegerDivisionByZero,
                wasmtime::Trap::BadConversionToInteger => TrapReason::BadConversionToInteger,
                wasmtime::Trap::StackOverflow => TrapReason::StackOverflow,
                _ => TrapReason::Unknown,
            };
            return Self::new(reason, err.to_string());
        }
        Self::new(TrapReason::Unknown, err.to_string())
    }

    /// Turn a pre-execution container error into the record shape the
    /// response payload carries.
    pub(crate) fn from_error(err: &ContainerError) -> Self {
        let reason = match err {
            ContainerError::Decode(_) => TrapReason::Decode,
            ContainerError::Link(_) => TrapReason::InvalidImport,
            ContainerError::Configuration(_) => TrapReason::Host,
            ContainerError::InvalidInvocation(_) => TrapReason::InvalidInvocation,
            ContainerError::BadFuncRef(_) => TrapReason::BadFuncRef,
            ContainerError::Bounds(_) => TrapReason::MemoryOutOfBounds,
            ContainerError::Engine(_) => TrapReason::Host,
        };
        Self::new(reason, err.to_string())
    }
}

impl fmt::Display for TrapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// Known failure reasons for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapReason {
    /// Malformed bytecode at actor creation.
    Decode,
    /// Unresolvable or type-incompatible import at instantiation.
    InvalidImport,
    /// Function reference did not resolve to a callable entry.
    BadFuncRef,
    /// Unknown export or argument arity/type mismatch.
    InvalidInvocation,
    /// Unreachable instruction executed.
    Unreachable,
    /// Out of bounds memory access inside the module.
    MemoryOutOfBounds,
    /// Out of bounds table access inside the module.
    TableOutOfBounds,
    /// Indirect call through a null table entry.
    IndirectCallToNull,
    /// Signature mismatch on indirect call.
    BadSignature,
    /// Integer overflow.
    IntegerOverflow,
    /// Integer division by zero.
    IntegerDivisionByZero,
    /// Invalid conversion to integer.
    BadConversionToInteger,
    /// Call stack exhausted.
    StackOverflow,
    /// Gas budget exhausted.
    OutOfGas,
    /// A host-call handler reported a failure.
    Host,
    /// Unclassified engine failure.
    Unknown,
}

impl fmt::Display for TrapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrapReason::Decode => "invalid module bytecode",
            TrapReason::InvalidImport => "invalid import",
            TrapReason::BadFuncRef => "bad function reference",
            TrapReason::InvalidInvocation => "invalid invocation",
            TrapReason::Unreachable => "unreachable code reached",
            TrapReason::MemoryOutOfBounds => "memory out of bounds",
            TrapReason::TableOutOfBounds => "table out of bounds",
            TrapReason::IndirectCallToNull => "indirect call to null",
            TrapReason::BadSignature => "bad signature",
            TrapReason::IntegerOverflow => "integer overflow",
            TrapReason::IntegerDivisionByZero => "integer division by zero",
            TrapReason::BadConversionToInteger => "bad conversion to integer",
            TrapReason::StackOverflow => "stack overflow",
            TrapReason::OutOfGas => "out of gas",
            TrapReason::Host => "host failure",
            TrapReason::Unknown => "unknown trap",
        };
        write!(f, "{}", s)
    }
}

/// Error type raised by host-call handlers; carried through the engine so
/// the dispatcher can recover the structured record on the way out.
#[derive(Debug)]
pub(crate) struct HostTrap(pub TrapRecord);

impl fmt::Display for HostTrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host trap: {}", self.0)
    }
}

impl std::error::Error for HostTrap {}

/// Result type alias for the container.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use crate::error::{BoundsError, ConfigurationError, ContainerError, TrapReason, TrapRecord};

    #[test]
    fn trap_record_display() {
        let record = TrapRecord::new(TrapReason::OutOfGas, "budget 100 exhausted");
        let s = record.to_string();
        assert!(s.contains("out of gas"));
        assert!(s.contains("budget 100"));
    }

    #[test]
    fn bounds_error_display() {
        let err = BoundsError::Memory {
            offset: 65530,
            len: 16,
            size: 65536,
        };
        let s = err.to_string();
        assert!(s.contains("65530"));
        assert!(s.contains("65536"));
    }

    #[test]
    fn pre_execution_errors_classify() {
        let err = ContainerError::Decode("bad magic".to_string());
        assert_eq!(TrapRecord::from_error(&err).reason, TrapReason::Decode);

        let err = ContainerError::BadFuncRef("null table slot 3".to_string());
        assert_eq!(TrapRecord::from_error(&err).reason, TrapReason::BadFuncRef);

        let err = ContainerError::Configuration(ConfigurationError::EmptyProviderName);
        assert_eq!(TrapRecord::from_error(&err).reason, TrapReason::Host);
    }

    #[test]
    fn trap_record_round_trips_through_serde() {
        let record = TrapRecord::new(TrapReason::Unreachable, "unreachable executed");
        let json = serde_json::to_string(&record).unwrap();
        let back: TrapRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
