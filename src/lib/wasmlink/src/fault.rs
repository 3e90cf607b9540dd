//! Faults: the fatal conditions that unwind out of running wasm code.
//!
//! Host functions report a fault by returning it as their error. It travels through the wasm
//! frames inside an [anyhow::Error] and is recovered by downcasting when the driver classifies
//! the outcome of the entry point.

use std::fmt::Display;

use miette::Diagnostic;
use thiserror::Error;
use wasmtime::Trap;

use crate::memory::MemoryError;

/// The fixed set of execution-engine traps that are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    Unreachable,
    MemoryOutOfBounds,
    DivideByZero,
    DivideResultUnrepresentable,
    /// wasmtime reports `rem` by zero as [TrapKind::DivideByZero].
    RemainderByZero,
    IntegerResultUnrepresentable,
    InvalidFunction,
    SignatureMismatch,
}

impl TrapKind {
    pub const ALL: [TrapKind; 8] = [
        TrapKind::Unreachable,
        TrapKind::MemoryOutOfBounds,
        TrapKind::DivideByZero,
        TrapKind::DivideResultUnrepresentable,
        TrapKind::RemainderByZero,
        TrapKind::IntegerResultUnrepresentable,
        TrapKind::InvalidFunction,
        TrapKind::SignatureMismatch,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            TrapKind::Unreachable => "unreachable",
            TrapKind::MemoryOutOfBounds => "memory access out of bounds",
            TrapKind::DivideByZero => "divide by zero",
            TrapKind::DivideResultUnrepresentable => "divide result unrepresentable",
            TrapKind::RemainderByZero => "remainder by zero",
            TrapKind::IntegerResultUnrepresentable => "integer result unrepresentable",
            TrapKind::InvalidFunction => "invalid function",
            TrapKind::SignatureMismatch => "function signature mismatch",
        }
    }

    /// Map an engine trap code onto a recognized category. Traps outside the set (stack
    /// exhaustion, interrupts, ...) are not recognized.
    pub fn from_trap(trap: &Trap) -> Option<Self> {
        Some(match trap {
            Trap::UnreachableCodeReached => TrapKind::Unreachable,
            Trap::MemoryOutOfBounds | Trap::HeapMisaligned => TrapKind::MemoryOutOfBounds,
            Trap::IntegerDivisionByZero => TrapKind::DivideByZero,
            Trap::IntegerOverflow => TrapKind::DivideResultUnrepresentable,
            Trap::BadConversionToInteger => TrapKind::IntegerResultUnrepresentable,
            Trap::IndirectCallToNull | Trap::TableOutOfBounds => TrapKind::InvalidFunction,
            Trap::BadSignature => TrapKind::SignatureMismatch,
            _ => return None,
        })
    }
}

impl Display for TrapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum Fault {
    /// `exit`, `abort` and friends.
    #[error("Terminating WebAssembly: {reason}")]
    Terminate { status: i32, reason: String },
    /// A stub without an implementation was called.
    #[error("Not yet implemented: {what}")]
    Unimplemented { what: String },
    /// A trap raised by the host on behalf of the engine, such as a bad memory access inside
    /// a stub.
    #[error("{0}")]
    Trap(TrapKind),
}

impl Fault {
    pub fn terminate(status: i32, reason: impl ToString) -> Self {
        Fault::Terminate {
            status,
            reason: reason.to_string(),
        }
    }

    pub fn nyi(what: impl ToString) -> Self {
        Fault::Unimplemented {
            what: what.to_string(),
        }
    }

    /// Wrap this fault so it can be returned from a host function.
    pub fn into_error(self) -> anyhow::Error {
        anyhow::Error::new(self)
    }
}

impl From<MemoryError> for Fault {
    fn from(value: MemoryError) -> Self {
        tracing::debug!("host memory access failed: {}", value);
        Fault::Trap(TrapKind::MemoryOutOfBounds)
    }
}
