//! Lua runtime error types.

use lunette_bytecode::UndumpError;
use lunette_core::NativeError;
use thiserror::Error;

/// A fault that aborts execution. Nothing inside the VM catches these; the
/// whole activation chain unwinds to the caller of `Vm::call_proto`.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LuaError {
    #[error("attempt to {op} a {found} value (expected {expected})")]
    TypeError {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{op}: table index is nil")]
    NilKey { op: &'static str },

    #[error("attempt to perform integer division by zero")]
    DivideByZero,

    #[error("{what} index {index} out of range (length {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        len: usize,
    },

    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),

    #[error("stack overflow")]
    StackOverflow,

    #[error("instruction limit of {0} exceeded")]
    InstructionLimit(u64),

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("{0}")]
    Runtime(String),

    /// The chunk uses a feature this VM does not support yet.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    #[error(transparent)]
    Undump(#[from] UndumpError),
}

impl LuaError {
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, LuaError::Unimplemented(_))
    }

    /// True if the chunk itself is malformed.
    pub fn is_format_fault(&self) -> bool {
        matches!(self, LuaError::Undump(_))
    }

    pub(crate) fn index_out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        LuaError::IndexOutOfRange {
            what,
            index: index as i64,
            len,
        }
    }
}
