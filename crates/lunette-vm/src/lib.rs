//! Register-based interpreter for Lua 5.4 bytecode.

pub mod arith;
pub mod coerce;
pub mod compare;
mod dispatch;
pub mod error;
pub mod vm;

pub use error::LuaError;
pub use vm::{Vm, VmConfig};

use lunette_bytecode::Chunk;

/// Parse a precompiled chunk. Format faults come back as [`LuaError::Undump`].
pub fn load(bytes: &[u8]) -> Result<Chunk, LuaError> {
    Ok(Chunk::undump(bytes)?)
}
