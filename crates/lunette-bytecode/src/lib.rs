//! Lunette bytecode: Lua 5.4 binary chunk decoding, instruction layouts,
//! function prototypes and a luac-style disassembler.

pub mod chunk;
pub mod disasm;
pub mod error;
pub mod opcode;
pub mod proto;
pub mod reader;

pub use chunk::{Chunk, Header};
pub use error::{HeaderField, UndumpError};
pub use opcode::{Instruction, OpCode};
pub use proto::{Constant, Proto};
