//! Format faults raised while decoding a binary chunk.

use std::fmt;
use thiserror::Error;

/// A header field checked by [`Header::validate`](crate::chunk::Header::validate),
/// listed in validation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeaderField {
    Magic,
    Version,
    Format,
    DataCheck,
    InstructionSize,
    IntegerSize,
    FloatSize,
    SanityInt,
    SanityFloat,
}

impl HeaderField {
    pub fn name(&self) -> &'static str {
        match self {
            HeaderField::Magic => "magic",
            HeaderField::Version => "version",
            HeaderField::Format => "format",
            HeaderField::DataCheck => "data check",
            HeaderField::InstructionSize => "instruction size",
            HeaderField::IntegerSize => "integer size",
            HeaderField::FloatSize => "float size",
            HeaderField::SanityInt => "sanity integer",
            HeaderField::SanityFloat => "sanity float",
        }
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error type for undump failures. Any of these rejects the whole chunk.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum UndumpError {
    #[error("truncated binary chunk: wanted {wanted} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("unsupported or corrupt chunk: {field} mismatch (expected {expected}, found {found})")]
    BadHeader {
        field: HeaderField,
        expected: String,
        found: String,
    },

    #[error("unknown constant type tag {tag:#04x} at offset {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },

    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("function nesting deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("{remaining} trailing bytes after chunk")]
    TrailingBytes { remaining: usize },
}

impl UndumpError {
    /// The header field that failed validation, if this is a header fault.
    pub fn header_field(&self) -> Option<HeaderField> {
        match self {
            UndumpError::BadHeader { field, .. } => Some(*field),
            _ => None,
        }
    }
}
