//! JSON bridge for Lunette tables.
//!
//! Tables whose keys are exactly `1..=N` become JSON arrays in key order;
//! everything else becomes an object keyed by the key's display
//! form. Functions never cross the bridge: they are dropped, recursively.

mod de;
mod error;
mod ser;

pub use de::{table_from_json, table_from_str};
pub use error::JsonError;
pub use ser::{strip_callables, table_to_json, table_to_string, JsonTable};

/// Deepest table nesting either direction will follow. Self-referencing
/// tables hit this instead of recursing forever.
pub const MAX_DEPTH: usize = 128;
