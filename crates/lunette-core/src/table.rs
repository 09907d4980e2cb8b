//! Insertion-ordered Lua table.
//!
//! There is no array part: every key lives in one `IndexMap`, and the
//! length is the number of entries. Writing nil keeps the key.

use indexmap::IndexMap;
use thiserror::Error;

use crate::value::LuaValue;

/// Upper bound on the capacity a size hint may reserve.
pub const MAX_PREALLOC: usize = 1 << 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("table index is nil")]
pub struct NilKeyError;

#[derive(Clone, Debug, Default)]
pub struct Table<'p> {
    entries: IndexMap<LuaValue<'p>, LuaValue<'p>>,
}

impl<'p> Table<'p> {
    pub fn new() -> Self {
        Table {
            entries: IndexMap::new(),
        }
    }

    /// Create a table sized for `hint` entries. The hint is clamped.
    pub fn with_capacity(hint: usize) -> Self {
        Table {
            entries: IndexMap::with_capacity(hint.min(MAX_PREALLOC)),
        }
    }

    /// Build a sequence with keys `1..=values.len()`.
    pub fn from_sequence(values: impl IntoIterator<Item = LuaValue<'p>>) -> Self {
        let mut table = Table::new();
        for (i, v) in values.into_iter().enumerate() {
            table.entries.insert(LuaValue::Integer(i as i64 + 1), v);
        }
        table
    }

    /// Raw get; absent keys read as nil.
    pub fn get(&self, key: &LuaValue<'p>) -> LuaValue<'p> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn get_int(&self, key: i64) -> LuaValue<'p> {
        self.get(&LuaValue::Integer(key))
    }

    pub fn get_str(&self, key: &str) -> LuaValue<'p> {
        self.get(&LuaValue::string(key))
    }

    pub fn contains_key(&self, key: &LuaValue<'p>) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw set. A nil key is rejected; a nil value is stored like any other.
    pub fn set(&mut self, key: LuaValue<'p>, value: LuaValue<'p>) -> Result<(), NilKeyError> {
        if key.is_nil() {
            return Err(NilKeyError);
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Remove a key, keeping the insertion order of the rest.
    pub fn remove(&mut self, key: &LuaValue<'p>) -> Option<LuaValue<'p>> {
        self.entries.shift_remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently inserted key.
    pub fn last_key(&self) -> Option<&LuaValue<'p>> {
        self.entries.last().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LuaValue<'p>, &LuaValue<'p>)> {
        self.entries.iter()
    }

    /// True if the keys are exactly the integers `1..=len`, in that order.
    pub fn is_sequence(&self) -> bool {
        self.entries
            .keys()
            .enumerate()
            .all(|(i, k)| *k == LuaValue::Integer(i as i64 + 1))
    }
}
