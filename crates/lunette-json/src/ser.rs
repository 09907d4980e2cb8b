//! Table to JSON.

use lunette_core::{LuaValue, Table};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::JsonError;
use crate::MAX_DEPTH;

/// Serializable view of a table. Callable entries are skipped.
pub struct JsonTable<'a, 'p> {
    table: &'a Table<'p>,
    depth: usize,
}

impl<'a, 'p> JsonTable<'a, 'p> {
    pub fn new(table: &'a Table<'p>) -> Self {
        JsonTable { table, depth: 0 }
    }
}

/// The values ordered by key when the keys are exactly the integers
/// `1..=N` for a non-empty table, whatever their insertion order.
fn sequence_values<'v, 'p>(
    entries: &[(&'v LuaValue<'p>, &'v LuaValue<'p>)],
) -> Option<Vec<&'v LuaValue<'p>>> {
    if entries.is_empty() {
        return None;
    }
    let mut slots = vec![None; entries.len()];
    for (k, v) in entries {
        let LuaValue::Integer(n) = k else {
            return None;
        };
        let slot = usize::try_from(*n).ok()?.checked_sub(1)?;
        *slots.get_mut(slot)? = Some(*v);
    }
    // Keys are unique, so N keys in 1..=N fill every slot.
    slots.into_iter().collect()
}

impl Serialize for JsonTable<'_, '_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.depth > MAX_DEPTH {
            return Err(S::Error::custom(JsonError::TooDeep { limit: MAX_DEPTH }));
        }

        let entries: Vec<_> = self
            .table
            .iter()
            .filter(|(_, v)| !v.is_callable())
            .collect();

        if let Some(values) = sequence_values(&entries) {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for v in values {
                seq.serialize_element(&JsonValue { view: self, value: v })?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(Some(entries.len()))?;
            for (k, v) in &entries {
                map.serialize_entry(&k.to_string(), &JsonValue { view: self, value: v })?;
            }
            map.end()
        }
    }
}

/// One value inside a [`JsonTable`], carrying the parent's depth.
struct JsonValue<'v, 'a, 'p> {
    view: &'v JsonTable<'a, 'p>,
    value: &'v LuaValue<'p>,
}

impl Serialize for JsonValue<'_, '_, '_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.value {
            LuaValue::Nil => serializer.serialize_unit(),
            LuaValue::Bool(b) => serializer.serialize_bool(*b),
            LuaValue::Integer(i) => serializer.serialize_i64(*i),
            LuaValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            LuaValue::Float(_) => serializer.serialize_unit(),
            LuaValue::String(s) => serializer.serialize_str(s),
            LuaValue::Table(t) => {
                let table = t.borrow();
                JsonTable {
                    table: &table,
                    depth: self.view.depth + 1,
                }
                .serialize(serializer)
            }
            // Filtered out by the parent.
            LuaValue::Closure(_) | LuaValue::Native(_) => serializer.serialize_unit(),
        }
    }
}

/// Convert a table to a JSON value.
pub fn table_to_json(table: &Table<'_>) -> Result<serde_json::Value, JsonError> {
    Ok(serde_json::to_value(JsonTable::new(table))?)
}

/// Render a table as compact JSON text.
pub fn table_to_string(table: &Table<'_>) -> Result<String, JsonError> {
    Ok(serde_json::to_string(&JsonTable::new(table))?)
}

/// Deep copy of `table` with every function-valued entry removed, including
/// inside nested tables. Nested tables are copied, not shared.
pub fn strip_callables<'p>(table: &Table<'p>) -> Result<Table<'p>, JsonError> {
    strip_at(table, 0)
}

fn strip_at<'p>(table: &Table<'p>, depth: usize) -> Result<Table<'p>, JsonError> {
    if depth > MAX_DEPTH {
        return Err(JsonError::TooDeep { limit: MAX_DEPTH });
    }
    let mut out = Table::with_capacity(table.len());
    for (k, v) in table.iter() {
        let value = match v {
            LuaValue::Closure(_) | LuaValue::Native(_) => continue,
            LuaValue::Table(t) => LuaValue::from(strip_at(&t.borrow(), depth + 1)?),
            other => other.clone(),
        };
        // Keys come from an existing table, so none of them is nil.
        let _ = out.set(k.clone(), value);
    }
    Ok(out)
}
