//! JSON to table.

use lunette_core::{LuaValue, Table};
use serde_json::{Map, Value};

use crate::error::JsonError;
use crate::MAX_DEPTH;

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a table from JSON. `null` gives an empty table; arrays get keys
/// `1..=N`; objects get string keys. Any other top-level value is rejected.
pub fn table_from_json<'p>(value: &Value) -> Result<Table<'p>, JsonError> {
    match value {
        Value::Null => Ok(Table::new()),
        Value::Array(items) => from_array(items, 0),
        Value::Object(fields) => from_object(fields, 0),
        other => Err(JsonError::NotATable {
            found: json_type(other),
        }),
    }
}

/// Parse JSON text into a table.
pub fn table_from_str<'p>(text: &str) -> Result<Table<'p>, JsonError> {
    let value: Value = serde_json::from_str(text)?;
    table_from_json(&value)
}

fn from_array<'p>(items: &[Value], depth: usize) -> Result<Table<'p>, JsonError> {
    let values = items
        .iter()
        .map(|item| to_lua(item, depth))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table::from_sequence(values))
}

fn from_object<'p>(fields: &Map<String, Value>, depth: usize) -> Result<Table<'p>, JsonError> {
    let mut table = Table::with_capacity(fields.len());
    for (key, item) in fields {
        // String keys are never nil.
        let _ = table.set(LuaValue::string(key), to_lua(item, depth)?);
    }
    Ok(table)
}

fn to_lua<'p>(value: &Value, depth: usize) -> Result<LuaValue<'p>, JsonError> {
    Ok(match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => LuaValue::string(s),
        Value::Array(_) | Value::Object(_) if depth >= MAX_DEPTH => {
            return Err(JsonError::TooDeep { limit: MAX_DEPTH });
        }
        Value::Array(items) => LuaValue::from(from_array(items, depth + 1)?),
        Value::Object(fields) => LuaValue::from(from_object(fields, depth + 1)?),
    })
}
