//! Numeric coercion helpers.
//!
//! There is no string-to-number conversion: anything that is not already a
//! number coerces to zero.

use lunette_core::LuaValue;

/// A numeric operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_positive(self) -> bool {
        match self {
            Number::Int(i) => i > 0,
            Number::Float(f) => f > 0.0,
        }
    }
}

impl From<Number> for LuaValue<'_> {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => LuaValue::Integer(i),
            Number::Float(f) => LuaValue::Float(f),
        }
    }
}

pub fn to_number(v: &LuaValue<'_>) -> Option<Number> {
    match v {
        LuaValue::Integer(i) => Some(Number::Int(*i)),
        LuaValue::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

/// Numeric value of `v`, with non-numbers counting as integer 0.
pub fn number_or_zero(v: &LuaValue<'_>) -> Number {
    to_number(v).unwrap_or(Number::Int(0))
}

/// Float value of `v`, with non-numbers counting as 0.0.
pub fn to_float_or_zero(v: &LuaValue<'_>) -> f64 {
    v.as_float().unwrap_or(0.0)
}

/// Truncate toward zero. NaN maps to 0 and out-of-range values saturate.
pub fn float_to_int_trunc(f: f64) -> i64 {
    f as i64
}
