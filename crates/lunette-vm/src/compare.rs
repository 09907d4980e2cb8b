//! Comparison operations.

use std::cmp::Ordering;

use lunette_core::LuaValue;

use crate::coerce::{number_or_zero, Number};

/// Raw equality: numbers compare by value across int/float, strings by
/// content, everything else by identity.
pub fn raw_equals<'a>(a: &LuaValue<'a>, b: &LuaValue<'a>) -> bool {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Float(y)) | (LuaValue::Float(y), LuaValue::Integer(x)) => {
            num_cmp(Number::Int(*x), Number::Float(*y)) == Some(Ordering::Equal)
        }
        (LuaValue::Float(x), LuaValue::Float(y)) => x == y,
        _ => a == b,
    }
}

/// Order two numbers. `None` when a NaN is involved.
pub fn num_cmp(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        (Number::Int(x), Number::Float(y)) => int_float_cmp(x, y),
        (Number::Float(x), Number::Int(y)) => int_float_cmp(y, x).map(Ordering::reverse),
        (Number::Float(x), Number::Float(y)) => x.partial_cmp(&y),
    }
}

/// Exact comparison of an integer with a float, without rounding the integer.
fn int_float_cmp(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    // i64 range is [-2^63, 2^63)
    if f >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }
    if f < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }
    let t = f.trunc();
    match i.cmp(&(t as i64)) {
        Ordering::Equal if f > t => Some(Ordering::Less),
        Ordering::Equal if f < t => Some(Ordering::Greater),
        ord => Some(ord),
    }
}

fn ordered(a: &LuaValue<'_>, b: &LuaValue<'_>) -> Option<Ordering> {
    match (a, b) {
        (LuaValue::String(x), LuaValue::String(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        _ => num_cmp(number_or_zero(a), number_or_zero(b)),
    }
}

/// `a < b`. Strings compare bytewise; anything else numerically, with
/// non-numbers counting as 0.
pub fn less_than(a: &LuaValue<'_>, b: &LuaValue<'_>) -> bool {
    ordered(a, b) == Some(Ordering::Less)
}

/// `a <= b`, with the same coercions as [`less_than`].
pub fn less_equal(a: &LuaValue<'_>, b: &LuaValue<'_>) -> bool {
    matches!(ordered(a, b), Some(Ordering::Less | Ordering::Equal))
}

/// Compare `v` with an immediate operand. Non-numbers count as 0.
pub fn compare_immediate(v: &LuaValue<'_>, imm: i64) -> Option<Ordering> {
    num_cmp(number_or_zero(v), Number::Int(imm))
}
