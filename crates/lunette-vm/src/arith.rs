//! Arithmetic operations.
//!
//! Two paths: integer when both operands are integers, float otherwise.
//! Non-numeric operands take part as zero rather than raising an error.

use lunette_bytecode::OpCode;
use lunette_core::LuaValue;

use crate::coerce::{float_to_int_trunc, to_float_or_zero};
use crate::error::LuaError;

/// Binary arithmetic operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl ArithOp {
    /// The operation behind a register, constant or immediate arithmetic opcode.
    pub fn from_opcode(op: OpCode) -> Option<ArithOp> {
        use OpCode::*;
        Some(match op {
            Add | AddK | AddI => ArithOp::Add,
            Sub | SubK => ArithOp::Sub,
            Mul | MulK => ArithOp::Mul,
            Mod | ModK => ArithOp::Mod,
            Pow | PowK => ArithOp::Pow,
            Div | DivK => ArithOp::Div,
            IDiv | IDivK => ArithOp::IDiv,
            BAnd | BAndK => ArithOp::BAnd,
            BOr | BOrK => ArithOp::BOr,
            BXor | BXorK => ArithOp::BXor,
            Shl | ShlI => ArithOp::Shl,
            Shr | ShrI => ArithOp::Shr,
            _ => return None,
        })
    }
}

/// Perform a binary arithmetic operation.
pub fn arith<'p>(op: ArithOp, a: &LuaValue<'p>, b: &LuaValue<'p>) -> Result<LuaValue<'p>, LuaError> {
    if let (LuaValue::Integer(x), LuaValue::Integer(y)) = (a, b) {
        return int_arith(op, *x, *y);
    }
    Ok(float_arith(op, to_float_or_zero(a), to_float_or_zero(b)))
}

fn int_arith<'p>(op: ArithOp, a: i64, b: i64) -> Result<LuaValue<'p>, LuaError> {
    let result = match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div | ArithOp::IDiv => {
            if b == 0 {
                return Err(LuaError::DivideByZero);
            }
            a.wrapping_div(b)
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(LuaError::DivideByZero);
            }
            a.wrapping_rem(b)
        }
        ArithOp::Pow => return Ok(LuaValue::Float((a as f64).powf(b as f64))),
        ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr => {
            bitwise(op, a, b)
        }
    };
    Ok(LuaValue::Integer(result))
}

fn float_arith<'p>(op: ArithOp, a: f64, b: f64) -> LuaValue<'p> {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::IDiv => (a / b).trunc(),
        // Truncated remainder, like C fmod.
        ArithOp::Mod => a % b,
        ArithOp::Pow => a.powf(b),
        ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr => {
            return LuaValue::Integer(bitwise(op, float_to_int_trunc(a), float_to_int_trunc(b)));
        }
    };
    LuaValue::Float(result)
}

/// Bitwise ops on i64. Shift counts use the low 6 bits; `>>` is arithmetic.
fn bitwise(op: ArithOp, a: i64, b: i64) -> i64 {
    match op {
        ArithOp::BAnd => a & b,
        ArithOp::BOr => a | b,
        ArithOp::BXor => a ^ b,
        ArithOp::Shl => a.wrapping_shl((b & 63) as u32),
        ArithOp::Shr => a.wrapping_shr((b & 63) as u32),
        _ => unreachable!("{op:?} is not bitwise"),
    }
}

/// Unary minus. Non-numbers negate as zero.
pub fn arith_unm<'p>(v: &LuaValue<'p>) -> LuaValue<'p> {
    match v {
        LuaValue::Integer(i) => LuaValue::Integer(i.wrapping_neg()),
        LuaValue::Float(f) => LuaValue::Float(-f),
        _ => LuaValue::Float(-0.0),
    }
}

/// Bitwise NOT. Floats truncate first; non-numbers count as zero.
pub fn arith_bnot<'p>(v: &LuaValue<'p>) -> LuaValue<'p> {
    let i = match v {
        LuaValue::Integer(i) => *i,
        LuaValue::Float(f) => float_to_int_trunc(*f),
        _ => 0,
    };
    LuaValue::Integer(!i)
}
