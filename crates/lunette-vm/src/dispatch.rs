//! Main bytecode dispatch loop.

use std::cmp::Ordering;
use std::rc::Rc;

use lunette_bytecode::{Instruction, OpCode, Proto};
use lunette_core::{new_cell, Closure, LuaValue, Table, TableRef, UpvalCell};
use tracing::{trace, warn};

use crate::arith::{self, ArithOp};
use crate::coerce::{self, Number};
use crate::compare;
use crate::error::LuaError;
use crate::vm::Vm;

/// One activation: register cells, upvalue cells and the running prototype.
struct Frame<'p> {
    proto: &'p Proto,
    regs: Vec<UpvalCell<'p>>,
    upvals: Vec<UpvalCell<'p>>,
    file_upvalues: usize,
}

impl<'p> Frame<'p> {
    fn new(
        proto: &'p Proto,
        upvalues: &[UpvalCell<'p>],
        args: &[LuaValue<'p>],
        file_upvalues: usize,
    ) -> Self {
        let regs: Vec<_> = (0..proto.max_stack_size as usize)
            .map(|_| new_cell(LuaValue::Nil))
            .collect();
        for (cell, arg) in regs.iter().zip(args.iter().take(proto.num_params as usize)) {
            *cell.borrow_mut() = arg.clone();
        }

        let num_upvals = proto.upvalues.len().max(file_upvalues);
        let upvals = (0..num_upvals)
            .map(|i| match upvalues.get(i) {
                Some(cell) => Rc::clone(cell),
                None => new_cell(LuaValue::Nil),
            })
            .collect();

        Frame {
            proto,
            regs,
            upvals,
            file_upvalues,
        }
    }

    fn cell(&self, idx: usize) -> Result<&UpvalCell<'p>, LuaError> {
        self.regs
            .get(idx)
            .ok_or_else(|| LuaError::index_out_of_range("register", idx, self.regs.len()))
    }

    fn reg(&self, idx: usize) -> Result<LuaValue<'p>, LuaError> {
        Ok(self.cell(idx)?.borrow().clone())
    }

    fn set_reg(&self, idx: usize, value: LuaValue<'p>) -> Result<(), LuaError> {
        *self.cell(idx)?.borrow_mut() = value;
        Ok(())
    }

    /// Copy `count` registers starting at `start`.
    fn reg_range(&self, start: usize, count: usize) -> Result<Vec<LuaValue<'p>>, LuaError> {
        (start..start + count).map(|i| self.reg(i)).collect()
    }

    fn upval_cell(&self, idx: usize) -> Result<&UpvalCell<'p>, LuaError> {
        self.upvals
            .get(idx)
            .ok_or_else(|| LuaError::index_out_of_range("upvalue", idx, self.upvals.len()))
    }

    fn get_upval(&self, idx: usize) -> Result<LuaValue<'p>, LuaError> {
        Ok(self.upval_cell(idx)?.borrow().clone())
    }

    fn constant(&self, idx: usize) -> Result<LuaValue<'p>, LuaError> {
        let constants = &self.proto.constants;
        constants
            .get(idx)
            .map(LuaValue::from_constant)
            .ok_or_else(|| LuaError::index_out_of_range("constant", idx, constants.len()))
    }

    /// `K[C]` when the k flag is set, otherwise `R[C]`.
    fn rk_c(&self, inst: Instruction) -> Result<LuaValue<'p>, LuaError> {
        if inst.k() {
            self.constant(inst.c() as usize)
        } else {
            self.reg(inst.c() as usize)
        }
    }

    /// Replace every captured register cell at or above `from` with a fresh
    /// cell, so closures keep the old value and the frame moves on.
    fn close_from(&mut self, from: usize) {
        for cell in self.regs.iter_mut().skip(from) {
            if Rc::strong_count(cell) > 1 {
                let value = cell.borrow().clone();
                *cell = new_cell(value);
            }
        }
    }
}

fn table_of<'p>(
    value: &LuaValue<'p>,
    op: &'static str,
) -> Result<TableRef<'p>, LuaError> {
    match value {
        LuaValue::Table(t) => Ok(Rc::clone(t)),
        other => Err(LuaError::TypeError {
            op,
            expected: "table",
            found: other.type_name(),
        }),
    }
}

fn table_set<'p>(
    target: &LuaValue<'p>,
    key: LuaValue<'p>,
    value: LuaValue<'p>,
    op: &'static str,
) -> Result<(), LuaError> {
    let table = table_of(target, op)?;
    let result = table.borrow_mut().set(key, value);
    result.map_err(|_| LuaError::NilKey { op })
}

/// Lookup that reads nil from anything but a table.
fn lenient_get<'p>(source: &LuaValue<'p>, key: &LuaValue<'p>) -> LuaValue<'p> {
    match source {
        LuaValue::Table(t) if !key.is_nil() => t.borrow().get(key),
        _ => LuaValue::Nil,
    }
}

fn jump(pc: usize, offset: i64, len: usize) -> Result<usize, LuaError> {
    let target = pc as i64 + offset;
    if target < 0 {
        return Err(LuaError::IndexOutOfRange {
            what: "jump target",
            index: target,
            len,
        });
    }
    Ok(target as usize)
}

/// Fetch the Ax of the continuation word at `pc`.
fn extra_arg(code: &[Instruction], pc: usize) -> Result<u32, LuaError> {
    code.get(pc)
        .map(Instruction::ax_field)
        .ok_or_else(|| LuaError::index_out_of_range("extra argument", pc, code.len()))
}

/// Execute `proto` to completion in a new activation.
pub(crate) fn execute<'p>(
    vm: &mut Vm,
    proto: &'p Proto,
    upvalues: &[UpvalCell<'p>],
    args: &[LuaValue<'p>],
    file_upvalues: usize,
) -> Result<Vec<LuaValue<'p>>, LuaError> {
    let mut frame = Frame::new(proto, upvalues, args, file_upvalues);
    let code = proto.code.as_slice();
    let mut pc = 0usize;

    while pc < code.len() {
        vm.tick()?;
        let inst = code[pc];
        trace!(pc, ?inst, "dispatch");
        pc += 1;

        let op = inst
            .opcode()
            .ok_or_else(|| LuaError::InvalidOpcode(inst.raw_opcode()))?;
        let a = inst.a() as usize;

        match op {
            // ---- Loads ----
            OpCode::Move => frame.set_reg(a, frame.reg(inst.b() as usize)?)?,
            OpCode::LoadI => frame.set_reg(a, LuaValue::Integer(inst.sbx() as i64))?,
            OpCode::LoadF => frame.set_reg(a, LuaValue::Float(inst.sbx() as f64))?,
            OpCode::LoadK => frame.set_reg(a, frame.constant(inst.bx() as usize)?)?,
            OpCode::LoadKx => {
                let idx = extra_arg(code, pc)?;
                pc += 1;
                frame.set_reg(a, frame.constant(idx as usize)?)?;
            }
            OpCode::LoadFalse => frame.set_reg(a, LuaValue::Bool(false))?,
            OpCode::LFalseSkip => {
                frame.set_reg(a, LuaValue::Bool(false))?;
                pc += 1;
            }
            OpCode::LoadTrue => frame.set_reg(a, LuaValue::Bool(true))?,
            OpCode::LoadNil => {
                for r in a..=a + inst.b() as usize {
                    frame.set_reg(r, LuaValue::Nil)?;
                }
            }

            // ---- Upvalue operations ----
            OpCode::GetUpval => frame.set_reg(a, frame.get_upval(inst.b() as usize)?)?,
            OpCode::SetUpval => {
                let value = frame.reg(a)?;
                *frame.upval_cell(inst.b() as usize)?.borrow_mut() = value;
            }

            // ---- Table operations ----
            OpCode::GetTabUp => {
                let table = table_of(&frame.get_upval(inst.b() as usize)?, "index upvalue")?;
                let key = frame.constant(inst.c() as usize)?;
                if !matches!(key, LuaValue::String(_)) {
                    return Err(LuaError::TypeError {
                        op: "index upvalue with",
                        expected: "string",
                        found: key.type_name(),
                    });
                }
                let value = table.borrow().get(&key);
                frame.set_reg(a, value)?;
            }
            OpCode::GetTable => {
                let table = table_of(&frame.reg(inst.b() as usize)?, "index")?;
                let key = frame.reg(inst.c() as usize)?;
                let value = {
                    let t = table.borrow();
                    if key.is_nil() {
                        // A nil key reads the most recently inserted key.
                        t.last_key().map(|k| t.get(k)).unwrap_or_default()
                    } else {
                        t.get(&key)
                    }
                };
                frame.set_reg(a, value)?;
            }
            OpCode::GetI => {
                let source = frame.reg(inst.b() as usize)?;
                let value = lenient_get(&source, &LuaValue::Integer(inst.c() as i64));
                frame.set_reg(a, value)?;
            }
            OpCode::GetField => {
                let source = frame.reg(inst.b() as usize)?;
                let key = frame.constant(inst.c() as usize)?;
                frame.set_reg(a, lenient_get(&source, &key))?;
            }
            OpCode::SetTabUp => {
                let target = frame.get_upval(a)?;
                let key = frame.constant(inst.b() as usize)?;
                if !matches!(key, LuaValue::String(_)) {
                    return Err(LuaError::TypeError {
                        op: "assign to upvalue with",
                        expected: "string",
                        found: key.type_name(),
                    });
                }
                table_set(&target, key, frame.rk_c(inst)?, "assign to upvalue")?;
            }
            OpCode::SetTable => {
                let target = frame.reg(a)?;
                let key = frame.reg(inst.b() as usize)?;
                table_set(&target, key, frame.rk_c(inst)?, "assign to")?;
            }
            OpCode::SetI => {
                let target = frame.reg(a)?;
                let key = LuaValue::Integer(inst.b() as i64);
                table_set(&target, key, frame.rk_c(inst)?, "assign to")?;
            }
            OpCode::SetField => {
                let target = frame.reg(a)?;
                let key = frame.constant(inst.b() as usize)?;
                table_set(&target, key, frame.rk_c(inst)?, "assign to")?;
            }
            OpCode::NewTable => {
                let mut size = inst.c() as usize;
                if inst.k() {
                    size += extra_arg(code, pc)? as usize * 256;
                    pc += 1;
                }
                frame.set_reg(a, LuaValue::from_table(Table::with_capacity(size)))?;
            }
            OpCode::Self_ => {
                let receiver = frame.reg(inst.b() as usize)?;
                // C may name R[A+1], so read the key before overwriting it.
                let key = frame.rk_c(inst)?;
                frame.set_reg(a + 1, receiver.clone())?;
                if key.is_nil() {
                    return Err(LuaError::NilKey { op: "self" });
                }
                match &receiver {
                    LuaValue::Table(t) => {
                        let value = t.borrow().get(&key);
                        frame.set_reg(a, value)?;
                    }
                    LuaValue::Nil => {}
                    other => {
                        warn!(receiver = other.type_name(), "self on non-table receiver ignored");
                    }
                }
            }
            OpCode::SetList => {
                let count = inst.b() as usize;
                let mut offset = inst.c() as i64;
                if inst.k() {
                    offset += extra_arg(code, pc)? as i64 * 256;
                    pc += 1;
                }
                if count > 0 {
                    let table = table_of(&frame.reg(a)?, "set list on")?;
                    let values = frame.reg_range(a + 1, count)?;
                    let mut t = table.borrow_mut();
                    for (i, value) in values.into_iter().enumerate() {
                        let key = LuaValue::Integer(offset + i as i64 + 1);
                        t.set(key, value)
                            .map_err(|_| LuaError::NilKey { op: "set list" })?;
                    }
                }
            }

            // ---- Arithmetic (register + immediate) ----
            OpCode::AddI => {
                let lhs = frame.reg(inst.b() as usize)?;
                let rhs = LuaValue::Integer(inst.sc() as i64);
                frame.set_reg(a, arith::arith(ArithOp::Add, &lhs, &rhs)?)?;
            }
            OpCode::ShrI => {
                let lhs = frame.reg(inst.b() as usize)?;
                let rhs = LuaValue::Integer(inst.sc() as i64);
                frame.set_reg(a, arith::arith(ArithOp::Shr, &lhs, &rhs)?)?;
            }
            OpCode::ShlI => {
                // Immediate is the shifted value: sC << R[B]
                let lhs = LuaValue::Integer(inst.sc() as i64);
                let rhs = frame.reg(inst.b() as usize)?;
                frame.set_reg(a, arith::arith(ArithOp::Shl, &lhs, &rhs)?)?;
            }

            // ---- Arithmetic (register + constant) ----
            OpCode::AddK
            | OpCode::SubK
            | OpCode::MulK
            | OpCode::ModK
            | OpCode::PowK
            | OpCode::DivK
            | OpCode::IDivK
            | OpCode::BAndK
            | OpCode::BOrK
            | OpCode::BXorK => {
                let arith_op = arith_op_of(op)?;
                let lhs = frame.reg(inst.b() as usize)?;
                let rhs = frame.constant(inst.c() as usize)?;
                frame.set_reg(a, arith::arith(arith_op, &lhs, &rhs)?)?;
            }

            // ---- Arithmetic (register-register) ----
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Div
            | OpCode::IDiv
            | OpCode::BAnd
            | OpCode::BOr
            | OpCode::BXor
            | OpCode::Shl
            | OpCode::Shr => {
                let arith_op = arith_op_of(op)?;
                let lhs = frame.reg(inst.b() as usize)?;
                let rhs = frame.reg(inst.c() as usize)?;
                frame.set_reg(a, arith::arith(arith_op, &lhs, &rhs)?)?;
            }

            // ---- Metamethod dispatch: the preceding opcode already produced a result ----
            OpCode::MmBin | OpCode::MmBinI | OpCode::MmBinK => {}

            // ---- Unary ----
            OpCode::Unm => frame.set_reg(a, arith::arith_unm(&frame.reg(inst.b() as usize)?))?,
            OpCode::BNot => frame.set_reg(a, arith::arith_bnot(&frame.reg(inst.b() as usize)?))?,
            OpCode::Not => {
                let value = frame.reg(inst.b() as usize)?;
                frame.set_reg(a, LuaValue::Bool(value.is_falsy()))?;
            }
            OpCode::Len => {
                let len = match frame.reg(inst.b() as usize)? {
                    LuaValue::Table(t) => t.borrow().len() as i64,
                    // Strings included: only tables have a length here.
                    _ => 0,
                };
                frame.set_reg(a, LuaValue::Integer(len))?;
            }
            OpCode::Concat => {
                // Collects the operands into a sequence instead of joining strings.
                let values = frame.reg_range(a, inst.b() as usize)?;
                frame.set_reg(a, LuaValue::from_table(Table::from_sequence(values)))?;
            }
            OpCode::Close => frame.close_from(a),
            OpCode::Tbc => {}

            // ---- Control flow ----
            OpCode::Jmp => pc = jump(pc, inst.get_sj() as i64, code.len())?,

            // ---- Comparisons ----
            OpCode::Eq
            | OpCode::Lt
            | OpCode::Le
            | OpCode::EqK
            | OpCode::EqI
            | OpCode::LtI
            | OpCode::LeI
            | OpCode::GtI
            | OpCode::GeI => {
                let lhs = frame.reg(a)?;
                let outcome = match op {
                    OpCode::Eq => compare::raw_equals(&lhs, &frame.reg(inst.b() as usize)?),
                    OpCode::Lt => compare::less_than(&lhs, &frame.reg(inst.b() as usize)?),
                    OpCode::Le => compare::less_equal(&lhs, &frame.reg(inst.b() as usize)?),
                    OpCode::EqK => {
                        compare::raw_equals(&lhs, &frame.constant(inst.b() as usize)?)
                    }
                    _ => {
                        let ord = compare::compare_immediate(&lhs, inst.sb() as i64);
                        match op {
                            OpCode::EqI => ord == Some(Ordering::Equal),
                            OpCode::LtI => ord == Some(Ordering::Less),
                            OpCode::LeI => {
                                matches!(ord, Some(Ordering::Less | Ordering::Equal))
                            }
                            OpCode::GtI => ord == Some(Ordering::Greater),
                            _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                        }
                    }
                };
                if outcome != inst.k() {
                    pc += 1;
                }
            }
            OpCode::Test => {
                if frame.reg(a)?.is_truthy() != inst.k() {
                    pc += 1;
                }
            }
            OpCode::TestSet => {
                let value = frame.reg(inst.b() as usize)?;
                if value.is_truthy() != inst.k() {
                    pc += 1;
                } else {
                    frame.set_reg(a, value)?;
                }
            }

            // ---- Function calls ----
            OpCode::Call => {
                let func = frame.reg(a)?;
                let want = inst.c() as usize;
                if !func.is_callable() {
                    warn!(callee = func.type_name(), "call on non-callable value");
                    for i in 0..want {
                        frame.set_reg(a + i, LuaValue::new_table())?;
                    }
                    continue;
                }
                let argc = (inst.b() as usize).saturating_sub(1);
                let args = frame.reg_range(a + 1, argc)?;
                let results = vm.call_value(&func, &args)?;
                let mut results = results.into_iter();
                for i in 0..want {
                    let value = results.next().unwrap_or_else(LuaValue::new_table);
                    frame.set_reg(a + i, value)?;
                }
            }
            OpCode::TailCall => {
                let func = frame.reg(a)?;
                if !func.is_callable() {
                    warn!(callee = func.type_name(), "tail call on non-callable value");
                    return Ok((0..inst.c()).map(|_| LuaValue::new_table()).collect());
                }
                let argc = (inst.b() as usize).saturating_sub(1);
                let args = frame.reg_range(a + 1, argc)?;
                return vm.call_value(&func, &args);
            }

            // ---- Returns ----
            OpCode::Return => {
                return match inst.b() {
                    0 => {
                        let top = frame.regs.len();
                        frame.reg_range(a, top.saturating_sub(a))
                    }
                    1 => Ok(vec![frame.reg(a)?]),
                    b => frame.reg_range(a, b as usize - 1),
                };
            }
            OpCode::Return0 => return Ok(Vec::new()),
            OpCode::Return1 => return Ok(vec![frame.reg(a)?]),

            // ---- Numeric for loop ----
            OpCode::ForPrep => {
                if !coerce::to_number(&frame.reg(a)?).is_some_and(Number::is_positive) {
                    pc = jump(pc, inst.bx() as i64 + 1, code.len())?;
                }
            }
            OpCode::ForLoop => {
                let next = match coerce::number_or_zero(&frame.reg(a)?) {
                    Number::Int(i) => Number::Int(i.wrapping_sub(1)),
                    Number::Float(f) => Number::Float(f - 1.0),
                };
                frame.set_reg(a, next.into())?;
                if next.is_positive() {
                    pc = jump(pc, -(inst.bx() as i64), code.len())?;
                }
            }

            // ---- Generic for loop ----
            OpCode::TForPrep | OpCode::TForCall | OpCode::TForLoop => {
                return Err(LuaError::Unimplemented("generic for loop"));
            }

            // ---- Closure ----
            OpCode::Closure => {
                let idx = inst.bx() as usize;
                let parent: &'p Proto = frame.proto;
                let child = parent.protos.get(idx).ok_or_else(|| {
                    LuaError::index_out_of_range("prototype", idx, parent.protos.len())
                })?;
                let captured = child
                    .upvalues
                    .iter()
                    .map(|desc| {
                        let cell = if desc.in_stack {
                            frame.cell(desc.index as usize)?
                        } else {
                            frame.upval_cell(desc.index as usize)?
                        };
                        Ok(Rc::clone(cell))
                    })
                    .collect::<Result<Vec<_>, LuaError>>()?;
                let closure = Closure::new(child, captured, frame.file_upvalues);
                frame.set_reg(a, LuaValue::Closure(Rc::new(closure)))?;
            }

            // ---- Vararg ----
            OpCode::VarArg => return Err(LuaError::Unimplemented("vararg")),
            OpCode::VarArgPrep | OpCode::ExtraArg => {}
        }
    }

    Ok(Vec::new())
}

fn arith_op_of(op: OpCode) -> Result<ArithOp, LuaError> {
    ArithOp::from_opcode(op).ok_or(LuaError::InvalidOpcode(op as u8))
}
