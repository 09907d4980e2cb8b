/// Bytecode disassembler (luac -l style output).
use std::fmt;

use crate::opcode::{Instruction, InstructionFormat, OpCode};
use crate::proto::{Constant, Proto};

/// Disassemble a complete Proto into a human-readable string.
pub fn disassemble(proto: &Proto) -> String {
    Listing::new(proto).to_string()
}

/// Display adapter that renders a prototype tree.
pub struct Listing<'a> {
    proto: &'a Proto,
    level: usize,
}

impl<'a> Listing<'a> {
    pub fn new(proto: &'a Proto) -> Self {
        Listing { proto, level: 0 }
    }
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = self.proto;
        let indent = "  ".repeat(self.level);

        let vararg = if proto.is_vararg != 0 { "+" } else { "" };
        writeln!(
            f,
            "{indent}function <{}:{},{}> ({} instructions)",
            proto.source_name(),
            proto.line_defined,
            proto.last_line_defined,
            proto.code.len(),
        )?;
        writeln!(
            f,
            "{indent}{}{vararg} params, {} slots, {} upvalues, {} locals, {} constants, {} functions",
            proto.num_params,
            proto.max_stack_size,
            proto.upvalues.len(),
            proto.debug.local_vars.len(),
            proto.constants.len(),
            proto.protos.len(),
        )?;

        for (pc, inst) in proto.code.iter().enumerate() {
            let line = match proto.line_at(pc) {
                Some(line) => format!("[{line}]"),
                None => "[-]".to_string(),
            };
            write!(f, "{indent}\t{}\t{:>5}\t", pc + 1, line)?;
            write_instruction(f, inst, pc, proto)?;
            writeln!(f)?;
        }

        if !proto.constants.is_empty() {
            writeln!(f, "{indent}constants ({}):", proto.constants.len())?;
            for (i, k) in proto.constants.iter().enumerate() {
                write!(f, "{indent}\t{i}\t")?;
                write_constant(f, k)?;
                writeln!(f)?;
            }
        }

        if !proto.debug.local_vars.is_empty() {
            writeln!(f, "{indent}locals ({}):", proto.debug.local_vars.len())?;
            for (i, var) in proto.debug.local_vars.iter().enumerate() {
                writeln!(
                    f,
                    "{indent}\t{i}\t{}\t{}\t{}",
                    var.name,
                    var.start_pc + 1,
                    var.end_pc + 1
                )?;
            }
        }

        if !proto.upvalues.is_empty() {
            writeln!(f, "{indent}upvalues ({}):", proto.upvalues.len())?;
            for (i, up) in proto.upvalues.iter().enumerate() {
                let name = proto.debug.upvalue_name(i).unwrap_or("-");
                writeln!(
                    f,
                    "{indent}\t{i}\t{name}\t{}\t{}",
                    up.in_stack as u8, up.index
                )?;
            }
        }

        for (i, child) in proto.protos.iter().enumerate() {
            writeln!(f, "{indent}function [{i}]:")?;
            let nested = Listing {
                proto: child,
                level: self.level + 1,
            };
            write!(f, "{nested}")?;
        }
        Ok(())
    }
}

/// Write one instruction with its operands and a `;` annotation where useful.
pub fn write_instruction(
    f: &mut impl fmt::Write,
    inst: &Instruction,
    pc: usize,
    proto: &Proto,
) -> fmt::Result {
    let Some(op) = inst.opcode() else {
        return write!(f, "<invalid {}>", inst.raw_opcode());
    };
    write!(f, "{:<12}", op.name())?;

    match op.format() {
        InstructionFormat::IABC => {
            write!(f, "{} {} {}", inst.a(), inst.b(), inst.c())?;
            if inst.k() {
                write!(f, "k")?;
            }
        }
        InstructionFormat::IABx => write!(f, "{} {}", inst.a(), inst.bx())?,
        InstructionFormat::IAsBx => write!(f, "{} {}", inst.a(), inst.sbx())?,
        InstructionFormat::IAx => write!(f, "{}", inst.ax_field())?,
        InstructionFormat::IsJ => write!(f, "{}", inst.get_sj())?,
    }

    let constant = |idx: usize| proto.constants.get(idx);
    match op {
        OpCode::LoadK => annotate_constant(f, constant(inst.bx() as usize))?,
        OpCode::GetTabUp => {
            let up = proto.debug.upvalue_name(inst.b() as usize).unwrap_or("?");
            write!(f, "\t; {up} ")?;
            write_opt_constant(f, constant(inst.c() as usize))?;
        }
        OpCode::SetTabUp => {
            let up = proto.debug.upvalue_name(inst.a() as usize).unwrap_or("?");
            write!(f, "\t; {up} ")?;
            write_opt_constant(f, constant(inst.b() as usize))?;
        }
        OpCode::GetField => annotate_constant(f, constant(inst.c() as usize))?,
        OpCode::Self_ if inst.k() => annotate_constant(f, constant(inst.c() as usize))?,
        OpCode::SetField => annotate_constant(f, constant(inst.b() as usize))?,
        OpCode::AddK
        | OpCode::SubK
        | OpCode::MulK
        | OpCode::ModK
        | OpCode::PowK
        | OpCode::DivK
        | OpCode::IDivK
        | OpCode::BAndK
        | OpCode::BOrK
        | OpCode::BXorK => annotate_constant(f, constant(inst.c() as usize))?,
        OpCode::EqK => annotate_constant(f, constant(inst.b() as usize))?,
        OpCode::GetUpval | OpCode::SetUpval => {
            let up = proto.debug.upvalue_name(inst.b() as usize).unwrap_or("?");
            write!(f, "\t; {up}")?;
        }
        OpCode::Jmp => write!(f, "\t; to {}", jump_target(pc, inst.get_sj() as i64 + 1))?,
        OpCode::ForPrep => write!(f, "\t; exit to {}", jump_target(pc, inst.bx() as i64 + 2))?,
        OpCode::ForLoop => write!(f, "\t; to {}", jump_target(pc, 1 - inst.bx() as i64))?,
        OpCode::Closure => write!(f, "\t; function [{}]", inst.bx())?,
        OpCode::Move => {
            if let Some(name) = proto.debug.local_name(inst.b() as usize, pc) {
                write!(f, "\t; {name}")?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// One-based listing position of `pc + delta`.
fn jump_target(pc: usize, delta: i64) -> i64 {
    pc as i64 + delta + 1
}

fn annotate_constant(f: &mut impl fmt::Write, k: Option<&Constant>) -> fmt::Result {
    write!(f, "\t; ")?;
    write_opt_constant(f, k)
}

fn write_opt_constant(f: &mut impl fmt::Write, k: Option<&Constant>) -> fmt::Result {
    match k {
        Some(k) => write_constant(f, k),
        None => write!(f, "?"),
    }
}

fn write_constant(f: &mut impl fmt::Write, k: &Constant) -> fmt::Result {
    match k {
        Constant::Nil => write!(f, "nil"),
        Constant::Boolean(b) => write!(f, "{b}"),
        Constant::Integer(i) => write!(f, "{i}"),
        Constant::Float(x) => write!(f, "{x:?}"),
        Constant::String(s) => write!(f, "{s:?}"),
    }
}
