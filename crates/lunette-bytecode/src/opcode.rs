/// Lua 5.4 opcodes and instruction decoding.
///
/// Instruction layout (32 bits, little-endian word as stored by `luac`):
/// - Bits 0-6: OpCode (7 bits)
/// - Bits 7-14: A (8 bits)
/// - Bit 15: k flag
/// - Bits 16-23: B (8 bits)
/// - Bits 24-31: C (8 bits)
/// - iABx: Bx = bits 15-31 (17 bits, unsigned)
/// - iAsBx: sBx = Bx - 0xFFFF
/// - iAx: Ax = bits 7-31 (25 bits)
/// - isJ: sJ = Ax - 0xFFFFFF
use std::fmt;

use crate::reader::FromLeBytes;

const SIZE_OP: u32 = 7;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 8;
const SIZE_C: u32 = 8;
const SIZE_BX: u32 = SIZE_B + SIZE_C + 1; // 17
const SIZE_AX: u32 = SIZE_BX + SIZE_A; // 25

const POS_OP: u32 = 0;
const POS_A: u32 = POS_OP + SIZE_OP; // 7
const POS_K: u32 = POS_A + SIZE_A; // 15
const POS_B: u32 = POS_K + 1; // 16
const POS_C: u32 = POS_B + SIZE_B; // 24
const POS_BX: u32 = POS_K;
const POS_AX: u32 = POS_A;

const fn mask(n: u32) -> u32 {
    (1 << n) - 1
}

pub const MAX_BX: u32 = mask(SIZE_BX); // 131071
pub const MAX_AX: u32 = mask(SIZE_AX); // 33554431
pub const OFFSET_SBX: i32 = (MAX_BX >> 1) as i32; // 0xFFFF
pub const OFFSET_SJ: i32 = (MAX_AX >> 1) as i32; // 0xFFFFFF

/// All 83 Lua 5.4 opcodes, in `lopcodes.h` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadI,
    LoadF,
    LoadK,
    LoadKx,
    LoadFalse,
    LFalseSkip,
    LoadTrue,
    LoadNil,
    GetUpval,
    SetUpval,
    GetTabUp,
    GetTable,
    GetI,
    GetField,
    SetTabUp,
    SetTable,
    SetI,
    SetField,
    NewTable,
    Self_,
    AddI,
    AddK,
    SubK,
    MulK,
    ModK,
    PowK,
    DivK,
    IDivK,
    BAndK,
    BOrK,
    BXorK,
    ShrI,
    ShlI,
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
    MmBin,
    MmBinI,
    MmBinK,
    Unm,
    BNot,
    Not,
    Len,
    Concat,
    Close,
    Tbc,
    Jmp,
    Eq,
    Lt,
    Le,
    EqK,
    EqI,
    LtI,
    LeI,
    GtI,
    GeI,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    Return0,
    Return1,
    ForLoop,
    ForPrep,
    TForPrep,
    TForCall,
    TForLoop,
    SetList,
    Closure,
    VarArg,
    VarArgPrep,
    ExtraArg,
}

impl OpCode {
    /// Number of opcodes.
    pub const COUNT: usize = 83;

    /// Every opcode, indexed by its numeric value.
    pub const ALL: [OpCode; OpCode::COUNT] = {
        use OpCode::*;
        [
            Move, LoadI, LoadF, LoadK, LoadKx, LoadFalse, LFalseSkip, LoadTrue, LoadNil,
            GetUpval, SetUpval, GetTabUp, GetTable, GetI, GetField, SetTabUp, SetTable, SetI,
            SetField, NewTable, Self_, AddI, AddK, SubK, MulK, ModK, PowK, DivK, IDivK, BAndK,
            BOrK, BXorK, ShrI, ShlI, Add, Sub, Mul, Mod, Pow, Div, IDiv, BAnd, BOr, BXor, Shl,
            Shr, MmBin, MmBinI, MmBinK, Unm, BNot, Not, Len, Concat, Close, Tbc, Jmp, Eq, Lt,
            Le, EqK, EqI, LtI, LeI, GtI, GeI, Test, TestSet, Call, TailCall, Return, Return0,
            Return1, ForLoop, ForPrep, TForPrep, TForCall, TForLoop, SetList, Closure, VarArg,
            VarArgPrep, ExtraArg,
        ]
    };

    pub fn from_u8(val: u8) -> Option<OpCode> {
        Self::ALL.get(val as usize).copied()
    }

    /// Get the instruction format for this opcode.
    pub fn format(&self) -> InstructionFormat {
        use InstructionFormat::*;
        use OpCode::*;
        match self {
            ExtraArg => IAx,
            Jmp => IsJ,
            LoadI | LoadF => IAsBx,
            LoadK | LoadKx | ForLoop | ForPrep | TForPrep | TForLoop | Closure => IABx,
            _ => IABC,
        }
    }

    /// Get the `luac` mnemonic of this opcode.
    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadI => "LOADI",
            LoadF => "LOADF",
            LoadK => "LOADK",
            LoadKx => "LOADKX",
            LoadFalse => "LOADFALSE",
            LFalseSkip => "LFALSESKIP",
            LoadTrue => "LOADTRUE",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            SetUpval => "SETUPVAL",
            GetTabUp => "GETTABUP",
            GetTable => "GETTABLE",
            GetI => "GETI",
            GetField => "GETFIELD",
            SetTabUp => "SETTABUP",
            SetTable => "SETTABLE",
            SetI => "SETI",
            SetField => "SETFIELD",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            AddI => "ADDI",
            AddK => "ADDK",
            SubK => "SUBK",
            MulK => "MULK",
            ModK => "MODK",
            PowK => "POWK",
            DivK => "DIVK",
            IDivK => "IDIVK",
            BAndK => "BANDK",
            BOrK => "BORK",
            BXorK => "BXORK",
            ShrI => "SHRI",
            ShlI => "SHLI",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Mod => "MOD",
            Pow => "POW",
            Div => "DIV",
            IDiv => "IDIV",
            BAnd => "BAND",
            BOr => "BOR",
            BXor => "BXOR",
            Shl => "SHL",
            Shr => "SHR",
            MmBin => "MMBIN",
            MmBinI => "MMBINI",
            MmBinK => "MMBINK",
            Unm => "UNM",
            BNot => "BNOT",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Close => "CLOSE",
            Tbc => "TBC",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            EqK => "EQK",
            EqI => "EQI",
            LtI => "LTI",
            LeI => "LEI",
            GtI => "GTI",
            GeI => "GEI",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            Return0 => "RETURN0",
            Return1 => "RETURN1",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForPrep => "TFORPREP",
            TForCall => "TFORCALL",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Closure => "CLOSURE",
            VarArg => "VARARG",
            VarArgPrep => "VARARGPREP",
            ExtraArg => "EXTRAARG",
        }
    }

    /// Returns true if this opcode is a test (conditional skip).
    pub fn is_test(&self) -> bool {
        use OpCode::*;
        matches!(
            self,
            Eq | Lt | Le | EqK | EqI | LtI | LeI | GtI | GeI | Test | TestSet
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction format types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionFormat {
    IABC,
    IABx,
    IAsBx,
    IAx,
    IsJ,
}

/// A 32-bit Lua bytecode instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    // ---- Constructors ----

    pub fn abc(op: OpCode, a: u8, b: u8, c: u8, k: bool) -> Self {
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= (k as u32) << POS_K;
        i |= (b as u32) << POS_B;
        i |= (c as u32) << POS_C;
        Instruction(i)
    }

    pub fn abx(op: OpCode, a: u8, bx: u32) -> Self {
        debug_assert!(bx <= MAX_BX, "Bx out of range: {bx}");
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= (bx & MAX_BX) << POS_BX;
        Instruction(i)
    }

    pub fn asbx(op: OpCode, a: u8, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + OFFSET_SBX) as u32)
    }

    pub fn ax(op: OpCode, ax: u32) -> Self {
        debug_assert!(ax <= MAX_AX, "Ax out of range: {ax}");
        Instruction(((op as u32) << POS_OP) | ((ax & MAX_AX) << POS_AX))
    }

    pub fn sj(op: OpCode, sj: i32) -> Self {
        Self::ax(op, (sj + OFFSET_SJ) as u32)
    }

    // ---- Decoders ----

    /// The raw 7-bit opcode number, which may not name a valid opcode.
    pub fn raw_opcode(&self) -> u8 {
        ((self.0 >> POS_OP) & mask(SIZE_OP)) as u8
    }

    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.raw_opcode())
    }

    pub fn a(&self) -> u8 {
        ((self.0 >> POS_A) & mask(SIZE_A)) as u8
    }

    pub fn k(&self) -> bool {
        ((self.0 >> POS_K) & 1) != 0
    }

    pub fn b(&self) -> u8 {
        ((self.0 >> POS_B) & mask(SIZE_B)) as u8
    }

    pub fn c(&self) -> u8 {
        ((self.0 >> POS_C) & mask(SIZE_C)) as u8
    }

    /// Field B as a signed byte.
    pub fn sb(&self) -> i8 {
        self.b() as i8
    }

    /// Field C as a signed byte.
    pub fn sc(&self) -> i8 {
        self.c() as i8
    }

    pub fn bx(&self) -> u32 {
        (self.0 >> POS_BX) & MAX_BX
    }

    pub fn sbx(&self) -> i32 {
        self.bx() as i32 - OFFSET_SBX
    }

    pub fn ax_field(&self) -> u32 {
        (self.0 >> POS_AX) & MAX_AX
    }

    /// Get field sJ (signed jump).
    pub fn get_sj(&self) -> i32 {
        self.ax_field() as i32 - OFFSET_SJ
    }
}

impl FromLeBytes for Instruction {
    const SIZE: usize = 4;

    fn from_le(bytes: &[u8]) -> Self {
        Instruction(<u32 as FromLeBytes>::from_le(bytes))
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            return write!(f, "<invalid opcode {}> {:#010x}", self.raw_opcode(), self.0);
        };
        write!(f, "{}", op.name())?;
        match op.format() {
            InstructionFormat::IABC => {
                write!(f, " A={} B={} C={}", self.a(), self.b(), self.c())?;
                if self.k() {
                    write!(f, " k")?;
                }
            }
            InstructionFormat::IABx => write!(f, " A={} Bx={}", self.a(), self.bx())?,
            InstructionFormat::IAsBx => write!(f, " A={} sBx={}", self.a(), self.sbx())?,
            InstructionFormat::IAx => write!(f, " Ax={}", self.ax_field())?,
            InstructionFormat::IsJ => write!(f, " sJ={}", self.get_sj())?,
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
