/// Function prototype: decoded bytecode, constants, and debug info.
use crate::opcode::Instruction;

/// Placeholder name for locals and upvalues stripped from the chunk.
pub const ANONYMOUS_VAR: &str = "__var__";

/// Delta byte marking a pc whose line lives in the absolute table.
pub const ABS_LINE_MARKER: i8 = -128;

/// A constant value in the constant pool.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Description of an upvalue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpvalDesc {
    /// True if this upvalue is in the enclosing function's registers (not another upvalue).
    pub in_stack: bool,
    /// Register index if in_stack, upvalue index in parent otherwise.
    pub index: u8,
    /// Kind (regular=0, const=1, close=2, to-be-closed=3).
    pub kind: u8,
}

/// A local variable debug entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVar {
    pub name: String,
    /// First PC where the variable is active.
    pub start_pc: u64,
    /// First PC where the variable is dead.
    pub end_pc: u64,
}

/// Absolute line checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbsLineInfo {
    pub pc: u64,
    pub line: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugInfo {
    /// Per-instruction signed line deltas, stored as raw bytes.
    pub line_info: Vec<u8>,
    pub abs_line_info: Vec<AbsLineInfo>,
    pub local_vars: Vec<LocalVar>,
    pub upvalue_names: Vec<String>,
}

impl DebugInfo {
    /// Name of the `reg`-th local variable active at `pc`.
    pub fn local_name(&self, reg: usize, pc: usize) -> Option<&str> {
        let pc = pc as u64;
        self.local_vars
            .iter()
            .take_while(|var| var.start_pc <= pc)
            .filter(|var| pc < var.end_pc)
            .nth(reg)
            .map(|var| var.name.as_str())
    }

    pub fn upvalue_name(&self, idx: usize) -> Option<&str> {
        self.upvalue_names.get(idx).map(String::as_str)
    }
}

/// A decoded function prototype.
#[derive(Clone, Debug, PartialEq)]
pub struct Proto {
    /// Source name, inherited from the enclosing function when stripped.
    pub source: Option<String>,
    pub line_defined: u64,
    pub last_line_defined: u64,
    /// Number of fixed parameters.
    pub num_params: u8,
    /// Nonzero if this function accepts varargs.
    pub is_vararg: u8,
    /// Number of registers an activation needs.
    pub max_stack_size: u8,
    /// Bytecode instructions.
    pub code: Vec<Instruction>,
    /// Constant pool.
    pub constants: Vec<Constant>,
    /// Upvalue descriptors.
    pub upvalues: Vec<UpvalDesc>,
    /// Nested function prototypes.
    pub protos: Vec<Proto>,
    pub debug: DebugInfo,
}

impl Proto {
    /// Create a new empty prototype.
    pub fn new() -> Self {
        Proto {
            source: None,
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: 0,
            max_stack_size: 2, // minimum
            code: Vec::new(),
            constants: Vec::new(),
            upvalues: Vec::new(),
            protos: Vec::new(),
            debug: DebugInfo::default(),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or("<unnamed>")
    }

    /// Get the source line for a given PC, or `None` without line info.
    ///
    /// Starts from the closest absolute checkpoint at or before `pc` (or from
    /// `line_defined` when there is none) and sums the signed deltas after it.
    pub fn line_at(&self, pc: usize) -> Option<i64> {
        let deltas = &self.debug.line_info;
        if pc >= deltas.len() {
            return None;
        }

        let (base_pc, mut line) = match self
            .debug
            .abs_line_info
            .iter()
            .take_while(|abs| abs.pc as usize <= pc)
            .last()
        {
            Some(abs) => (abs.pc as usize, abs.line as i64),
            None => {
                // The walk starts one before pc 0.
                let mut line = self.line_defined as i64;
                if let Some(&first) = deltas.first() {
                    line += first as i8 as i64;
                }
                (0, line)
            }
        };

        for &delta in &deltas[base_pc + 1..=pc] {
            line += delta as i8 as i64;
        }
        Some(line)
    }

    /// Count of nested prototypes, this one included.
    pub fn total_protos(&self) -> usize {
        1 + self.protos.iter().map(Proto::total_protos).sum::<usize>()
    }
}

impl Default for Proto {
    fn default() -> Self {
        Self::new()
    }
}
