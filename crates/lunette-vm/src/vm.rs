//! Lua VM state.

use lunette_bytecode::{Chunk, Proto};
use lunette_core::{new_cell, Closure, LuaValue, UpvalCell};
use tracing::trace_span;

use crate::dispatch;
use crate::error::LuaError;

/// Execution limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Max nested activations before `StackOverflow`.
    pub max_call_depth: usize,
    /// Total instructions allowed across all activations; `None` is unlimited.
    pub instruction_limit: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 200,
            instruction_limit: None,
        }
    }
}

/// The Lua virtual machine.
///
/// Holds no values between calls. Each activation owns its registers and
/// lives on the host stack for the duration of one `call_proto`.
#[derive(Debug, Default)]
pub struct Vm {
    config: VmConfig,
    /// Current activation depth.
    depth: usize,
    /// Instructions dispatched so far.
    executed: u64,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Vm {
            config,
            depth: 0,
            executed: 0,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn instructions_executed(&self) -> u64 {
        self.executed
    }

    /// Run a chunk's entry function with `env` as its first upvalue (`_ENV`).
    pub fn execute_chunk<'p>(
        &mut self,
        chunk: &'p Chunk,
        env: LuaValue<'p>,
    ) -> Result<Vec<LuaValue<'p>>, LuaError> {
        let upvalues = vec![new_cell(env)];
        self.call_proto(&chunk.main, &upvalues, &[], chunk.upvalue_count as usize)
    }

    /// Run `proto` in a fresh activation.
    ///
    /// The activation gets `max(proto.upvalues.len(), file_upvalues)` upvalue
    /// slots: the cells in `upvalues` first, fresh nil cells after them.
    pub fn call_proto<'p>(
        &mut self,
        proto: &'p Proto,
        upvalues: &[UpvalCell<'p>],
        args: &[LuaValue<'p>],
        file_upvalues: usize,
    ) -> Result<Vec<LuaValue<'p>>, LuaError> {
        if self.depth >= self.config.max_call_depth {
            return Err(LuaError::StackOverflow);
        }

        let span = trace_span!("call", source = proto.source_name(), depth = self.depth);
        let _guard = span.enter();

        self.depth += 1;
        let result = dispatch::execute(self, proto, upvalues, args, file_upvalues);
        self.depth -= 1;
        result
    }

    pub fn call_closure<'p>(
        &mut self,
        closure: &Closure<'p>,
        args: &[LuaValue<'p>],
    ) -> Result<Vec<LuaValue<'p>>, LuaError> {
        self.call_proto(closure.proto, &closure.upvalues, args, closure.file_upvalues)
    }

    /// Call a closure or native function.
    pub fn call_value<'p>(
        &mut self,
        func: &LuaValue<'p>,
        args: &[LuaValue<'p>],
    ) -> Result<Vec<LuaValue<'p>>, LuaError> {
        match func {
            LuaValue::Closure(closure) => self.call_closure(closure, args),
            LuaValue::Native(native) => Ok(native.call(args)?),
            other => Err(LuaError::TypeError {
                op: "call",
                expected: "function",
                found: other.type_name(),
            }),
        }
    }

    /// Count one dispatched instruction against the budget.
    pub(crate) fn tick(&mut self) -> Result<(), LuaError> {
        self.executed += 1;
        match self.config.instruction_limit {
            Some(limit) if self.executed > limit => Err(LuaError::InstructionLimit(limit)),
            _ => Ok(()),
        }
    }
}
