#![no_main]

use libfuzzer_sys::fuzz_target;
use lunette_bytecode::Chunk;
use lunette_core::LuaValue;
use lunette_vm::{Vm, VmConfig};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytecode may fault but must not panic or run forever.
    if let Ok(chunk) = Chunk::undump(data) {
        let mut vm = Vm::with_config(VmConfig {
            max_call_depth: 64,
            instruction_limit: Some(10_000),
        });
        let _ = vm.execute_chunk(&chunk, LuaValue::new_table());
    }
});
