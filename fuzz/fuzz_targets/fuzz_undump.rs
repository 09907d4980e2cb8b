#![no_main]

use libfuzzer_sys::fuzz_target;
use lunette_bytecode::{disasm, Chunk};

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic on any input. Errors are fine.
    if let Ok(chunk) = Chunk::undump(data) {
        let _ = disasm::disassemble(&chunk.main);
        // Whatever decodes must re-encode to something that decodes the same.
        let again = Chunk::undump(&chunk.dump()).expect("re-encoded chunk must decode");
        assert_eq!(again.main.code, chunk.main.code);
    }
});
