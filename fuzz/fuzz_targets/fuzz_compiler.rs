#![no_main]

use aurum_compiler::compiler::compile;
use aurum_compiler::function::Heap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The compiler must never panic on any input; errors are fine,
    // panics are bugs.
    if let Ok(source) = std::str::from_utf8(data) {
        let mut heap = Heap::new();
        let _ = compile(source, "fuzz", &mut heap);
    }
});
