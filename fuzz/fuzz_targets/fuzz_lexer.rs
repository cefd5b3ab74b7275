#![no_main]

use aurum_compiler::lexer::Lexer;
use aurum_compiler::token::TokenKind;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let mut lexer = Lexer::new(source);
        while lexer.scan_token().kind != TokenKind::Eof {}
    }
});
