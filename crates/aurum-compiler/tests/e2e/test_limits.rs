use super::helpers::*;
use std::fmt::Write;

#[test]
fn e2e_256_constants_compile() {
    let mut src = String::new();
    for i in 0..256 {
        writeln!(src, "{i};").unwrap();
    }
    let (id, heap) = compile_str(&src);
    assert_eq!(heap.functions.get(id).chunk.constants.len(), 256);
}

#[test]
fn e2e_257th_constant_overflows_pool() {
    let mut src = String::new();
    for i in 0..257 {
        writeln!(src, "{i};").unwrap();
    }
    let errs = compile_str_err(&src);
    assert!(messages(&errs).contains(&"Too many constants in one chunk."));
}

#[test]
fn e2e_255_locals_fill_a_frame() {
    // Slot 0 is the callee, so 255 declarations reach the 256-slot cap.
    let mut src = String::from("{\n");
    for i in 0..255 {
        writeln!(src, "var v{i};").unwrap();
    }
    src.push('}');
    compile_str(&src);
}

#[test]
fn e2e_256th_local_overflows_frame() {
    let mut src = String::from("{\n");
    for i in 0..256 {
        writeln!(src, "var v{i};").unwrap();
    }
    src.push('}');
    let errs = compile_str_err(&src);
    assert!(messages(&errs).contains(&"Too many local variables in function."));
}

#[test]
fn e2e_255_parameters_compile() {
    let params: Vec<String> = (0..255).map(|i| format!("p{i}")).collect();
    let src = format!("fun f({}) {{ }}", params.join(", "));
    let (id, heap) = compile_str(&src);
    let f = nested_function(&heap, id, 0);
    assert_eq!(heap.functions.get(f).arity, 255);
}

#[test]
fn e2e_256th_parameter_is_rejected() {
    let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
    let src = format!("fun f({}) {{ }}", params.join(", "));
    let errs = compile_str_err(&src);
    assert_eq!(errs[0].message, "Cannot have more than 255 parameters.");
}

#[test]
fn e2e_32_arguments_compile() {
    let args: Vec<String> = (0..32).map(|i| i.to_string()).collect();
    let src = format!("f({});", args.join(", "));
    compile_str(&src);
}

#[test]
fn e2e_33rd_argument_is_rejected() {
    let args: Vec<String> = (0..33).map(|i| i.to_string()).collect();
    let src = format!("f({});", args.join(", "));
    let errs = compile_str_err(&src);
    assert!(messages(&errs).contains(&"Cannot have more than 32 arguments."));
}

#[test]
fn e2e_32_puts_values_compile() {
    let values: Vec<String> = (0..32).map(|i| i.to_string()).collect();
    let src = format!("puts {};", values.join(", "));
    compile_str(&src);
}

#[test]
fn e2e_33rd_puts_value_is_rejected() {
    let values: Vec<String> = (0..33).map(|i| i.to_string()).collect();
    let src = format!("puts {};", values.join(", "));
    let errs = compile_str_err(&src);
    assert!(messages(&errs).contains(&"Too many values in 'puts' statement."));
}

// Jump-distance boundaries. Inside the then-block, `1;` costs 3 bytes
// (CONST k, POP) and `puts 1;` costs 5 (CONST k, PUTS n, POP), so
// 21843 × 3 + 5 + 1 lands the patch distance exactly on 65535.

#[test]
fn e2e_jump_of_exactly_65535_compiles() {
    let mut src = String::from("if (true) then {\n");
    for _ in 0..21843 {
        src.push_str("1;\n");
    }
    src.push_str("puts 1;\n}");
    let (id, heap) = compile_str(&src);
    let chunk = &heap.functions.get(id).chunk;
    let jump = u16::from_be_bytes([chunk.code[2], chunk.code[3]]);
    assert_eq!(jump, 65535);
}

#[test]
fn e2e_jump_of_65536_overflows() {
    let mut src = String::from("if (true) then {\n");
    for _ in 0..21845 {
        src.push_str("1;\n");
    }
    src.push('}');
    let errs = compile_str_err(&src);
    assert_eq!(messages(&errs), vec!["Too much code to jump over."]);
}

#[test]
fn e2e_large_loop_body_compiles_below_the_cap() {
    let mut src = String::from("while (true) {\n");
    for _ in 0..21842 {
        src.push_str("1;\n");
    }
    src.push('}');
    compile_str(&src);
}

#[test]
fn e2e_loop_body_beyond_the_cap_overflows() {
    let mut src = String::from("while (true) {\n");
    for _ in 0..21843 {
        src.push_str("1;\n");
    }
    src.push('}');
    let errs = compile_str_err(&src);
    assert_eq!(messages(&errs), vec!["Loop body too large."]);
}

#[test]
fn e2e_integer_literal_overflow() {
    let errs = compile_str_err("9223372036854775808;");
    assert!(messages(&errs).contains(&"Integer literal too large."));
}

#[test]
fn e2e_hex_literal_at_i64_max_compiles() {
    compile_str("0x7FFFFFFFFFFFFFFF;");
}

#[test]
fn e2e_hex_literal_overflow() {
    let errs = compile_str_err("0xFFFFFFFFFFFFFFFF;");
    assert!(messages(&errs).contains(&"Integer literal too large."));
}
