use super::helpers::*;
use aurum_compiler::function::UpvalueDesc;
use aurum_compiler::opcode::OpCode;

#[test]
fn e2e_function_declaration_defines_global() {
    assert_eq!(
        script_ops("fun f() { }"),
        vec![OpCode::Const, OpCode::DefGlobal, OpCode::Null, OpCode::Return]
    );
}

#[test]
fn e2e_function_records_name_and_arity() {
    let (id, heap) = compile_str("fun add(a, b) { return a + b; }");
    let f = nested_function(&heap, id, 0);
    assert_eq!(heap.function_name(f), "add");
    assert_eq!(heap.functions.get(f).arity, 2);
}

#[test]
fn e2e_function_body_ends_with_implicit_return() {
    let (id, heap) = compile_str("fun f() { 1; }");
    let f = nested_function(&heap, id, 0);
    let ops = ops_of(&heap, f);
    assert_eq!(ops[ops.len() - 2..], [OpCode::Null, OpCode::Return]);
}

#[test]
fn e2e_parameters_resolve_as_locals() {
    let (id, heap) = compile_str("fun second(a, b) { return b; }");
    let f = nested_function(&heap, id, 0);
    let chunk = &heap.functions.get(f).chunk;
    // b sits in slot 2; slot 0 is the callee.
    assert_eq!(chunk.code[0], OpCode::GetLocal as u8);
    assert_eq!(chunk.code[1], 2);
}

#[test]
fn e2e_bare_return_yields_null() {
    let (id, heap) = compile_str("fun f() { return; }");
    let f = nested_function(&heap, id, 0);
    assert_eq!(
        ops_of(&heap, f),
        vec![
            OpCode::Null,
            OpCode::Return,
            OpCode::Null,
            OpCode::Return
        ]
    );
}

#[test]
fn e2e_recursion_resolves_through_global() {
    let (id, heap) = compile_str("fun countdown(n) { if (n > 0) then countdown(n - 1); }");
    let f = nested_function(&heap, id, 0);
    let ops = ops_of(&heap, f);
    assert!(ops.contains(&OpCode::GetGlobal));
    assert!(ops.contains(&OpCode::Call));
}

#[test]
fn e2e_local_function_is_callable_before_body_ends() {
    // markInitialized runs before the body parses, so the name resolves.
    let (id, heap) = compile_str("{ fun f() { return f; } }");
    let f = nested_function(&heap, id, 0);
    let ops = ops_of(&heap, f);
    // f captures itself as an upvalue from the enclosing block.
    assert!(ops.contains(&OpCode::GetUpval));
}

#[test]
fn e2e_closure_scenario_capture_shape() {
    let src = "fun outer() { var a = 1; fun inner() { return a; } return inner; }";
    let (id, heap) = compile_str(src);
    let outer = nested_function(&heap, id, 0);
    let inner = nested_function(&heap, outer, 0);

    assert_eq!(
        heap.functions.get(inner).upvalues,
        vec![UpvalueDesc {
            index: 1,
            is_local: true
        }]
    );

    let inner_chunk = &heap.functions.get(inner).chunk;
    assert_eq!(inner_chunk.code[0], OpCode::GetUpval as u8);
    assert_eq!(inner_chunk.code[1], 0);

    let outer_chunk = &heap.functions.get(outer).chunk;
    let clo_at = outer_chunk
        .code
        .iter()
        .position(|&b| b == OpCode::Closure as u8)
        .unwrap();
    // CLO k, (is_local=1, index=1), then CONST k.
    let k = outer_chunk.code[clo_at + 1];
    assert_eq!(outer_chunk.code[clo_at + 2], 1);
    assert_eq!(outer_chunk.code[clo_at + 3], 1);
    assert_eq!(outer_chunk.code[clo_at + 4], OpCode::Const as u8);
    assert_eq!(outer_chunk.code[clo_at + 5], k);
}

#[test]
fn e2e_transitive_capture_scenario() {
    let src = "fun a() { var x = 1; fun b() { fun c() { return x; } return c; } return b; }";
    let (id, heap) = compile_str(src);
    let a = nested_function(&heap, id, 0);
    let b = nested_function(&heap, a, 0);
    let c = nested_function(&heap, b, 0);

    assert_eq!(
        heap.functions.get(b).upvalues,
        vec![UpvalueDesc {
            index: 1,
            is_local: true
        }]
    );
    assert_eq!(
        heap.functions.get(c).upvalues,
        vec![UpvalueDesc {
            index: 0,
            is_local: false
        }]
    );
}

#[test]
fn e2e_sibling_closures_share_nothing() {
    let src = "fun outer() { var a = 1; var b = 2; fun fa() { return a; } fun fb() { return b; } }";
    let (id, heap) = compile_str(src);
    let outer = nested_function(&heap, id, 0);
    let fa = nested_function(&heap, outer, 0);
    let fb = nested_function(&heap, outer, 1);
    assert_eq!(
        heap.functions.get(fa).upvalues,
        vec![UpvalueDesc {
            index: 1,
            is_local: true
        }]
    );
    assert_eq!(
        heap.functions.get(fb).upvalues,
        vec![UpvalueDesc {
            index: 2,
            is_local: true
        }]
    );
}

#[test]
fn e2e_captured_block_local_emits_close() {
    let src = "fun outer() { { var a = 1; fun inner() { return a; } inner; } }";
    let (id, heap) = compile_str(src);
    let outer = nested_function(&heap, id, 0);
    let ops = ops_of(&heap, outer);
    assert!(ops.contains(&OpCode::CloseUpval));
}

#[test]
fn e2e_uncaptured_block_local_pops() {
    let src = "fun outer() { { var a = 1; } }";
    let (id, heap) = compile_str(src);
    let outer = nested_function(&heap, id, 0);
    let ops = ops_of(&heap, outer);
    assert!(ops.contains(&OpCode::Pop));
    assert!(!ops.contains(&OpCode::CloseUpval));
}

#[test]
fn e2e_assignment_through_upvalue() {
    let src = "fun outer() { var a = 1; fun inner() { a = 2; } }";
    let (id, heap) = compile_str(src);
    let outer = nested_function(&heap, id, 0);
    let inner = nested_function(&heap, outer, 0);
    assert!(ops_of(&heap, inner).contains(&OpCode::SetUpval));
}

#[test]
fn e2e_nested_functions_inside_blocks() {
    let src = "fun f() { { fun g() { } g; } }";
    let (id, heap) = compile_str(src);
    let f = nested_function(&heap, id, 0);
    let g = nested_function(&heap, f, 0);
    assert_eq!(heap.function_name(g), "g");
    assert_eq!(heap.functions.get(g).upvalue_count(), 0);
}

#[test]
fn e2e_call_scenario_program() {
    // Scenario: fun f(x){ return x; } f(3);
    let src = "fun f(x) { return x; } f(3);";
    let (id, heap) = compile_str(src);
    let f = nested_function(&heap, id, 0);
    assert_eq!(
        ops_of(&heap, f),
        vec![
            OpCode::GetLocal,
            OpCode::Return,
            OpCode::Null,
            OpCode::Return
        ]
    );
    assert_eq!(
        ops_of(&heap, id),
        vec![
            OpCode::Const,
            OpCode::DefGlobal,
            OpCode::GetGlobal,
            OpCode::Const,
            OpCode::Call,
            OpCode::Pop,
            OpCode::Null,
            OpCode::Return
        ]
    );
}
