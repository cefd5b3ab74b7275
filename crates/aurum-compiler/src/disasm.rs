//! Bytecode disassembler: renders a compiled function (and every function
//! nested in its constant pool) as a human-readable listing.

use crate::chunk::{Chunk, Constant};
use crate::function::{FunctionId, Heap};
use crate::opcode::OpCode;
use std::fmt::Write;

/// Decode the instruction at `offset`. Returns the opcode and the offset
/// of the next instruction, or `None` on a malformed byte.
pub fn decode(chunk: &Chunk, heap: &Heap, offset: usize) -> Option<(OpCode, usize)> {
    let op = OpCode::from_u8(*chunk.code.get(offset)?)?;
    let mut width = 1 + op.fixed_operands();
    if op == OpCode::Closure {
        // The constant operand names the function whose upvalue count
        // determines how many (is_local, index) pairs follow.
        let k = *chunk.code.get(offset + 1)? as usize;
        match chunk.constants.get(k)? {
            Constant::Function(id) => width += 2 * heap.functions.get(*id).upvalue_count(),
            _ => return None,
        }
    }
    Some((op, offset + width))
}

/// Walk a chunk's instruction stream, yielding `(offset, opcode)` pairs.
pub fn opcode_stream(chunk: &Chunk, heap: &Heap) -> Vec<(usize, OpCode)> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < chunk.code.len() {
        match decode(chunk, heap, offset) {
            Some((op, next)) => {
                out.push((offset, op));
                offset = next;
            }
            None => break,
        }
    }
    out
}

/// Disassemble a complete function into a human-readable string.
pub fn disassemble(heap: &Heap, id: FunctionId) -> String {
    let mut out = String::new();
    disassemble_function(&mut out, heap, id, 0);
    out
}

fn disassemble_function(out: &mut String, heap: &Heap, id: FunctionId, level: usize) {
    let indent = "  ".repeat(level);
    let function = heap.functions.get(id);

    writeln!(
        out,
        "{indent}function {} ({} params, {} upvalues, {} constants, {} bytes)",
        heap.function_name(id),
        function.arity,
        function.upvalue_count(),
        function.chunk.constants.len(),
        function.chunk.len(),
    )
    .unwrap();

    let mut offset = 0;
    while offset < function.chunk.len() {
        let Some((op, next)) = decode(&function.chunk, heap, offset) else {
            writeln!(out, "{indent}\t{offset:04}\t<malformed byte {:#04x}>", function.chunk.code[offset]).unwrap();
            break;
        };
        let coord = function.chunk.coord_at(offset);
        write!(out, "{indent}\t{offset:04}\t{:>4}:{:<3}\t", coord.line, coord.column).unwrap();
        disasm_instruction(out, &function.chunk, heap, offset, op);
        writeln!(out).unwrap();
        offset = next;
    }

    if !function.chunk.constants.is_empty() {
        writeln!(out, "{indent}constants ({}):", function.chunk.constants.len()).unwrap();
        for (i, k) in function.chunk.constants.iter().enumerate() {
            write!(out, "{indent}\t{i}\t").unwrap();
            format_constant(out, k, heap);
            writeln!(out).unwrap();
        }
    }

    if !function.upvalues.is_empty() {
        writeln!(out, "{indent}upvalues ({}):", function.upvalue_count()).unwrap();
        for (i, uv) in function.upvalues.iter().enumerate() {
            let source = if uv.is_local { "local" } else { "upval" };
            writeln!(out, "{indent}\t{i}\t{source} {}", uv.index).unwrap();
        }
    }

    // Nested functions referenced from the constant pool.
    for k in &function.chunk.constants {
        if let Constant::Function(nested) = k {
            disassemble_function(out, heap, *nested, level + 1);
        }
    }
}

fn disasm_instruction(out: &mut String, chunk: &Chunk, heap: &Heap, offset: usize, op: OpCode) {
    write!(out, "{:<5}", op.name()).unwrap();

    match op {
        OpCode::Const | OpCode::GetGlobal | OpCode::SetGlobal | OpCode::DefGlobal => {
            let k = chunk.code[offset + 1] as usize;
            write!(out, " {k}\t; ").unwrap();
            match chunk.constants.get(k) {
                Some(constant) => format_constant(out, constant, heap),
                None => write!(out, "<bad constant>").unwrap(),
            }
        }
        OpCode::GetLocal | OpCode::SetLocal | OpCode::GetUpval | OpCode::SetUpval => {
            write!(out, " {}", chunk.code[offset + 1]).unwrap();
        }
        OpCode::Call | OpCode::Puts => {
            write!(out, " {}", chunk.code[offset + 1]).unwrap();
        }
        OpCode::Jmp | OpCode::JmpFalse => {
            let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
            write!(out, " {jump}\t; to {:04}", offset + 3 + jump as usize).unwrap();
        }
        OpCode::Loop => {
            let back = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
            write!(out, " {back}\t; to {:04}", offset + 3 - back as usize).unwrap();
        }
        OpCode::Closure => {
            let k = chunk.code[offset + 1] as usize;
            write!(out, " {k}").unwrap();
            if let Some(Constant::Function(id)) = chunk.constants.get(k) {
                write!(out, "\t; {}", heap.function_name(*id)).unwrap();
                let count = heap.functions.get(*id).upvalue_count();
                for pair in 0..count {
                    let is_local = chunk.code[offset + 2 + pair * 2] != 0;
                    let index = chunk.code[offset + 3 + pair * 2];
                    let source = if is_local { "local" } else { "upval" };
                    write!(out, " {source} {index}").unwrap();
                }
            }
        }
        _ => {}
    }
}

fn format_constant(out: &mut String, constant: &Constant, heap: &Heap) {
    match constant {
        Constant::Integer(i) => write!(out, "{i}").unwrap(),
        Constant::Number(n) => write!(out, "{n}").unwrap(),
        Constant::Str(s) => write!(out, "\"{}\"", heap.strings.get(*s)).unwrap(),
        Constant::Function(f) => write!(out, "<fun {}>", heap.function_name(*f)).unwrap(),
    }
}
