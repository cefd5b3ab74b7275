//! Single-pass Aurum compiler: source → function object bytecode.
//!
//! Parsing and emission happen in one pass; there is no AST. A Pratt
//! dispatch table drives expressions, recursive descent drives statements,
//! and a stack of frames tracks nested functions for local and upvalue
//! resolution. Errors never abort: the parser enters panic mode, resumes
//! at the next synchronization point, and keeps collecting diagnostics
//! until end of input.

mod rules;
pub mod scope;

use crate::chunk::{Constant, Coord};
use crate::diag::{Diagnostic, Diagnostics};
use crate::function::{Function, FunctionId, Heap, UpvalueDesc};
use crate::lexer::Lexer;
use crate::opcode::OpCode;
use crate::token::{Token, TokenKind};
use rules::{rule_for, Precedence};
use scope::{Frame, FrameKind, Local, MAX_ARGS, MAX_CONSTS, MAX_JUMP, MAX_LOCALS, MAX_PARAMS, MAX_UPVALUES};

/// Handle for a pending forward jump: created by `emit_jump`, consumed
/// exactly once by `patch_jump`. Dropping one unpatched trips the
/// `must_use` lint; patching twice is impossible by construction.
#[must_use]
pub(crate) struct JumpPatch(usize);

/// All state for one compilation: token cursor, frame stack, heap access,
/// and the diagnostic sink.
pub struct Parser<'src, 'h> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    frames: Vec<Frame<'src>>,
    heap: &'h mut Heap,
    diags: Diagnostics,
    panic_mode: bool,
}

impl<'src, 'h> Parser<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        Parser {
            lexer: Lexer::new(source),
            current: Token::synthetic(),
            previous: Token::synthetic(),
            frames: Vec::new(),
            heap,
            diags: Diagnostics::new(),
            panic_mode: false,
        }
    }

    fn frame(&self) -> &Frame<'src> {
        self.frames.last().unwrap()
    }

    fn frame_mut(&mut self) -> &mut Frame<'src> {
        self.frames.last_mut().unwrap()
    }

    /// GC visibility hook: mark every heap-resident function reachable
    /// from the functions still under construction, innermost frame
    /// first. A VM that allocates during compilation calls this from its
    /// collection root walk.
    pub fn mark_roots(&mut self) {
        for frame in self.frames.iter().rev() {
            for constant in &frame.function.chunk.constants {
                if let Constant::Function(id) = constant {
                    self.heap.trace_function(*id);
                }
            }
        }
    }

    // ---- Diagnostics ----

    fn report(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let at_end = token.kind == TokenKind::Eof;
        let lexeme = if at_end || token.kind == TokenKind::Error {
            None
        } else {
            Some(token.text.to_string())
        };
        self.diags.report(Diagnostic {
            line: token.line,
            column: token.column,
            lexeme,
            at_end,
            message: message.to_string(),
        });
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.report(token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.report(token, message);
    }

    // ---- Token cursor ----

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            // Error tokens carry their diagnostic as their text.
            let token = self.current;
            self.report(token, token.text);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // ---- Chunk emission ----

    fn coord(&self) -> Coord {
        Coord {
            line: self.previous.line,
            column: self.previous.column,
        }
    }

    fn chunk_len(&self) -> usize {
        self.frame().function.chunk.len()
    }

    fn emit_u8(&mut self, byte: u8) {
        let coord = self.coord();
        self.frame_mut().function.chunk.write(byte, coord);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_u8(op as u8);
    }

    fn emit_op_u8(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_u8(operand);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Null);
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Constant) -> u8 {
        let idx = self.frame_mut().function.chunk.add_constant(value);
        if idx >= MAX_CONSTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        idx as u8
    }

    fn emit_constant(&mut self, value: Constant) {
        let k = self.make_constant(value);
        self.emit_op_u8(OpCode::Const, k);
    }

    /// Emit `op` with a two-byte placeholder operand and return the patch
    /// handle for it.
    fn emit_jump(&mut self, op: OpCode) -> JumpPatch {
        self.emit_op(op);
        self.emit_u8(0);
        self.emit_u8(0);
        JumpPatch(self.chunk_len() - 2)
    }

    /// Write the distance from the placeholder to the current end of code
    /// into a pending jump, big-endian.
    fn patch_jump(&mut self, patch: JumpPatch) {
        let JumpPatch(offset) = patch;
        // -2 to adjust for the jump operand itself.
        let jump = self.chunk_len() - offset - 2;
        if jump > MAX_JUMP {
            self.error("Too much code to jump over.");
        }
        let code = &mut self.frame_mut().function.chunk.code;
        code[offset] = ((jump >> 8) & 0xff) as u8;
        code[offset + 1] = (jump & 0xff) as u8;
    }

    /// Emit a backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk_len() - loop_start + 2;
        if offset > MAX_JUMP {
            self.error("Loop body too large.");
        }
        self.emit_u8(((offset >> 8) & 0xff) as u8);
        self.emit_u8((offset & 0xff) as u8);
    }

    // ---- Scopes, locals, upvalues ----

    fn begin_scope(&mut self) {
        self.frame_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.frame_mut().scope_depth -= 1;
        loop {
            let frame = self.frame();
            let (depth, captured) = match frame.locals.last() {
                Some(local) => (local.depth, local.is_captured),
                None => break,
            };
            if depth <= frame.scope_depth {
                break;
            }
            if captured {
                self.emit_op(OpCode::CloseUpval);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.frame_mut().locals.pop();
        }
    }

    fn identifier_constant(&mut self, name: &Token<'src>) -> u8 {
        let id = self.heap.strings.intern(name.text);
        self.make_constant(Constant::Str(id))
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.frame().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.frame_mut().locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self) {
        // Globals are bound by the runtime at definition time.
        if self.frame().scope_depth == 0 {
            return;
        }
        let name = self.previous;
        let mut collides = false;
        for local in self.frame().locals.iter().rev() {
            if local.depth != -1 && local.depth < self.frame().scope_depth {
                break;
            }
            if local.name.text == name.text {
                collides = true;
                break;
            }
        }
        if collides {
            self.error("Variable with this name already declared in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.frame().scope_depth > 0 {
            return 0;
        }
        let name = self.previous;
        self.identifier_constant(&name)
    }

    fn mark_initialized(&mut self) {
        let depth = self.frame().scope_depth;
        if depth == 0 {
            return;
        }
        self.frame_mut().locals.last_mut().unwrap().depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.frame().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_u8(OpCode::DefGlobal, global);
    }

    /// Top-down scan of a frame's locals. Reading a local inside its own
    /// initializer is an error but still resolves.
    fn resolve_local(&mut self, frame_idx: usize, name: &Token<'src>) -> i32 {
        for i in (0..self.frames[frame_idx].locals.len()).rev() {
            let (matches, uninitialized) = {
                let local = &self.frames[frame_idx].locals[i];
                (local.name.text == name.text, local.depth == -1)
            };
            if matches {
                if uninitialized {
                    self.error("Cannot read local variable in its own initializer.");
                }
                return i as i32;
            }
        }
        -1
    }

    /// Walk outward from `frame_idx` looking for `name`, threading an
    /// upvalue chain back down through every intervening frame.
    fn resolve_upvalue(&mut self, frame_idx: usize, name: &Token<'src>) -> i32 {
        if frame_idx == 0 {
            return -1;
        }
        let parent = frame_idx - 1;

        let local = self.resolve_local(parent, name);
        if local != -1 {
            self.frames[parent].locals[local as usize].is_captured = true;
            return self.add_upvalue(frame_idx, local as u8, true);
        }

        let upvalue = self.resolve_upvalue(parent, name);
        if upvalue != -1 {
            return self.add_upvalue(frame_idx, upvalue as u8, false);
        }

        -1
    }

    fn add_upvalue(&mut self, frame_idx: usize, index: u8, is_local: bool) -> i32 {
        for (i, uv) in self.frames[frame_idx].function.upvalues.iter().enumerate() {
            if uv.index == index && uv.is_local == is_local {
                return i as i32;
            }
        }
        if self.frames[frame_idx].function.upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        let upvalues = &mut self.frames[frame_idx].function.upvalues;
        upvalues.push(UpvalueDesc { index, is_local });
        (upvalues.len() - 1) as i32
    }

    // ---- Expressions ----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = match rule_for(self.previous.kind).prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule_for(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule_for(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Assign) {
            self.error("Invalid assignment target.");
        }
    }

    pub(crate) fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after expression.");
    }

    pub(crate) fn number(&mut self, _can_assign: bool) {
        match self.previous.text.parse::<f64>() {
            Ok(value) => self.emit_constant(Constant::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    pub(crate) fn integer(&mut self, _can_assign: bool) {
        let text = self.previous.text;
        let parsed = if self.previous.kind == TokenKind::Hexadecimal {
            i64::from_str_radix(&text[2..], 16)
        } else {
            text.parse::<i64>()
        };
        match parsed {
            Ok(value) => self.emit_constant(Constant::Integer(value)),
            Err(_) => self.error("Integer literal too large."),
        }
    }

    pub(crate) fn string(&mut self, _can_assign: bool) {
        let text = self.previous.text;
        let id = self.heap.strings.intern(&text[1..text.len() - 1]);
        self.emit_constant(Constant::Str(id));
    }

    pub(crate) fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Null => self.emit_op(OpCode::Null),
            TokenKind::Fun => self.emit_op(OpCode::SelfRef),
            _ => unreachable!(),
        }
    }

    pub(crate) fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Neg),
            _ => unreachable!(),
        }
    }

    pub(crate) fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = rule_for(operator);
        self.parse_precedence(rule.precedence.next());

        match operator {
            TokenKind::EqualEqual => self.emit_op(OpCode::Eq),
            TokenKind::Less => self.emit_op(OpCode::Lt),
            TokenKind::LessEqual => self.emit_op(OpCode::Le),

            // The negated comparators are duals of the three above.
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Eq);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Greater => {
                self.emit_op(OpCode::Le);
                self.emit_op(OpCode::Not);
            }
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Lt);
                self.emit_op(OpCode::Not);
            }

            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Sub),
            TokenKind::Star => self.emit_op(OpCode::Mul),
            TokenKind::Slash => self.emit_op(OpCode::Div),
            _ => unreachable!(),
        }
    }

    pub(crate) fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JmpFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    pub(crate) fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JmpFalse);
        let end_jump = self.emit_jump(OpCode::Jmp);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    pub(crate) fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_op_u8(OpCode::Call, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut arg_count: u8 = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression();
                if arg_count as usize == MAX_ARGS {
                    self.error("Cannot have more than 32 arguments.");
                } else {
                    arg_count += 1;
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.");
        arg_count
    }

    pub(crate) fn variable(&mut self, can_assign: bool) {
        let name = self.previous;
        self.named_variable(name, can_assign);
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let frame_idx = self.frames.len() - 1;
        let (get_op, set_op, arg);

        let local = self.resolve_local(frame_idx, &name);
        if local != -1 {
            get_op = OpCode::GetLocal;
            set_op = OpCode::SetLocal;
            arg = local as u8;
        } else {
            let upvalue = self.resolve_upvalue(frame_idx, &name);
            if upvalue != -1 {
                get_op = OpCode::GetUpval;
                set_op = OpCode::SetUpval;
                arg = upvalue as u8;
            } else {
                get_op = OpCode::GetGlobal;
                set_op = OpCode::SetGlobal;
                arg = self.identifier_constant(&name);
            }
        }

        if can_assign && self.match_token(TokenKind::Assign) {
            self.expression();
            self.emit_op_u8(set_op, arg);
        } else {
            self.emit_op_u8(get_op, arg);
        }
    }

    // ---- Declarations and statements ----

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else if self.match_token(TokenKind::Global) {
            self.global_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Puts) {
            self.puts_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.");
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Initialized before the body so the function can call itself.
        self.mark_initialized();
        self.function(FrameKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FrameKind) {
        let name_id = self.heap.strings.intern(self.previous.text);
        self.frames.push(Frame::new(kind, Some(name_id)));
        self.begin_scope();

        self.consume(TokenKind::LParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RParen) {
            loop {
                if self.frame().function.arity == MAX_PARAMS {
                    self.error_at_current("Cannot have more than 255 parameters.");
                } else {
                    self.frame_mut().function.arity += 1;
                }
                let param = self.parse_variable("Expect parameter name.");
                self.define_variable(param);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LBrace, "Expect '{' before function body.");
        self.block();

        let function = self.end_frame();
        let upvalues = function.upvalues.clone();
        let id = self.heap.functions.alloc(function);
        let k = self.make_constant(Constant::Function(id));

        if !upvalues.is_empty() {
            self.emit_op_u8(OpCode::Closure, k);
            for uv in &upvalues {
                self.emit_u8(uv.is_local as u8);
                self.emit_u8(uv.index);
            }
        }
        self.emit_op_u8(OpCode::Const, k);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Assign) {
            self.expression();
        } else {
            self.emit_op(OpCode::Null);
        }
        self.consume(TokenKind::Semi, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    /// `global name [= expr] {, name [= expr]} ;` defines globals no
    /// matter how deeply nested the statement is.
    fn global_declaration(&mut self) {
        loop {
            self.consume(TokenKind::Identifier, "Expect variable name.");
            let name = self.previous;
            let global = self.identifier_constant(&name);

            if self.match_token(TokenKind::Assign) {
                self.expression();
            } else {
                self.emit_op(OpCode::Null);
            }
            self.emit_op_u8(OpCode::DefGlobal, global);

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Semi, "Expect ';' after global declaration.");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semi, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn puts_statement(&mut self) {
        let mut count: usize = 0;
        loop {
            self.expression();
            count += 1;
            if count > MAX_ARGS {
                self.error("Too many values in 'puts' statement.");
                return;
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Semi, "Expect ';' after 'puts' values.");

        self.emit_op_u8(OpCode::Puts, count as u8);
        for _ in 0..count {
            self.emit_op(OpCode::Pop);
        }
    }

    fn if_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Then, "Expect 'then' after condition.");

        let then_jump = self.emit_jump(OpCode::JmpFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        if self.match_token(TokenKind::Else) {
            let else_jump = self.emit_jump(OpCode::Jmp);
            self.patch_jump(then_jump);
            self.emit_op(OpCode::Pop);
            self.statement();
            self.patch_jump(else_jump);
        } else {
            // Without an else the false path skips the condition pop and
            // leaves the value on the stack.
            self.patch_jump(then_jump);
        }
    }

    fn return_statement(&mut self) {
        if self.frame().kind == FrameKind::Script {
            self.error("Cannot return from top-level code.");
        }

        if self.match_token(TokenKind::Semi) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semi, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk_len();
        self.consume(TokenKind::LParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JmpFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    /// Leave panic mode and skip to a statement boundary. A no-op when
    /// not panicking.
    fn synchronize(&mut self) {
        if !self.panic_mode {
            return;
        }
        self.panic_mode = false;

        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Semi {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::For
                | TokenKind::Global
                | TokenKind::If
                | TokenKind::Puts
                | TokenKind::Return
                | TokenKind::Var
                | TokenKind::While => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn end_frame(&mut self) -> Function {
        self.emit_return();
        let frame = self.frames.pop().unwrap();
        frame.function
    }
}

/// Compile Aurum source to a function object in `heap`. This is the
/// public entry point.
///
/// Compilation always runs to end of input; the function handle is
/// withheld iff any diagnostic was reported.
pub fn compile(source: &str, name: &str, heap: &mut Heap) -> Result<FunctionId, Vec<Diagnostic>> {
    let mut parser = Parser::new(source, heap);

    let script_name = parser.heap.strings.intern(name);
    parser.frames.push(Frame::new(FrameKind::Script, Some(script_name)));

    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }

    let script = parser.end_frame();
    let diags = parser.diags;
    if diags.had_error() {
        Err(diags.into_vec())
    } else {
        Ok(heap.functions.alloc(script))
    }
}
