//! Single-pass compiler: tokens in, bytecode out.
//!
//! There is no AST. The parser emits instructions as it recognizes source
//! forms; jump targets that are not known yet are emitted as placeholders and
//! back-patched. All compilation state (the old global latches, scope
//! counters, exit lists) lives in the [`Compiler`] context.

pub mod exprs;
pub mod stmts;
pub mod symbols;

use crate::bytecode::chunk::{Chunk, Program};
use crate::bytecode::opcode::Op;
use crate::diagnostics::Diagnostics;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::source::SourceFile;
use crate::value::Value;
use symbols::{FunctionTable, GlobalTable, LocalTable};

pub struct Compiler<'src> {
    pub(crate) lexer: Lexer<'src>,
    pub(crate) chunk: Chunk<'src>,
    pub(crate) globals: GlobalTable<'src>,
    pub(crate) locals: LocalTable<'src>,
    pub(crate) functions: FunctionTable<'src>,
    pub(crate) diags: Diagnostics<'src>,
    /// Lexical nesting depth; 0 is file scope.
    pub(crate) scope_depth: u32,
    /// Next body-local slot: the count of live body locals, which is also
    /// the next free frame position. Resets on function entry and shrinks
    /// as scopes close.
    pub(crate) local_index: i16,
    /// Placeholder offsets of `return` jumps, patched at function close.
    pub(crate) exit_addrs: Vec<usize>,
    /// Whether the most recent declaration was a `return` statement.
    pub(crate) return_found: bool,
    pub(crate) main_addr: Option<usize>,
}

/// What compilation produces: the program (valid only when `ok()`) and every
/// diagnostic reported along the way.
pub struct CompileResult<'src> {
    pub program: Program<'src>,
    pub diagnostics: Diagnostics<'src>,
}

impl CompileResult<'_> {
    pub fn ok(&self) -> bool {
        !self.diagnostics.any()
    }
}

impl<'src> Compiler<'src> {
    pub fn new(source: &'src SourceFile) -> Self {
        Self {
            lexer: Lexer::new(source.text()),
            chunk: Chunk::new(),
            globals: GlobalTable::new(),
            locals: LocalTable::new(),
            functions: FunctionTable::new(),
            diags: Diagnostics::new(source),
            scope_depth: 0,
            local_index: 0,
            exit_addrs: Vec::new(),
            return_found: false,
            main_addr: None,
        }
    }

    /// Compile the whole file. Only `var` and `func` may appear at file
    /// scope.
    pub fn compile(mut self) -> CompileResult<'src> {
        loop {
            let kind = self.peek();
            match kind {
                TokenKind::Eof => break,
                TokenKind::Var | TokenKind::Func => self.parse_top_level(kind),
                _ => {
                    let tok = self.skip_token();
                    self.diags
                        .report_parse_plain(tok.line, "unqualified statement in global scope");
                    break;
                }
            }
        }

        CompileResult {
            program: Program {
                chunk: self.chunk,
                globals: self.globals.into_names(),
                main_addr: self.main_addr,
            },
            diagnostics: self.diags,
        }
    }

    fn parse_top_level(&mut self, kind: TokenKind) {
        if kind == TokenKind::Func {
            self.parse_function_declaration();
        } else {
            self.parse_declaration(kind);
        }
    }

    pub(crate) fn parse_declaration(&mut self, kind: TokenKind) {
        self.return_found = false;
        let errors_before = self.diags.count();
        if kind == TokenKind::Var {
            self.parse_variable_declaration(true);
        } else {
            self.parse_statement(kind);
        }

        if self.diags.count() > errors_before {
            self.synchronize();
        }
    }

    /// `var name (= expr)? ;` — an omitted initializer stores nil.
    pub(crate) fn parse_variable_declaration(&mut self, consume_semicolon: bool) {
        self.advance();
        let name_tok = self.advance();
        if name_tok.kind != TokenKind::Identifier {
            self.unexpected_token("identifier", name_tok);
            return;
        }
        let name = self.lexer.text_of(name_tok);

        if self.lexer.match_kind(TokenKind::Equal) {
            self.parse_assignment(0);
        } else {
            self.emit(Op::Nil);
        }

        self.define_variable(name, name_tok);
        if consume_semicolon {
            self.consume(TokenKind::Semicolon);
        }
    }

    fn define_variable(&mut self, name: &'src str, tok: Token) {
        if self.scope_depth == 0 {
            match self.globals.define(name) {
                Some(slot) => self.emit_u16_at(Op::DefineGlobal, slot, tok.line),
                None => self.diags.report_parse(
                    tok.line,
                    tok.start,
                    tok.len,
                    "redefining variable in the same scope ",
                ),
            }
        } else {
            if self.locals.declared_in_scope(name, self.scope_depth) {
                self.diags.report_parse(
                    tok.line,
                    tok.start,
                    tok.len,
                    "redefining variable in the same scope ",
                );
                return;
            }
            let slot = self.local_index;
            self.local_index += 1;
            self.locals.push(name, slot, self.scope_depth);
            // The initializer's value stays on the stack as the local's
            // storage; define_local just records the slot at runtime.
            self.emit_u16_at(Op::DefineLocal, slot as u16, tok.line);
        }
    }

    /// `func name(a, …) { … }` — parameters become negative-slot locals,
    /// the body compiles in place, and every recorded `return` jump is
    /// patched to the epilogue.
    fn parse_function_declaration(&mut self) {
        self.begin_scope();
        self.local_index = 0;
        self.advance();

        let name_tok = self.advance();
        if name_tok.kind != TokenKind::FuncIdentifier {
            self.unexpected_token("function name", name_tok);
            self.abandon_function();
            return;
        }
        let name = self.lexer.text_of(name_tok);
        if self.functions.defined(name) {
            self.diags
                .report_parse(name_tok.line, name_tok.start, name_tok.len, "redefining function ");
            self.abandon_function();
            return;
        }

        self.consume(TokenKind::LeftParen);
        let mut arity: u16 = 0;
        loop {
            let kind = self.peek();
            if kind == TokenKind::RightParen || kind == TokenKind::Eof {
                break;
            }
            let param = self.advance();
            if param.kind != TokenKind::Identifier {
                self.unexpected_token("identifier", param);
            }
            self.locals
                .push(self.lexer.text_of(param), 0, self.scope_depth);
            arity += 1;
            if self.peek() != TokenKind::RightParen {
                self.consume(TokenKind::Comma);
            }
        }
        self.consume(TokenKind::RightParen);

        // The call protocol carries the argument count in a byte.
        if arity > u8::MAX as u16 {
            self.diags.report_parse(
                name_tok.line,
                name_tok.start,
                name_tok.len,
                "too many arguments in function ",
            );
            self.diags
                .attach_note("a function takes at most 255 arguments");
            self.abandon_function();
            return;
        }
        let arity = arity as u8;
        if arity > 0 {
            self.locals.assign_arg_slots(arity);
        }
        self.local_index = 0;

        if self.peek() != TokenKind::LeftBrace {
            let tok = self.advance();
            self.unexpected_token("{", tok);
            self.abandon_function();
            return;
        }
        self.advance();
        if self.peek() == TokenKind::RightBrace {
            let tok = self.advance();
            self.expected_expression(tok);
            self.abandon_function();
            return;
        }

        // Registered before the body so recursive calls resolve.
        let address = self.chunk.len();
        self.functions.declare(name, address, arity);
        let is_main = name == "main";
        if is_main {
            self.main_addr = Some(address);
        }
        self.emit_at(Op::IpushBp, name_tok.line);

        let errors_before = self.diags.count();
        loop {
            let kind = self.peek();
            if kind == TokenKind::RightBrace || kind == TokenKind::Eof {
                break;
            }
            self.parse_declaration(kind);
            if self.diags.count() > errors_before {
                // The declaration failed and synchronize() skipped to the
                // next function; abandon this one so the top level can pick
                // up there.
                self.abandon_function();
                return;
            }
        }
        self.consume(TokenKind::RightBrace);

        // Arguments are cleaned up by the caller, not the epilogue.
        self.locals.drop_params(self.scope_depth);

        // A fall-through return value, unless the body cannot fall through
        // (its last declaration was a return).
        if !self.return_found {
            self.emit_constant(Op::IntC, Value::Int(0));
            self.emit(Op::StoreRetValue);
        }
        self.end_scope();

        // Explicit returns discard their own locals, so their jumps land
        // past the fall-through cleanup, right on ipop_bp.
        for operand in std::mem::take(&mut self.exit_addrs) {
            self.chunk.patch_jump(operand);
        }
        self.emit(Op::IpopBp);
        self.emit(if is_main { Op::MainRet } else { Op::Ret });
    }

    /// Bail out of a function declaration mid-parse: its scope, parameter
    /// records, and pending return patches must not leak into whatever is
    /// compiled next.
    fn abandon_function(&mut self) {
        self.locals.unwind_to(self.scope_depth);
        self.scope_depth -= 1;
        self.exit_addrs.clear();
    }

    /// Error recovery: drop tokens until the next function or end of file.
    pub(crate) fn synchronize(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Eof | TokenKind::Func => return,
                _ => {
                    self.skip_token();
                }
            }
        }
    }

    // ---- token plumbing -------------------------------------------------

    /// Scan the next token, reporting any scan errors it produced.
    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.lexer.next_token();
        for err in self.lexer.take_errors() {
            self.diags.report_lex(&err);
        }
        tok
    }

    /// Scan the next token without reporting; used while skipping regions
    /// that will be replayed (and reported) later, or discarded entirely.
    pub(crate) fn skip_token(&mut self) -> Token {
        let tok = self.lexer.next_token();
        self.lexer.take_errors();
        tok
    }

    pub(crate) fn peek(&mut self) -> TokenKind {
        self.lexer.peek()
    }

    pub(crate) fn consume(&mut self, kind: TokenKind) {
        let tok = self.advance();
        if tok.kind != kind {
            self.unexpected_token(kind.describe(), tok);
        }
    }

    pub(crate) fn unexpected_token(&mut self, expected: &str, tok: Token) {
        let prefix = format!("expected '{}', found ", expected);
        self.diags.report_parse(tok.line, tok.start, tok.len, &prefix);
    }

    pub(crate) fn expected_expression(&mut self, tok: Token) {
        self.diags
            .report_parse(tok.line, tok.start, tok.len, "expected expression, found ");
    }

    pub(crate) fn undefined_reference(&mut self, tok: Token) {
        self.diags
            .report_parse(tok.line, tok.start, tok.len, "undefined reference to ");
    }

    // ---- emission -------------------------------------------------------

    pub(crate) fn emit(&mut self, op: Op) {
        self.emit_at(op, self.lexer.current().line);
    }

    pub(crate) fn emit_at(&mut self, op: Op, line: u32) {
        self.chunk.write_op(op, line);
    }

    pub(crate) fn emit_u16(&mut self, op: Op, value: u16) {
        self.emit_u16_at(op, value, self.lexer.current().line);
    }

    pub(crate) fn emit_u16_at(&mut self, op: Op, value: u16, line: u32) {
        self.chunk.write_op_u16(op, value, line);
    }

    pub(crate) fn emit_constant(&mut self, op: Op, value: Value<'src>) {
        self.emit_constant_at(op, value, self.lexer.current().line);
    }

    pub(crate) fn emit_constant_at(&mut self, op: Op, value: Value<'src>, line: u32) {
        self.chunk.write_constant(op, value, line);
    }

    pub(crate) fn emit_jump(&mut self, op: Op) -> usize {
        self.chunk.write_jump(op, self.lexer.current().line)
    }

    // ---- scopes ---------------------------------------------------------

    pub(crate) fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Close the current scope: the runtime stack mirrors the local table,
    /// so one `ipop` is owed per local going out of scope. The slot counter
    /// drops by the same amount — a sibling scope's locals reuse the frame
    /// positions this scope just vacated.
    pub(crate) fn end_scope(&mut self) {
        let popped = self.locals.pop_scope(self.scope_depth);
        for _ in 0..popped {
            self.emit(Op::Ipop);
        }
        self.local_index -= popped as i16;
        self.scope_depth -= 1;
    }
}
