//! Statement parsing and emission.

use crate::bytecode::opcode::Op;
use crate::compiler::exprs::Resolved;
use crate::compiler::Compiler;
use crate::lexer::TokenKind;
use crate::value::Value;

impl<'src> Compiler<'src> {
    pub(crate) fn parse_statement(&mut self, kind: TokenKind) {
        match kind {
            TokenKind::Print => self.parse_print_statement(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::GetC => self.parse_input_statement(Op::GetC, Op::LocalGetC),
            TokenKind::GetI => self.parse_input_statement(Op::GetI, Op::LocalGetI),
            TokenKind::GetD => self.parse_input_statement(Op::GetD, Op::LocalGetD),
            TokenKind::LeftBrace => self.parse_block_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    /// An expression evaluated for its effect; its value is discarded.
    /// A bare `;` emits nothing.
    fn parse_expression_statement(&mut self) {
        if self.peek() == TokenKind::Semicolon {
            self.advance();
            return;
        }
        self.parse_assignment(0);
        self.consume(TokenKind::Semicolon);
        self.emit(Op::Ipop);
    }

    pub(crate) fn parse_block_statement(&mut self) {
        self.begin_scope();
        self.advance();
        loop {
            let kind = self.peek();
            if kind == TokenKind::RightBrace || kind == TokenKind::Eof {
                break;
            }
            self.parse_declaration(kind);
        }
        self.consume(TokenKind::RightBrace);
        self.end_scope();
    }

    /// `if (e) { … } elif (e) { … } else { … }` — `elif` arms recurse. The
    /// guard value is popped explicitly on both edges of the branch.
    fn parse_if_statement(&mut self) {
        self.advance();
        self.consume(TokenKind::LeftParen);
        self.parse_expression(0);
        self.consume(TokenKind::RightParen);

        let skip_arm = self.emit_jump(Op::Jif);
        self.emit(Op::Ipop);

        if self.peek() != TokenKind::LeftBrace {
            let tok = self.advance();
            self.unexpected_token("{", tok);
            return;
        }
        self.parse_block_statement();
        let past_rest = self.emit_jump(Op::Jump);
        self.chunk.patch_jump(skip_arm);
        self.emit(Op::Ipop);

        if self.peek() == TokenKind::Elif {
            self.parse_if_statement();
        }
        if self.lexer.match_kind(TokenKind::Else) {
            if self.peek() != TokenKind::LeftBrace {
                let tok = self.advance();
                self.unexpected_token("{", tok);
                return;
            }
            self.parse_block_statement();
        }
        self.chunk.patch_jump(past_rest);
    }

    fn parse_while_statement(&mut self) {
        self.advance();
        self.consume(TokenKind::LeftParen);
        let loop_start = self.chunk.len();
        self.parse_expression(0);
        self.consume(TokenKind::RightParen);

        let exit = self.emit_jump(Op::Jif);
        self.emit(Op::Ipop);

        if self.peek() != TokenKind::LeftBrace {
            let tok = self.advance();
            self.unexpected_token("{", tok);
            return;
        }
        self.parse_block_statement();
        self.emit_u16(Op::Jump, loop_start as u16);
        self.chunk.patch_jump(exit);
        self.emit(Op::Ipop);
    }

    /// `for (init? ; cond? ; step?) { body }`.
    ///
    /// The step is emitted *after* the body by replaying the source: the
    /// scanner state is saved at the step's first token, the step tokens are
    /// skipped to reach the body, and once the body has been emitted the
    /// scanner rewinds and parses the step for real.
    fn parse_for_statement(&mut self) {
        self.begin_scope();
        self.advance();
        self.consume(TokenKind::LeftParen);

        let kind = self.peek();
        if kind != TokenKind::Semicolon {
            self.parse_declaration(kind);
        } else {
            self.consume(TokenKind::Semicolon);
        }

        let loop_start = self.chunk.len();
        let mut exit = None;
        if self.peek() != TokenKind::Semicolon {
            self.parse_expression(0);
            exit = Some(self.emit_jump(Op::Jif));
            self.emit(Op::Ipop);
        }
        self.consume(TokenKind::Semicolon);

        let step_state = self.lexer.state();
        let has_step = self.peek() != TokenKind::RightParen;
        if has_step {
            loop {
                let kind = self.peek();
                if kind == TokenKind::RightParen || kind == TokenKind::Eof {
                    break;
                }
                self.skip_token();
            }
        }
        self.consume(TokenKind::RightParen);

        if self.peek() != TokenKind::LeftBrace {
            let tok = self.advance();
            self.unexpected_token("{", tok);
            self.end_scope();
            return;
        }
        self.parse_block_statement();

        if has_step {
            let after_body = self.lexer.state();
            self.lexer.restore(step_state);
            self.parse_assignment(0);
            self.emit(Op::Ipop);
            self.lexer.restore(after_body);
        }
        self.emit_u16(Op::Jump, loop_start as u16);
        if let Some(exit) = exit {
            self.chunk.patch_jump(exit);
            self.emit(Op::Ipop);
        }
        self.end_scope();
    }

    /// `return e? ;` — a bare return yields int 0. The jump to the epilogue
    /// is recorded and patched when the enclosing function closes.
    fn parse_return_statement(&mut self) {
        self.return_found = true;
        self.advance();
        if self.peek() != TokenKind::Semicolon {
            self.parse_assignment(0);
        } else {
            self.emit_constant(Op::IntC, Value::Int(0));
        }
        self.consume(TokenKind::Semicolon);
        self.emit(Op::StoreRetValue);
        // Unwind whatever locals are live on this path; the epilogue's own
        // pops are for the fall-through path only.
        for _ in 0..self.locals.live_body_locals() {
            self.emit(Op::Ipop);
        }
        let exit = self.emit_jump(Op::Jump);
        self.exit_addrs.push(exit);
    }

    /// `getc(x); geti(x); getd(x);` — reads stdin into `x`, picking the
    /// global or frame-local flavor of the opcode.
    fn parse_input_statement(&mut self, global_op: Op, local_op: Op) {
        self.advance();
        self.consume(TokenKind::LeftParen);
        let tok = self.advance();
        if tok.kind != TokenKind::Identifier {
            self.unexpected_token("identifier", tok);
            return;
        }
        let name = self.lexer.text_of(tok);
        self.consume(TokenKind::RightParen);
        self.consume(TokenKind::Semicolon);

        match self.resolve_variable(name) {
            Some(Resolved::Global(slot)) => self.emit_u16_at(global_op, slot, tok.line),
            Some(Resolved::Local(slot)) => self.emit_u16_at(local_op, slot as u16, tok.line),
            None => self.undefined_reference(tok),
        }
    }

    /// `print ( string-literal ) ;` — the literal is split on `{…}` holes:
    /// each literal run becomes a string constant, each hole is replayed
    /// through the expression parser, and one `print n` consumes them all.
    fn parse_print_statement(&mut self) {
        let print_tok = self.advance();
        self.consume(TokenKind::LeftParen);

        let count = if self.peek() == TokenKind::RightParen {
            let tok = self.lexer.current();
            self.expected_expression(tok);
            0
        } else {
            self.parse_print_arguments()
        };

        self.consume(TokenKind::RightParen);
        self.consume(TokenKind::Semicolon);
        self.chunk.write_op(Op::Print, print_tok.line);
        self.chunk.write_byte(count, print_tok.line);
    }

    fn parse_print_arguments(&mut self) -> u8 {
        match self.peek() {
            TokenKind::String => {}
            // A failed string scan; advancing reports the scan error.
            TokenKind::Error => {
                self.advance();
                return 0;
            }
            _ => {
                let tok = self.advance();
                self.unexpected_token("\"", tok);
                return 0;
            }
        }
        let errors_before = self.diags.count();
        let tok = self.advance();
        if self.diags.count() > errors_before {
            // The literal scanned with errors (bad escape, empty hole);
            // don't try to split it.
            return 0;
        }

        let text = self.lexer.text_of(tok);
        let inner = &text[1..text.len() - 1];
        if inner.is_empty() {
            self.emit_constant_at(Op::StringC, Value::Str(""), tok.line);
            return 1;
        }

        // The token's line is where the scan ended; walk lines forward from
        // the start so replayed holes lex with correct numbers.
        let newlines = text.bytes().filter(|&b| b == b'\n').count() as u32;
        let mut line = tok.line - newlines;
        let base = tok.start + 1;
        let bytes = inner.as_bytes();

        let mut count: u8 = 0;
        let mut run_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'\n' => {
                    line += 1;
                    i += 1;
                }
                b'{' => {
                    if i > run_start {
                        self.emit_constant_at(
                            Op::StringC,
                            Value::Str(&inner[run_start..i]),
                            line,
                        );
                        count = count.wrapping_add(1);
                    }

                    let mut end = i + 1;
                    let mut end_line = line;
                    while end < bytes.len() && bytes[end] != b'}' {
                        if bytes[end] == b'\n' {
                            end_line += 1;
                        }
                        end += 1;
                    }

                    // Replay the hole's source region as an expression.
                    let hole_errors = self.diags.count();
                    let resume = self.lexer.state();
                    self.lexer.set_position(base + i + 1, line);
                    self.parse_assignment(0);
                    self.lexer.restore(resume);
                    count = count.wrapping_add(1);
                    if self.diags.count() > hole_errors {
                        return count;
                    }

                    i = end + 1;
                    run_start = i;
                    line = end_line;
                }
                _ => i += 1,
            }
        }
        if run_start < bytes.len() {
            self.emit_constant_at(Op::StringC, Value::Str(&inner[run_start..]), line);
            count = count.wrapping_add(1);
        }
        count
    }
}
