//! Expression parsing: precedence climbing that emits bytecode directly.

use crate::bytecode::opcode::Op;
use crate::compiler::Compiler;
use crate::lexer::{Token, TokenKind};
use crate::value::{self, Value};

/// Precedence of `kind` as a prefix: 7 for the unary operators, 0 for
/// primaries and expression terminators, -1 for anything that cannot start
/// an expression.
fn unary_precedence(kind: TokenKind) -> i8 {
    use TokenKind::*;
    match kind {
        Plus | Minus | Bang => 7,
        Integer | Double | Character | String | Identifier | FuncIdentifier | True | False
        | Nil | LeftParen | Eof | Semicolon | Comma => 0,
        _ => -1,
    }
}

/// Precedence of `kind` as an infix operator; 0 for expression terminators,
/// -1 for anything that cannot continue an expression.
fn binary_precedence(kind: TokenKind) -> i8 {
    use TokenKind::*;
    match kind {
        Star | Slash | Percent => 6,
        Plus | Minus => 5,
        Less | LessEqual | Greater | GreaterEqual => 4,
        EqualEqual | BangEqual => 3,
        AndAnd => 2,
        OrOr => 1,
        Eof | RightParen | RightBrace | Semicolon | Comma => 0,
        _ => -1,
    }
}

/// Where an identifier resolved: a global slot, or a bp-relative local slot
/// (negative for arguments).
#[derive(Debug, Clone, Copy)]
pub(crate) enum Resolved {
    Global(u16),
    Local(i16),
}

impl<'src> Compiler<'src> {
    /// Precedence-climbing core. The caller's precedence bounds how much of
    /// the operator stream this level may consume.
    pub(crate) fn parse_expression(&mut self, parent: i8) {
        let kind = self.peek();
        let precedence = unary_precedence(kind);
        if precedence == -1 {
            let tok = self.advance();
            if tok.kind != TokenKind::Error {
                self.unexpected_token("; or expression", tok);
            }
            return;
        } else if precedence == 0 || precedence < parent {
            self.parse_primary();
        } else {
            self.unary_expression(precedence);
        }

        loop {
            let kind = self.peek();
            let precedence = binary_precedence(kind);
            if precedence == -1 {
                let tok = self.advance();
                if tok.kind != TokenKind::Error {
                    self.unexpected_token("; or expression", tok);
                }
                return;
            }
            if precedence == 0 || precedence <= parent {
                break;
            }

            match kind {
                // Short-circuit: the jump peeks, so the left value survives
                // as the result when the right side is skipped. The target
                // is the offset just past the operator's own opcode.
                TokenKind::AndAnd => {
                    let jump = self.emit_jump(Op::Jif);
                    self.binary_expression(precedence);
                    self.chunk.patch_jump(jump);
                }
                TokenKind::OrOr => {
                    let jump = self.emit_jump(Op::Jit);
                    self.binary_expression(precedence);
                    self.chunk.patch_jump(jump);
                }
                _ => self.binary_expression(precedence),
            }
        }
    }

    /// `name = expr` assigns (right-associative); anything else falls back
    /// to `parse_expression`. The target is resolved after the value is
    /// emitted; locals shadow globals.
    pub(crate) fn parse_assignment(&mut self, parent: i8) {
        if self.peek() == TokenKind::Identifier && self.lexer.peek_nth(1) == TokenKind::Equal {
            let ident = self.advance();
            let name = self.lexer.text_of(ident);
            self.advance();
            self.parse_assignment(parent);

            match self.resolve_variable(name) {
                Some(Resolved::Global(slot)) => {
                    self.emit_u16_at(Op::SetGlobal, slot, ident.line)
                }
                Some(Resolved::Local(slot)) => {
                    self.emit_u16_at(Op::SetLocal, slot as u16, ident.line)
                }
                None => {
                    self.undefined_reference(ident);
                    loop {
                        match self.peek() {
                            TokenKind::Semicolon
                            | TokenKind::RightParen
                            | TokenKind::RightBrace
                            | TokenKind::Comma
                            | TokenKind::Eof => return,
                            _ => {
                                self.skip_token();
                            }
                        }
                    }
                }
            }
        } else {
            self.parse_expression(parent);
        }
    }

    fn unary_expression(&mut self, precedence: i8) {
        let op_tok = self.advance();
        self.parse_expression(precedence);
        match op_tok.kind {
            TokenKind::Plus => self.emit_at(Op::Positive, op_tok.line),
            TokenKind::Minus => self.emit_at(Op::Neg, op_tok.line),
            TokenKind::Bang => self.emit_at(Op::Inot, op_tok.line),
            _ => {}
        }
    }

    fn binary_expression(&mut self, precedence: i8) {
        let op_tok = self.advance();
        self.parse_expression(precedence);
        let op = match op_tok.kind {
            TokenKind::Plus => Op::Add,
            TokenKind::Minus => Op::Sub,
            TokenKind::Star => Op::Mult,
            TokenKind::Slash => Op::Idiv,
            TokenKind::Percent => Op::Mod,
            TokenKind::Less => Op::Lt,
            TokenKind::LessEqual => Op::Lte,
            TokenKind::Greater => Op::Gt,
            TokenKind::GreaterEqual => Op::Gte,
            TokenKind::EqualEqual => Op::Eq,
            TokenKind::BangEqual => Op::Neq,
            TokenKind::AndAnd => Op::LogicalAnd,
            TokenKind::OrOr => Op::LogicalOr,
            _ => return,
        };
        self.emit_at(op, op_tok.line);
    }

    fn parse_primary(&mut self) {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Integer => {
                let value = value::int_literal(self.lexer.text_of(tok));
                self.emit_constant(Op::IntC, Value::Int(value));
            }
            TokenKind::Double => {
                let (value, precision) = value::double_literal(self.lexer.text_of(tok));
                self.emit_constant(Op::DoubleC, Value::Double { value, precision });
            }
            TokenKind::Character => {
                let text = self.lexer.text_of(tok).as_bytes();
                let c = if text[1] == b'\\' {
                    value::decode_escape(text[2])
                } else {
                    text[1]
                };
                self.emit_constant(Op::CharC, Value::Char(c));
            }
            TokenKind::String => {
                let text = self.lexer.text_of(tok);
                self.emit_constant(Op::StringC, Value::Str(&text[1..text.len() - 1]));
            }
            TokenKind::LeftParen => {
                self.parse_assignment(0);
                self.consume(TokenKind::RightParen);
            }
            TokenKind::Identifier => {
                let name = self.lexer.text_of(tok);
                match self.resolve_variable(name) {
                    Some(Resolved::Global(slot)) => self.emit_u16(Op::GetGlobal, slot),
                    Some(Resolved::Local(slot)) => self.emit_u16(Op::GetLocal, slot as u16),
                    None => self.undefined_reference(tok),
                }
            }
            TokenKind::FuncIdentifier => self.function_call(tok),
            TokenKind::Nil => self.emit(Op::Nil),
            TokenKind::True => self.emit(Op::TrueL),
            TokenKind::False => self.emit(Op::FalseL),
            // Terminators reaching a primary mean a missing operand; the
            // binary loop or the caller reports it.
            TokenKind::Eof | TokenKind::Semicolon | TokenKind::Comma => {}
            _ => {}
        }
    }

    /// A call site `f(e1, …, ek)`: arguments in source order, then the
    /// return address, then the jump into the callee. The caller cleans the
    /// arguments and fetches the return value.
    fn function_call(&mut self, name_tok: Token) {
        let name = self.lexer.text_of(name_tok);
        let Some(info) = self.functions.lookup(name) else {
            self.undefined_reference(name_tok);
            loop {
                match self.peek() {
                    TokenKind::RightParen | TokenKind::Eof => break,
                    _ => {
                        self.skip_token();
                    }
                }
            }
            if self.peek() == TokenKind::RightParen {
                self.skip_token();
            }
            return;
        };

        self.advance();
        let mut count: u8 = 0;
        loop {
            let kind = self.peek();
            if kind == TokenKind::RightParen || kind == TokenKind::Eof {
                break;
            }
            self.parse_expression(0);
            count = count.wrapping_add(1);
            self.lexer.match_kind(TokenKind::Comma);
        }
        self.consume(TokenKind::RightParen);

        if count != info.arity {
            self.diags.report_parse(
                name_tok.line,
                name_tok.start,
                name_tok.len,
                "undefined reference to function: ",
            );
            self.diags.attach_note(&format!(
                "function '{}' expects {} arguments",
                name, info.arity
            ));
            return;
        }

        let ret_operand = self.emit_jump(Op::RetAddr);
        self.emit_u16(Op::Jump, info.address as u16);
        self.chunk.patch_jump(ret_operand);
        for _ in 0..info.arity {
            self.emit(Op::Ipop);
        }
        self.emit(Op::LoadRetValue);
    }

    pub(crate) fn resolve_variable(&self, name: &str) -> Option<Resolved> {
        if let Some(slot) = self.locals.resolve(name) {
            return Some(Resolved::Local(slot));
        }
        self.globals.resolve(name).map(Resolved::Global)
    }
}
