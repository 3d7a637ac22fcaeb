//! On-demand scanner over the source buffer.
//!
//! Tokens are produced one at a time; there is no token vector. Lookahead
//! works by snapshotting the scanner state ([`Lexer::state`]) and restoring
//! it, which the parser also uses to replay source regions (the `for` step,
//! `print` holes). Scan errors are collected in a side list so a token can
//! carry several of them (a string literal with two bad escapes) and so
//! speculative scans can be rolled back without reporting anything.

use crate::error::LexError;
use crate::lexer::token::{Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    line: u32,
    start: usize,
    token: Token,
    errors: Vec<LexError>,
}

/// A resumable snapshot of the scanner.
#[derive(Debug, Clone, Copy)]
pub struct LexerState {
    pos: usize,
    line: u32,
    start: usize,
    token: Token,
    error_count: usize,
}

fn is_escape_char(c: u8) -> bool {
    matches!(c, b'a' | b'b' | b'n' | b'r' | b't' | b'\\' | b'\'' | b'"')
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            start: 0,
            token: Token::eof(),
            errors: Vec::new(),
        }
    }

    /// The most recently scanned token.
    pub fn current(&self) -> Token {
        self.token
    }

    pub fn text_of(&self, token: Token) -> &'src str {
        &self.source[token.start..token.start + token.len]
    }

    pub fn state(&self) -> LexerState {
        LexerState {
            pos: self.pos,
            line: self.line,
            start: self.start,
            token: self.token,
            error_count: self.errors.len(),
        }
    }

    pub fn restore(&mut self, state: LexerState) {
        self.pos = state.pos;
        self.line = state.line;
        self.start = state.start;
        self.token = state.token;
        self.errors.truncate(state.error_count);
    }

    /// Reposition the cursor for a source replay.
    pub fn set_position(&mut self, pos: usize, line: u32) {
        self.pos = pos;
        self.line = line;
    }

    /// Errors recorded since the last drain. The parser reports these after
    /// each committed scan; rolled-back scans discard theirs in `restore`.
    pub fn take_errors(&mut self) -> Vec<LexError> {
        std::mem::take(&mut self.errors)
    }

    /// Kind of the next token, without consuming it.
    pub fn peek(&mut self) -> TokenKind {
        self.peek_nth(0)
    }

    /// Kind of the token `n` positions ahead (`0` = next).
    pub fn peek_nth(&mut self, n: usize) -> TokenKind {
        let save = self.state();
        let mut kind = TokenKind::Eof;
        for _ in 0..=n {
            kind = self.next_token().kind;
        }
        self.restore(save);
        kind
    }

    /// Consume the next token iff it is of `kind`.
    pub fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.next_token();
            return true;
        }
        false
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.pos;

        let Some(c) = self.eat() else {
            return self.make_token(TokenKind::Eof);
        };

        let kind = match c {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'<' => {
                if self.match_byte(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            b'&' => {
                if self.match_byte(b'&') {
                    TokenKind::AndAnd
                } else {
                    return self.unrecognized();
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    TokenKind::OrOr
                } else {
                    return self.unrecognized();
                }
            }
            b'"' => return self.string_token(),
            b'\'' => return self.char_token(),
            c if c.is_ascii_digit() => return self.number_token(),
            c if c.is_ascii_alphabetic() || c == b'_' => return self.identifier_token(),
            _ => return self.unrecognized(),
        };

        self.make_token(kind)
    }

    fn unrecognized(&mut self) -> Token {
        self.errors.push(LexError::UnrecognizedToken {
            line: self.line,
            at: self.start,
            len: self.pos - self.start,
        });
        self.make_token(TokenKind::Error)
    }

    fn make_token(&mut self, kind: TokenKind) -> Token {
        self.token = Token {
            kind,
            line: self.line,
            start: self.start,
            len: self.pos - self.start,
        };
        self.token
    }

    fn number_token(&mut self) -> Token {
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.eat();
        }
        if self.peek_byte() == Some(b'.') {
            self.eat();
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.eat();
            }
            return self.make_token(TokenKind::Double);
        }
        self.make_token(TokenKind::Integer)
    }

    fn identifier_token(&mut self) -> Token {
        while self
            .peek_byte()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.eat();
        }
        let text = &self.source[self.start..self.pos];
        let mut kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        // One character of lookahead tells variable and function references
        // apart; whitespace before the paren makes it a variable.
        if kind == TokenKind::Identifier && self.peek_byte() == Some(b'(') {
            kind = TokenKind::FuncIdentifier;
        }
        self.make_token(kind)
    }

    fn char_token(&mut self) -> Token {
        let mut kind = TokenKind::Character;
        if self.peek_byte() == Some(b'\\') {
            self.eat();
            match self.peek_byte() {
                Some(c) if is_escape_char(c) => {
                    self.eat();
                }
                Some(_) => {
                    let at = self.pos - 1;
                    self.eat();
                    self.errors.push(LexError::UnknownEscape {
                        line: self.line,
                        at,
                        len: 2,
                    });
                    kind = TokenKind::Error;
                }
                None => {}
            }
        } else if !self.is_eof() {
            self.eat();
        }

        if self.peek_byte() != Some(b'\'') {
            // Multibyte contents; recover by skipping to the next quote.
            while let Some(b) = self.peek_byte() {
                if b == b'\'' {
                    break;
                }
                if self.eat() == Some(b'\n') {
                    self.line += 1;
                }
            }
            self.eat();
            self.errors.push(LexError::MultibyteCharacter {
                line: self.line,
                at: self.start,
                len: self.pos - self.start,
            });
            return self.make_token(TokenKind::Error);
        }

        self.eat();
        self.make_token(kind)
    }

    fn string_token(&mut self) -> Token {
        let str_start = self.start;
        let str_line = self.line;
        let mut kind = TokenKind::String;

        loop {
            let Some(b) = self.peek_byte() else {
                self.errors.push(LexError::UnterminatedString {
                    line: str_line,
                    at: str_start,
                    len: self.pos - str_start,
                });
                return self.make_token(TokenKind::Error);
            };
            match b {
                b'"' => {
                    self.eat();
                    return self.make_token(kind);
                }
                b'\n' => {
                    self.errors.push(LexError::UnterminatedString {
                        line: str_line,
                        at: str_start,
                        len: self.pos - str_start,
                    });
                    self.eat();
                    self.line += 1;
                    return self.make_token(TokenKind::Error);
                }
                b'{' => {
                    // Embedded expression: skip to the matching brace, no
                    // nesting. The parser replays this region later.
                    let brace_at = self.pos;
                    self.eat();
                    self.skip_whitespace();
                    if self.peek_byte() == Some(b'}') {
                        self.eat();
                        self.errors.push(LexError::EmptyPrintArgument {
                            line: self.line,
                            at: brace_at,
                            len: self.pos - brace_at,
                        });
                        continue;
                    }
                    while let Some(c) = self.peek_byte() {
                        if c == b'}' {
                            break;
                        }
                        if self.eat() == Some(b'\n') {
                            self.line += 1;
                        }
                    }
                    if self.is_eof() {
                        self.errors.push(LexError::UnterminatedPrintArgument {
                            line: self.line,
                            at: brace_at,
                            len: self.pos - brace_at,
                        });
                        return self.make_token(TokenKind::Error);
                    }
                }
                b'\\' => {
                    self.eat();
                    match self.peek_byte() {
                        Some(c) if is_escape_char(c) || c == b'{' => {
                            self.eat();
                        }
                        Some(_) => {
                            let at = self.pos - 1;
                            self.eat();
                            self.errors.push(LexError::UnknownEscape {
                                line: self.line,
                                at,
                                len: 2,
                            });
                            kind = TokenKind::Error;
                        }
                        None => {}
                    }
                }
                _ => {
                    self.eat();
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') | Some(0x0b) => {
                    self.eat();
                }
                Some(b'\n') => {
                    self.eat();
                    self.line += 1;
                }
                Some(b'/') if self.peek_next_byte() == Some(b'/') => {
                    while self.peek_byte().is_some_and(|b| b != b'\n') {
                        self.eat();
                    }
                }
                _ => return,
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn eat(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Some(b)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.source.as_bytes().get(self.pos).copied()
    }

    fn peek_next_byte(&self) -> Option<u8> {
        self.source.as_bytes().get(self.pos + 1).copied()
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek_byte() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }
}
