//! Lexical analysis: on-demand tokens with save/restore lookahead.

pub mod scanner;
pub mod token;

pub use scanner::{Lexer, LexerState};
pub use token::{Token, TokenKind};
