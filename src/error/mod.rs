//! Error types.
//!
//! Lex and parse problems are reported additively through
//! [`crate::diagnostics::Diagnostics`]; the enums here carry the structured
//! payload (message, source location) that the reporter renders. Runtime
//! errors abort the VM and surface as a `Result` from [`crate::bytecode::Vm`].

use std::io;
use thiserror::Error;

/// Errors produced while scanning tokens.
///
/// Each variant records the 1-based source line plus the byte span of the
/// offending lexeme so the reporter can excerpt it.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    #[error("unterminated string")]
    UnterminatedString { line: u32, at: usize, len: usize },

    #[error("multibyte character")]
    MultibyteCharacter { line: u32, at: usize, len: usize },

    #[error("unrecognised escape sequence")]
    UnknownEscape { line: u32, at: usize, len: usize },

    #[error("unrecognised token")]
    UnrecognizedToken { line: u32, at: usize, len: usize },

    #[error("empty print argument")]
    EmptyPrintArgument { line: u32, at: usize, len: usize },

    #[error("unterminated print argument")]
    UnterminatedPrintArgument { line: u32, at: usize, len: usize },
}

impl LexError {
    /// (line, start offset, length) of the offending lexeme.
    pub fn location(&self) -> (u32, usize, usize) {
        match *self {
            Self::UnterminatedString { line, at, len }
            | Self::MultibyteCharacter { line, at, len }
            | Self::UnknownEscape { line, at, len }
            | Self::UnrecognizedToken { line, at, len }
            | Self::EmptyPrintArgument { line, at, len }
            | Self::UnterminatedPrintArgument { line, at, len } => (line, at, len),
        }
    }

    /// Follow-up hint printed after the excerpt, if any.
    pub fn note(&self) -> Option<&'static str> {
        match self {
            Self::UnterminatedString { .. } => Some("expected '\"' at the end of the string"),
            Self::EmptyPrintArgument { .. } => Some("expected expression after '{'"),
            Self::UnterminatedPrintArgument { .. } => {
                Some("expected '}' at the end of expression")
            }
            _ => None,
        }
    }
}

/// Errors that abort the VM. The message text is what the interpreter prints
/// under the `[line:N] error:` header.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("both operands have to be <integer> or <double>")]
    ArithmeticOperands { line: u32 },

    #[error("both operands have to be <integer> or <double> or <character>")]
    RelationalOperands { line: u32 },

    #[error("operands have to be of same type")]
    EqualityOperands { line: u32 },

    #[error("operand has to be <integer>")]
    IntOperand { line: u32 },

    #[error("division by zero")]
    DivisionByZero { line: u32 },

    #[error("stack overflow")]
    StackOverflow { line: u32 },

    #[error("stack underflow")]
    StackUnderflow { line: u32 },

    #[error("unknown opcode {opcode}")]
    UnknownOpcode { opcode: u8, line: u32 },

    #[error("could not find main function")]
    MainNotFound,

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Source line the failing instruction was emitted from, when known.
    pub fn line(&self) -> Option<u32> {
        match *self {
            Self::ArithmeticOperands { line }
            | Self::RelationalOperands { line }
            | Self::EqualityOperands { line }
            | Self::IntOperand { line }
            | Self::DivisionByZero { line }
            | Self::StackOverflow { line }
            | Self::StackUnderflow { line }
            | Self::UnknownOpcode { line, .. } => Some(line),
            Self::MainNotFound | Self::Io(_) => None,
        }
    }
}

