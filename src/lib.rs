//! ncc: a single-pass compiler and bytecode VM for a small imperative
//! scripting language with C-like syntax.
//!
//! The pipeline is source text → [`lexer`] → single-pass [`compiler`] (no
//! AST; bytecode is emitted during parsing) → [`bytecode::Vm`]. Execution
//! starts at the function named `main`.
//!
//! ```
//! use ncc::bytecode::Vm;
//! use ncc::compiler::Compiler;
//! use ncc::source::SourceFile;
//!
//! let source = SourceFile::new("func main() { print(\"2 + 2 = {2 + 2}\\n\"); }".to_string());
//! let result = Compiler::new(&source).compile();
//! assert!(result.ok());
//!
//! let mut out = Vec::new();
//! Vm::new(&result.program, std::io::Cursor::new(String::new()), &mut out)
//!     .run()
//!     .unwrap();
//! assert_eq!(out, b"2 + 2 = 4\n");
//! ```

pub mod bytecode;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod source;
pub mod value;

pub use bytecode::{disassemble, Program, Vm};
pub use compiler::{CompileResult, Compiler};
pub use diagnostics::{render_runtime_error, Diagnostics};
pub use error::{LexError, RuntimeError};
pub use source::SourceFile;
pub use value::Value;
