//! Compile-error reporting.
//!
//! Errors are additive: the compiler keeps going after reporting, so
//! diagnostics are collected in order and flushed to stderr once compilation
//! ends. Two latches track whether anything went wrong in the lex or parse
//! phase; either one prevents the VM from starting.

use std::fmt::Write;

use crate::error::{LexError, RuntimeError};
use crate::source::SourceFile;

/// How many characters of an offending token are shown before truncation.
const EXCERPT_LIMIT: usize = 10;

pub struct Diagnostics<'src> {
    source: &'src SourceFile,
    entries: Vec<String>,
    pub lex_error: bool,
    pub parse_error: bool,
}

impl<'src> Diagnostics<'src> {
    pub fn new(source: &'src SourceFile) -> Self {
        Self {
            source,
            entries: Vec::new(),
            lex_error: false,
            parse_error: false,
        }
    }

    pub fn any(&self) -> bool {
        self.lex_error || self.parse_error
    }

    /// Number of diagnostics reported so far; parsing code compares counts
    /// to tell "this construct just failed" from "the file already had
    /// errors".
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Rendered diagnostics, in reporting order.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn report_lex(&mut self, err: &LexError) {
        self.lex_error = true;
        let (line, at, len) = err.location();
        let mut entry = self.render(line, at, len, &format!("{}: ", err));
        if let Some(note) = err.note() {
            writeln!(entry, "NOTE: {}", note).unwrap();
        }
        self.entries.push(entry);
    }

    /// Report a parse error whose message ends with the offending token,
    /// e.g. `expected '(', found 'x'`.
    pub fn report_parse(&mut self, line: u32, at: usize, len: usize, prefix: &str) {
        self.parse_error = true;
        let entry = self.render(line, at, len, prefix);
        self.entries.push(entry);
    }

    /// Report a parse error with no token excerpt.
    pub fn report_parse_plain(&mut self, line: u32, message: &str) {
        self.parse_error = true;
        let mut entry = format!("[line:{}] error: {}\n", line, message);
        entry.push_str(&self.excerpt(line, self.source.line_start(line)));
        self.entries.push(entry);
    }

    /// Append a `NOTE:` line to the most recent diagnostic.
    pub fn attach_note(&mut self, note: &str) {
        if let Some(entry) = self.entries.last_mut() {
            writeln!(entry, "NOTE: {}", note).unwrap();
        }
    }

    fn render(&self, line: u32, at: usize, len: usize, prefix: &str) -> String {
        let mut entry = format!(
            "[line:{}] error: {}'{}'\n",
            line,
            prefix,
            self.token_excerpt(at, len)
        );
        entry.push_str(&self.excerpt(line, at));
        entry
    }

    /// The source line with a caret under the offending column.
    fn excerpt(&self, line: u32, at: usize) -> String {
        let text = self.source.line(line);
        let col = at
            .saturating_sub(self.source.line_start(line))
            .min(text.len());
        format!("\t{:>4}| {}\n\t{}      ^\n", line, text, " ".repeat(col))
    }

    /// The offending token, control characters escaped, truncated to
    /// [`EXCERPT_LIMIT`] characters with a `...` marker.
    fn token_excerpt(&self, at: usize, len: usize) -> String {
        let bytes = self.source.text().as_bytes();
        if at >= bytes.len() {
            return "(eof)".to_string();
        }
        let len = len.max(1).min(bytes.len() - at);
        let raw = String::from_utf8_lossy(&bytes[at..at + len]);

        let mut out = String::new();
        let mut truncated = false;
        for (i, c) in raw.chars().enumerate() {
            if i >= EXCERPT_LIMIT {
                truncated = true;
                break;
            }
            match c {
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        if truncated {
            out.push_str("...");
        }
        out
    }
}

/// Render a runtime error the way compile errors are rendered: header plus
/// the source line the failing instruction came from.
pub fn render_runtime_error(source: &SourceFile, err: &RuntimeError) -> String {
    match err.line() {
        Some(line) => format!(
            "[line:{}] error: {}\n\t{}| {}\n",
            line,
            err,
            line,
            source.line(line)
        ),
        None => format!("error: {}\n", err),
    }
}
