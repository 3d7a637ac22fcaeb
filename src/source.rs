//! Source buffer and line bookkeeping.
//!
//! The whole pipeline borrows from one `SourceFile`: tokens, symbol-table
//! names, and string constants are all slices into `text`, so the buffer must
//! outlive compilation and execution.

/// An owned source buffer plus a table of line start offsets.
pub struct SourceFile {
    text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(mut text: String) -> Self {
        // Trailing newlines only pad error excerpts.
        while text.ends_with('\n') {
            text.pop();
        }
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Byte offset where the 1-based line `n` starts.
    pub fn line_start(&self, n: u32) -> usize {
        let idx = (n.max(1) as usize - 1).min(self.line_starts.len() - 1);
        self.line_starts[idx]
    }

    /// Text of the 1-based line `n`, without its newline.
    pub fn line(&self, n: u32) -> &str {
        let start = self.line_start(n);
        let rest = &self.text[start..];
        match rest.find('\n') {
            Some(end) => &rest[..end],
            None => rest,
        }
    }
}
