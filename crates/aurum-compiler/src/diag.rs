//! Structured compile diagnostics.
//!
//! Every error path (lexical, syntactic, and compile-time semantic)
//! produces a [`Diagnostic`] collected in a [`Diagnostics`] sink, so tests
//! can assert on records instead of scraping stderr.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    /// Offending lexeme. Absent for end-of-input and for lexer errors,
    /// which have no printable token text.
    pub lexeme: Option<String>,
    /// True when the error was reported at end of input.
    pub at_end: bool,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] Error", self.line, self.column)?;
        if self.at_end {
            write!(f, " at end")?;
        } else if let Some(lexeme) = &self.lexeme {
            write!(f, " at '{lexeme}'")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Accumulating diagnostic sink for one compilation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { list: Vec::new() }
    }

    pub fn report(&mut self, diag: Diagnostic) {
        self.list.push(diag);
    }

    pub fn had_error(&self) -> bool {
        !self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.list
    }
}
