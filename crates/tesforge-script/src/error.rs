use std::fmt;

use thiserror::Error;

use crate::emit::TooLong;

/// A non-fatal problem found while compiling, tagged with its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// Compilation was abandoned at the first problem.
    #[error("line {line}: {message}")]
    Structural { line: usize, message: String },

    /// Compilation finished but reported problems.
    #[error("script failed to compile with {} error(s):\n{}", .0.len(), list(.0))]
    Diagnostics(Vec<Diagnostic>),
}

impl CompileError {
    /// Every diagnostic carried by the error; a structural error counts as one.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Structural { line, message } => vec![Diagnostic::new(*line, message.clone())],
            Self::Diagnostics(list) => list.clone(),
        }
    }
}

fn list(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Why a single statement could not be compiled.
#[derive(Debug)]
pub(crate) enum Fault {
    /// Record a diagnostic and move on to the next statement.
    Diagnostic(String),
    /// Abort the compile.
    Structural(String),
}

impl From<TooLong> for Fault {
    fn from(err: TooLong) -> Self {
        Self::Diagnostic(err.to_string())
    }
}

pub(crate) type Step<T> = std::result::Result<T, Fault>;

pub(crate) fn diag<T>(message: impl Into<String>) -> Step<T> {
    Err(Fault::Diagnostic(message.into()))
}
