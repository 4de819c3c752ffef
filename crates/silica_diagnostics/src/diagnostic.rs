//! Structured diagnostic messages with severity, codes and file context.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured diagnostic message with optional file/line origin.
///
/// Diagnostics report warnings and notes to the user without aborting the
/// flow. Each diagnostic includes a severity, a code, a message, optional
/// file and line context (for diagnostics raised while reading flow files),
/// and explanatory notes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the type of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// The file this diagnostic originated from, if any.
    pub file: Option<String>,
    /// The 1-based line within `file`, if known.
    pub line: Option<u32>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic with the given code and message.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            file: None,
            line: None,
            notes: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic with the given code and message.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            file: None,
            line: None,
            notes: Vec::new(),
        }
    }

    /// Creates a new note diagnostic with the given code and message.
    pub fn note(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            code,
            message: message.into(),
            file: None,
            line: None,
            notes: Vec::new(),
        }
    }

    /// Attaches a file origin to this diagnostic.
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attaches a line number to this diagnostic.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => {
                write!(f, "{file}:{line}: ")?;
            }
            (Some(file), None) => {
                write!(f, "{file}: ")?;
            }
            _ => {}
        }
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Category;

    #[test]
    fn create_error() {
        let code = DiagnosticCode::new(Category::Pack, 101);
        let diag = Diagnostic::error(code, "no logic block can host molecule");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "no logic block can host molecule");
        assert_eq!(format!("{}", diag.code), "P101");
    }

    #[test]
    fn create_warning_with_context() {
        let code = DiagnosticCode::new(Category::File, 1);
        let diag = Diagnostic::warning(code, "netlist fingerprint mismatch")
            .in_file("top.place")
            .at_line(1)
            .with_note("pass --verify_file_digests to make this fatal");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.file.as_deref(), Some("top.place"));
        assert_eq!(diag.line, Some(1));
        assert_eq!(diag.notes.len(), 1);
    }

    #[test]
    fn display_with_file_and_line() {
        let code = DiagnosticCode::new(Category::File, 2);
        let diag = Diagnostic::error(code, "duplicate grid header")
            .in_file("top.place")
            .at_line(4);
        assert_eq!(
            format!("{diag}"),
            "top.place:4: error[F002]: duplicate grid header"
        );
    }

    #[test]
    fn display_without_context() {
        let code = DiagnosticCode::new(Category::Pack, 3);
        let diag = Diagnostic::note(code, "packing produced no clusters");
        assert_eq!(format!("{diag}"), "note[P003]: packing produced no clusters");
    }

    #[test]
    fn serde_roundtrip() {
        let code = DiagnosticCode::new(Category::Netlist, 5);
        let diag = Diagnostic::warning(code, "unknown mode").in_file("packed.json");
        let json = serde_json::to_string(&diag).unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message, diag.message);
        assert_eq!(back.file, diag.file);
    }
}
