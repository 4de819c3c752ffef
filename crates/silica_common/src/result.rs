//! Common result and error types for the Silica flow.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in Silica), not a
/// user-facing error. User errors are reported through the crate-specific
/// error enums (`ArchError`, `NetlistError`, `PackError`, ...) or through a
/// `DiagnosticSink`.
pub type SilicaResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in Silica, not a user input problem.
///
/// Post-packing invariant violations (an atom without a pb, a pb tree that
/// does not reach a cluster root) surface as these.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
