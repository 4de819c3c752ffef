//! Diagnostics for the Silica packing flow.
//!
//! Warnings and notes produced while reading flow files or packing a
//! netlist are reported as structured [`Diagnostic`] values collected in a
//! [`DiagnosticSink`]. Hard failures use the per-crate error enums instead;
//! the sink carries everything that should reach the user without aborting
//! the flow.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
