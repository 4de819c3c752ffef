//! Diagnostic codes with category prefixes for structured identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
///
/// Each category maps to a single-character prefix used in diagnostic code
/// display (e.g., `P101` for a packing diagnostic, `F203` for a file one).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Packing diagnostics, prefixed with `P`.
    Pack,
    /// Architecture diagnostics, prefixed with `A`.
    Arch,
    /// Netlist diagnostics, prefixed with `N`.
    Netlist,
    /// Flow-file diagnostics (placement, packed netlist), prefixed with `F`.
    File,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Pack => 'P',
            Category::Arch => 'A',
            Category::Netlist => 'N',
            Category::File => 'F',
        }
    }
}

/// A structured diagnostic code combining a category prefix and a number.
///
/// Displayed as the category prefix followed by a zero-padded 3-digit
/// number, e.g., `P101`, `F002`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
