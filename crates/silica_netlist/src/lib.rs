//! Atom netlist and molecule store for the Silica packing flow.
//!
//! The packer consumes a flat netlist of primitive [`Atom`]s connected by
//! [`AtomNet`]s, pre-grouped into rigid [`Molecule`]s. The netlist is
//! immutable once loaded; the molecule store's `valid` flags are the only
//! mutable state and are owned by the packer.

#![warn(missing_docs)]

pub mod atom;
pub mod error;
pub mod ids;
pub mod molecule;
pub mod spec;

pub use atom::{Atom, AtomNet, AtomNetlist, AtomPin, AtomPort};
pub use error::NetlistError;
pub use ids::{AtomId, MoleculeId, NetId, PinId};
pub use molecule::{Molecule, MoleculeStore};
pub use spec::{AtomSpec, ConnectionSpec, NetlistSpec};

// Re-exported so downstream crates match pin kinds without a direct
// silica_arch dependency.
pub use silica_arch::PortKind;
