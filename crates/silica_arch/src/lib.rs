//! FPGA fabric architecture model for the Silica packing flow.
//!
//! This crate provides the read-only architecture view the packer works
//! against: primitive [`Model`]s, hierarchical [`PbType`] templates with
//! modes and replication, the fully expanded [`Architecture`] pb-graph with
//! pin classes and reachability tables, and [`PackPattern`]s with resolved
//! chain-root pins.
//!
//! Architectures are described as an [`ArchSpec`] (JSON or programmatic)
//! and expanded with [`ArchSpec::expand`]:
//!
//! ```ignore
//! let arch = spec.expand(&interner)?;
//! let clb = arch.find_block_type(interner.get_or_intern("clb")).unwrap();
//! assert!(!arch.primitives(clb).is_empty());
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod ids;
pub mod model;
pub mod pb_graph;
pub mod pb_type;

pub use builder::{ArchSpec, ChildSpec, ModeSpec, ModelSpec, PatternSpec, PbTypeSpec, PortSpec};
pub use error::ArchError;
pub use ids::{BlockTypeId, ModelId, PatternId, PbGraphNodeId, PbGraphPinId, PbTypeId};
pub use model::{Model, ModelPort, PortKind};
pub use pb_graph::{Architecture, BlockType, PbGraphNode, PbGraphPin, PinClass, PinClassKind};
pub use pb_type::{Mode, PackPattern, PatternSlot, PbClass, PbPort, PbType, PbTypeChild};
