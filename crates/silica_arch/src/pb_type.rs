//! Pb-type templates: the hierarchical building blocks of the fabric.
//!
//! A pb-type is either a primitive (zero modes, references a model) or a
//! container with one or more modes, each mode listing child pb-types with
//! replication counts. Pack patterns declare which primitive groups must be
//! packed as one molecule.

use crate::ids::{ModelId, PatternId, PbGraphPinId, PbTypeId};
use crate::model::PortKind;
use serde::{Deserialize, Serialize};
use silica_common::Ident;

/// The architectural class of a pb-type.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum PbClass {
    /// No special semantics.
    #[default]
    Default,
    /// A memory-slice container: sibling primitives must agree on every
    /// non-data net.
    Memory,
}

/// A child entry of a mode: a pb-type with a replication count.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PbTypeChild {
    /// The child pb-type.
    pub pb_type: PbTypeId,
    /// How many instances of the child this mode provides.
    pub num_pb: u32,
}

/// One operating mode of a container pb-type.
///
/// Mode-internal interconnect is modelled as a complete crossbar; routing
/// feasibility beyond pin counts is the intra-cluster router's concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mode {
    /// The mode name.
    pub name: Ident,
    /// Ordered children with replication.
    pub children: Vec<PbTypeChild>,
}

/// A boundary port of a pb-type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PbPort {
    /// The port name.
    pub name: Ident,
    /// Direction/kind of the port's pins.
    pub kind: PortKind,
    /// Number of pins.
    pub width: u32,
    /// Optional port-class tag, mirroring the model port class on
    /// primitives.
    pub class: Option<String>,
}

/// A pb-type: the architectural template instantiated by pb-graph nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PbType {
    /// The pb-type's unique id.
    pub id: PbTypeId,
    /// The pb-type name.
    pub name: Ident,
    /// Boundary ports.
    pub ports: Vec<PbPort>,
    /// Modes; empty for primitives.
    pub modes: Vec<Mode>,
    /// The hosted model, present iff this pb-type is a primitive.
    pub model: Option<ModelId>,
    /// Architectural class.
    pub class: PbClass,
}

impl PbType {
    /// Returns `true` if this pb-type is a primitive (has no modes).
    pub fn is_primitive(&self) -> bool {
        self.modes.is_empty()
    }

    /// Finds a mode by name.
    pub fn find_mode(&self, name: Ident) -> Option<usize> {
        self.modes.iter().position(|m| m.name == name)
    }

    /// Finds a boundary port by name.
    pub fn find_port(&self, name: Ident) -> Option<(usize, &PbPort)> {
        self.ports
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
    }
}

/// One slot of a pack pattern: the primitive pb-type the slot must occupy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternSlot {
    /// The primitive pb-type this slot places into.
    pub pb_type: PbTypeId,
}

/// A pack pattern: the interconnect template a molecule embeds.
///
/// Non-chain patterns place all their slots under a single instance of
/// `scope`. Chain patterns place their slots on consecutive placement
/// positions of the slot pb-type, and carry an optional dedicated
/// inter-cluster carry input pin resolved during graph expansion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackPattern {
    /// The pattern's unique id.
    pub id: PatternId,
    /// The pattern name (e.g. `ble`, `carry_chain`).
    pub name: Ident,
    /// Whether this pattern is a carry chain.
    pub is_chain: bool,
    /// Index of the root slot.
    pub root: usize,
    /// The container pb-type all slots must share (non-chain patterns).
    pub scope: PbTypeId,
    /// Ordered slots.
    pub slots: Vec<PatternSlot>,
    /// For chains: the primitive input port carrying the inter-cluster
    /// carry.
    pub chain_root_port: Option<Ident>,
    /// For chains: the primitive output port driving the next link.
    pub chain_out_port: Option<Ident>,
    /// For chains: the pb-graph pin of `chain_root_port` on the dedicated
    /// chain-start position, filled in by graph expansion.
    pub chain_root_pin: Option<PbGraphPinId>,
}
