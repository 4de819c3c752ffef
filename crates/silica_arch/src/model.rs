//! Primitive models: the leaf cell kinds a technology-mapped netlist uses.

use crate::ids::ModelId;
use serde::{Deserialize, Serialize};
use silica_common::Ident;

/// The direction/kind of a port pin.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PortKind {
    /// A data input.
    Input,
    /// A data output.
    Output,
    /// A clock input.
    Clock,
}

impl PortKind {
    /// Returns `true` for [`PortKind::Input`] and [`PortKind::Clock`].
    pub fn is_input_side(self) -> bool {
        matches!(self, PortKind::Input | PortKind::Clock)
    }
}

/// A named, directed port of a primitive model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelPort {
    /// The port name.
    pub name: Ident,
    /// Direction/kind of every pin of this port.
    pub kind: PortKind,
    /// Number of pins in this port.
    pub width: u32,
    /// Optional port-class tag (`"data_in"`, `"address"`, ...). Ports whose
    /// class starts with `data` are exempt from the memory-sibling
    /// equivalence check.
    pub class: Option<String>,
}

impl ModelPort {
    /// Returns `true` if this port belongs to a `data` port class.
    pub fn is_data_class(&self) -> bool {
        self.class
            .as_deref()
            .is_some_and(|c| c.starts_with("data"))
    }
}

/// A primitive model: the template a netlist atom instantiates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Model {
    /// The model's unique id.
    pub id: ModelId,
    /// The model name (e.g. `lut4`, `dff`, `adder`, `memory_slice`).
    pub name: Ident,
    /// Ordered ports of the model.
    pub ports: Vec<ModelPort>,
}

impl Model {
    /// Finds a port by name.
    pub fn find_port(&self, name: Ident) -> Option<(usize, &ModelPort)> {
        self.ports
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
    }

    /// Returns `true` if the model has no clock port (purely combinational).
    pub fn is_combinational(&self) -> bool {
        self.ports.iter().all(|p| p.kind != PortKind::Clock)
    }
}
