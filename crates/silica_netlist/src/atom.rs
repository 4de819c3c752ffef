//! The immutable atom netlist: primitive blocks, pins and nets.
//!
//! Atoms instantiate architecture models; each atom pin optionally connects
//! to a net. Nets are directed hyperedges with exactly one driver pin.
//! Iteration everywhere is in stable id order, which the packer's
//! determinism contract depends on.

use crate::error::NetlistError;
use crate::ids::{AtomId, NetId, PinId};
use serde::{Deserialize, Serialize};
use silica_arch::{Model, ModelId, PortKind};
use silica_common::{Arena, Ident, Interner};
use std::collections::HashMap;

/// A port instance on an atom, mirroring one port of its model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtomPort {
    /// Port name (same as the model port name).
    pub name: Ident,
    /// Direction/kind of the port's pins.
    pub kind: PortKind,
    /// Pin ids, one per bit.
    pub pins: Vec<PinId>,
}

/// A primitive logic element of the technology-mapped netlist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Atom {
    /// The atom's unique id.
    pub id: AtomId,
    /// The atom's name.
    pub name: Ident,
    /// The model this atom instantiates.
    pub model: ModelId,
    /// Ordered ports, mirroring the model's ports.
    pub ports: Vec<AtomPort>,
}

/// A pin of an atom.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtomPin {
    /// The pin's unique id.
    pub id: PinId,
    /// The owning atom.
    pub atom: AtomId,
    /// Port index within the atom.
    pub port: u32,
    /// Bit index within the port.
    pub bit: u32,
    /// Direction/kind of this pin.
    pub kind: PortKind,
    /// The connected net, if any.
    pub net: Option<NetId>,
}

/// A directed hyperedge: one driver pin, zero or more sink pins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtomNet {
    /// The net's unique id.
    pub id: NetId,
    /// The net's name.
    pub name: Ident,
    /// The driving pin; `None` only while the netlist is under
    /// construction.
    pub driver: Option<PinId>,
    /// Sink pins in connection order.
    pub sinks: Vec<PinId>,
    /// Whether the net is routed on the global network (typically clocks).
    pub is_global: bool,
    /// Whether the net is a clock.
    pub is_clock: bool,
}

/// The atom netlist.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AtomNetlist {
    /// All atoms.
    pub atoms: Arena<AtomId, Atom>,
    /// All pins.
    pub pins: Arena<PinId, AtomPin>,
    /// All nets.
    pub nets: Arena<NetId, AtomNet>,
    /// Atom name to id (rebuilt on deserialization).
    #[serde(skip)]
    atom_by_name: HashMap<Ident, AtomId>,
    /// Per net: how many sinks share the driver's atom (self loops).
    /// Rebuilt by [`rebuild_indices`](Self::rebuild_indices).
    #[serde(skip)]
    self_loops: HashMap<NetId, u32>,
}

impl AtomNetlist {
    /// Creates an empty netlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an atom instantiating `model`, creating its ports and pins.
    pub fn add_atom(&mut self, name: Ident, model: &Model) -> AtomId {
        let id = AtomId::from_raw(self.atoms.len() as u32);
        let mut ports = Vec::new();
        for (port_idx, mp) in model.ports.iter().enumerate() {
            let mut pins = Vec::new();
            for bit in 0..mp.width {
                let pin = self.pins.alloc(AtomPin {
                    id: PinId::from_raw(0),
                    atom: id,
                    port: port_idx as u32,
                    bit,
                    kind: mp.kind,
                    net: None,
                });
                self.pins[pin].id = pin;
                pins.push(pin);
            }
            ports.push(AtomPort {
                name: mp.name,
                kind: mp.kind,
                pins,
            });
        }
        let alloc_id = self.atoms.alloc(Atom {
            id,
            name,
            model: model.id,
            ports,
        });
        debug_assert_eq!(alloc_id, id);
        self.atom_by_name.insert(name, id);
        id
    }

    /// Adds an unconnected net and returns its id.
    pub fn add_net(&mut self, name: Ident) -> NetId {
        let id = self.nets.alloc(AtomNet {
            id: NetId::from_raw(0),
            name,
            driver: None,
            sinks: Vec::new(),
            is_global: false,
            is_clock: false,
        });
        self.nets[id].id = id;
        id
    }

    /// Connects an atom's port pin to a net.
    ///
    /// Output pins become the net's driver; input and clock pins become
    /// sinks. Connecting a second driver is a [`NetlistError`].
    pub fn connect(
        &mut self,
        atom: AtomId,
        port_name: Ident,
        bit: u32,
        net: NetId,
        interner: &Interner,
    ) -> Result<PinId, NetlistError> {
        let port = self.atoms[atom]
            .ports
            .iter()
            .find(|p| p.name == port_name)
            .ok_or_else(|| NetlistError::UnknownPort {
                atom: interner.resolve(self.atoms[atom].name).to_string(),
                port: interner.resolve(port_name).to_string(),
            })?;
        let pin = *port
            .pins
            .get(bit as usize)
            .ok_or_else(|| NetlistError::PinOutOfRange {
                atom: interner.resolve(self.atoms[atom].name).to_string(),
                port: interner.resolve(port_name).to_string(),
                bit,
            })?;

        self.pins[pin].net = Some(net);
        match self.pins[pin].kind {
            PortKind::Output => {
                if self.nets[net].driver.is_some() {
                    return Err(NetlistError::MultipleDrivers {
                        net: interner.resolve(self.nets[net].name).to_string(),
                    });
                }
                self.nets[net].driver = Some(pin);
            }
            PortKind::Input | PortKind::Clock => {
                self.nets[net].sinks.push(pin);
            }
        }
        Ok(pin)
    }

    /// Marks a net as global.
    pub fn set_global(&mut self, net: NetId, global: bool) {
        self.nets[net].is_global = global;
    }

    /// Marks a net as a clock (and global; clocks ride the global network).
    pub fn set_clock(&mut self, net: NetId, clock: bool) {
        self.nets[net].is_clock = clock;
        if clock {
            self.nets[net].is_global = true;
        }
    }

    /// Looks up an atom by name.
    pub fn find_atom(&self, name: Ident) -> Option<AtomId> {
        self.atom_by_name.get(&name).copied()
    }

    /// Returns the atom driving a net, if the net has a driver.
    pub fn net_driver_atom(&self, net: NetId) -> Option<AtomId> {
        self.nets[net].driver.map(|p| self.pins[p].atom)
    }

    /// Iterates an atom's pins of the given kind, in port order.
    pub fn atom_pins_of_kind(
        &self,
        atom: AtomId,
        kind: PortKind,
    ) -> impl Iterator<Item = PinId> + '_ {
        self.atoms[atom]
            .ports
            .iter()
            .filter(move |p| p.kind == kind)
            .flat_map(|p| p.pins.iter().copied())
    }

    /// Iterates all of an atom's pins, in port order.
    pub fn atom_pins(&self, atom: AtomId) -> impl Iterator<Item = PinId> + '_ {
        self.atoms[atom]
            .ports
            .iter()
            .flat_map(|p| p.pins.iter().copied())
    }

    /// Number of connected pins on an atom (inputs + outputs + clocks).
    /// Always at least 1 for atoms participating in gain computation.
    pub fn used_pins(&self, atom: AtomId) -> u32 {
        self.atom_pins(atom)
            .filter(|&p| self.pins[p].net.is_some())
            .count() as u32
    }

    /// Number of used data-input pins whose net is driven from outside the
    /// atom itself.
    pub fn num_ext_inputs_atom(&self, atom: AtomId) -> u32 {
        self.atom_pins_of_kind(atom, PortKind::Input)
            .filter(|&p| {
                self.pins[p]
                    .net
                    .is_some_and(|n| self.net_driver_atom(n) != Some(atom))
            })
            .count() as u32
    }

    /// Returns whether the net's driver atom also appears among its sinks.
    pub fn net_feeds_own_driver(&self, net: NetId) -> bool {
        self.self_loops.get(&net).copied().unwrap_or(0) > 0
    }

    /// The net's pins with the driving pin skipped when the net loops back
    /// to its own driver block, so gain walks count the block once.
    pub fn net_pins_for_gain(&self, net: NetId) -> Vec<PinId> {
        let n = &self.nets[net];
        if self.net_feeds_own_driver(net) {
            n.sinks.clone()
        } else {
            let mut pins = Vec::with_capacity(n.sinks.len() + 1);
            pins.extend(n.driver);
            pins.extend(n.sinks.iter().copied());
            pins
        }
    }

    /// Rebuilds derived indices (name lookup, self-loop counts).
    ///
    /// Must be called after deserialization and after construction is
    /// complete.
    pub fn rebuild_indices(&mut self) {
        self.atom_by_name.clear();
        for (id, atom) in self.atoms.iter() {
            self.atom_by_name.insert(atom.name, id);
        }
        self.self_loops.clear();
        for (id, net) in self.nets.iter() {
            let Some(driver) = net.driver else { continue };
            let driver_atom = self.pins[driver].atom;
            let loops = net
                .sinks
                .iter()
                .filter(|&&s| self.pins[s].atom == driver_atom)
                .count() as u32;
            if loops > 0 {
                self.self_loops.insert(id, loops);
            }
        }
    }

    /// Checks that every connected net has exactly one driver.
    ///
    /// Global nets are exempt: clocks and other globally routed signals may
    /// enter the fabric from outside the atom netlist.
    pub fn validate(&self, interner: &Interner) -> Result<(), NetlistError> {
        for (_, net) in self.nets.iter() {
            if net.driver.is_none() && !net.sinks.is_empty() && !net.is_global {
                return Err(NetlistError::UndrivenNet {
                    net: interner.resolve(net.name).to_string(),
                });
            }
        }
        Ok(())
    }
}
