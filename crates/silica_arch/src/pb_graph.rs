//! The expanded pb-graph: every addressable position of the fabric.
//!
//! Expansion instantiates each block type's pb-type tree into
//! [`PbGraphNode`]s and [`PbGraphPin`]s, then derives the tables the packer
//! needs: per-depth parent pin classes, per-depth connectable-input-pin
//! lists for net absorption checks, primitive lists per block type, and
//! model hostability.

use crate::error::ArchError;
use crate::ids::{BlockTypeId, ModelId, PbGraphNodeId, PbGraphPinId, PbTypeId};
use crate::model::{Model, PortKind};
use crate::pb_type::{PackPattern, PbType};
use serde::{Deserialize, Serialize};
use silica_common::{Arena, Ident, Interner};

/// The kind of a pin class.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PinClassKind {
    /// Data input pins of a container.
    DataInput,
    /// Clock pins of a container.
    Clock,
    /// Output pins of a container.
    Output,
}

/// A shared-capacity group of boundary pins of a pb-graph node.
///
/// All non-clock input pins of a container form one class, clock pins a
/// second, output pins a third; capacity is the architectural pin count.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PinClass {
    /// What kind of pins this class groups.
    pub kind: PinClassKind,
    /// Number of physical pins in the class.
    pub capacity: u32,
}

/// A pin of an instantiated pb-graph node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PbGraphPin {
    /// The pin's unique id.
    pub id: PbGraphPinId,
    /// The node this pin belongs to.
    pub node: PbGraphNodeId,
    /// Port index within the node's pb-type.
    pub port: u32,
    /// Bit index within the port.
    pub bit: u32,
    /// Direction/kind of the pin.
    pub kind: PortKind,
    /// For primitive pins: the pin-class index at each ancestor, indexed by
    /// ancestor depth (`0` = block-type root). Input and clock pins index
    /// the ancestor's input classes, output pins its output classes.
    pub parent_pin_class: Vec<u32>,
    /// For primitive output pins: the primitive input pins reachable via a
    /// purely internal path within the ancestor at each depth.
    pub connectable: Vec<Vec<PbGraphPinId>>,
}

/// An instantiated position in the architecture tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PbGraphNode {
    /// The node's unique id.
    pub id: PbGraphNodeId,
    /// The pb-type this node instantiates.
    pub pb_type: PbTypeId,
    /// The parent node, `None` for block-type roots.
    pub parent: Option<PbGraphNodeId>,
    /// Instance index among same-type siblings.
    pub placement_index: u32,
    /// Depth below the block-type root (root = 0).
    pub depth: u32,
    /// Child nodes indexed by `[mode][child-type][instance]`.
    pub children: Vec<Vec<Vec<PbGraphNodeId>>>,
    /// Pin ids per pb-type port, in port order.
    pub port_pins: Vec<Vec<PbGraphPinId>>,
    /// Input-side pin classes (data first, then clock if present).
    pub input_pin_classes: Vec<PinClass>,
    /// Output-side pin classes.
    pub output_pin_classes: Vec<PinClass>,
    /// Total pins in this node's subtree (across all modes).
    pub total_pb_pins: u32,
}

/// A top-level cluster type (CLB, I/O block, memory block, ...).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockType {
    /// The block type's unique id.
    pub id: BlockTypeId,
    /// The block type name.
    pub name: Ident,
    /// The root pb-graph node.
    pub root: PbGraphNodeId,
}

/// The read-only architecture view: models, pb-types, pack patterns and the
/// fully expanded pb-graph with its derived tables.
#[derive(Debug)]
pub struct Architecture {
    /// Primitive models.
    pub models: Arena<ModelId, Model>,
    /// Pb-type templates.
    pub pb_types: Arena<PbTypeId, PbType>,
    /// Pack patterns, with chain-root pins resolved.
    pub patterns: Vec<PackPattern>,
    /// Top-level block types, in declaration order.
    pub block_types: Vec<BlockType>,
    /// All instantiated pb-graph nodes.
    pub nodes: Arena<PbGraphNodeId, PbGraphNode>,
    /// All instantiated pb-graph pins.
    pub pins: Arena<PbGraphPinId, PbGraphPin>,
    pub(crate) model_hostable: Vec<bool>,
    pub(crate) block_type_primitives: Vec<Vec<PbGraphNodeId>>,
}

impl Architecture {
    /// Looks up a model by name.
    pub fn find_model(&self, name: Ident) -> Option<ModelId> {
        self.models.iter().find(|(_, m)| m.name == name).map(|(id, _)| id)
    }

    /// Looks up a pb-type by name.
    pub fn find_pb_type(&self, name: Ident) -> Option<PbTypeId> {
        self.pb_types
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(id, _)| id)
    }

    /// Looks up a block type by name.
    pub fn find_block_type(&self, name: Ident) -> Option<BlockTypeId> {
        self.block_types
            .iter()
            .find(|bt| bt.name == name)
            .map(|bt| bt.id)
    }

    /// Returns whether any block type can host the given model.
    pub fn model_hostable(&self, model: ModelId) -> bool {
        self.model_hostable[model.as_raw() as usize]
    }

    /// Returns the primitive pb-graph nodes of a block type, in id order.
    pub fn primitives(&self, block_type: BlockTypeId) -> &[PbGraphNodeId] {
        &self.block_type_primitives[block_type.as_raw() as usize]
    }

    /// Returns the model hosted by a primitive node, if the node is one.
    pub fn primitive_model(&self, node: PbGraphNodeId) -> Option<ModelId> {
        self.pb_types[self.nodes[node].pb_type].model
    }

    /// Walks up to the block-type root of a node.
    pub fn root_of(&self, mut node: PbGraphNodeId) -> PbGraphNodeId {
        while let Some(parent) = self.nodes[node].parent {
            node = parent;
        }
        node
    }

    /// Returns the ancestor of `node` at the given depth (`0` = root).
    ///
    /// # Panics
    ///
    /// Panics if `depth` exceeds the node's own depth.
    pub fn ancestor_at_depth(&self, mut node: PbGraphNodeId, depth: u32) -> PbGraphNodeId {
        while self.nodes[node].depth > depth {
            node = self.nodes[node].parent.expect("depth accounting broken");
        }
        assert_eq!(self.nodes[node].depth, depth);
        node
    }

    /// Finds the pb-graph pin of a primitive node corresponding to a model
    /// port pin.
    pub fn primitive_pin(
        &self,
        node: PbGraphNodeId,
        port_name: Ident,
        bit: u32,
    ) -> Option<PbGraphPinId> {
        let pb_type = &self.pb_types[self.nodes[node].pb_type];
        let (port_idx, _) = pb_type.find_port(port_name)?;
        self.nodes[node]
            .port_pins
            .get(port_idx)
            .and_then(|pins| pins.get(bit as usize))
            .copied()
    }

    /// Maximum number of primitives containable in one instance of a
    /// pb-type.
    pub fn max_primitives_in_pb_type(&self, pb_type: PbTypeId) -> u32 {
        let t = &self.pb_types[pb_type];
        if t.is_primitive() {
            return 1;
        }
        t.modes
            .iter()
            .map(|m| {
                m.children
                    .iter()
                    .map(|c| c.num_pb * self.max_primitives_in_pb_type(c.pb_type))
                    .sum()
            })
            .max()
            .unwrap_or(0)
    }

    /// Maximum hierarchy depth below (and including) a pb-type.
    pub fn max_depth_of_pb_type(&self, pb_type: PbTypeId) -> u32 {
        let t = &self.pb_types[pb_type];
        if t.is_primitive() {
            return 1;
        }
        1 + t
            .modes
            .iter()
            .flat_map(|m| m.children.iter())
            .map(|c| self.max_depth_of_pb_type(c.pb_type))
            .max()
            .unwrap_or(0)
    }

    /// Finds the pack pattern with the given name.
    pub fn find_pattern(&self, name: Ident) -> Option<&PackPattern> {
        self.patterns.iter().find(|p| p.name == name)
    }
}

/// Expands block-type roots and computes all derived tables.
///
/// Called by the builder once models, pb-types, patterns and block-type
/// roots are registered.
pub(crate) fn expand(
    models: Arena<ModelId, Model>,
    pb_types: Arena<PbTypeId, PbType>,
    mut patterns: Vec<PackPattern>,
    block_type_decls: Vec<(Ident, PbTypeId)>,
    interner: &Interner,
) -> Result<Architecture, ArchError> {
    let mut nodes: Arena<PbGraphNodeId, PbGraphNode> = Arena::new();
    let mut pins: Arena<PbGraphPinId, PbGraphPin> = Arena::new();
    let mut block_types = Vec::new();

    for (i, (name, root_type)) in block_type_decls.iter().enumerate() {
        let root = expand_node(&pb_types, &mut nodes, &mut pins, *root_type, None, 0, 0);
        block_types.push(BlockType {
            id: BlockTypeId::from_raw(i as u32),
            name: *name,
            root,
        });
    }

    // Primitive lists per block type, in id order.
    let mut block_type_primitives = Vec::new();
    for bt in &block_types {
        let mut prims = Vec::new();
        collect_primitives(&pb_types, &nodes, bt.root, &mut prims);
        prims.sort();
        block_type_primitives.push(prims);
    }

    // Model hostability.
    let mut model_hostable = vec![false; models.len()];
    for prims in &block_type_primitives {
        for &p in prims {
            if let Some(model) = pb_types[nodes[p].pb_type].model {
                model_hostable[model.as_raw() as usize] = true;
            }
        }
    }

    // Per-depth parent pin classes and connectable-input tables for
    // primitive pins.
    for (bt_idx, bt) in block_types.iter().enumerate() {
        for &prim in &block_type_primitives[bt_idx] {
            derive_primitive_pin_tables(&pb_types, &mut nodes, &mut pins, prim, bt.root, interner)?;
        }
    }

    // Resolve chain-root pins: the chain port on the first placement
    // position of the chain's primitive type.
    for pattern in &mut patterns {
        if !pattern.is_chain {
            continue;
        }
        let Some(port_name) = pattern.chain_root_port else {
            continue;
        };
        let slot_type = pattern.slots[pattern.root].pb_type;
        let first = block_type_primitives
            .iter()
            .flat_map(|prims| prims.iter())
            .copied()
            .find(|&p| nodes[p].pb_type == slot_type);
        let Some(first) = first else {
            return Err(ArchError::PatternWithoutHost {
                pattern: interner.resolve(pattern.name).to_string(),
            });
        };
        let pb_type = &pb_types[nodes[first].pb_type];
        let (port_idx, _) = pb_type.find_port(port_name).ok_or_else(|| {
            ArchError::UnknownPort {
                pb_type: interner.resolve(pb_type.name).to_string(),
                port: interner.resolve(port_name).to_string(),
            }
        })?;
        pattern.chain_root_pin = Some(nodes[first].port_pins[port_idx][0]);
    }

    Ok(Architecture {
        models,
        pb_types,
        patterns,
        block_types,
        nodes,
        pins,
        model_hostable,
        block_type_primitives,
    })
}

fn expand_node(
    pb_types: &Arena<PbTypeId, PbType>,
    nodes: &mut Arena<PbGraphNodeId, PbGraphNode>,
    pins: &mut Arena<PbGraphPinId, PbGraphPin>,
    pb_type: PbTypeId,
    parent: Option<PbGraphNodeId>,
    placement_index: u32,
    depth: u32,
) -> PbGraphNodeId {
    let t = &pb_types[pb_type];

    let mut data_in = 0;
    let mut clock_in = 0;
    let mut out = 0;
    for port in &t.ports {
        match port.kind {
            PortKind::Input => data_in += port.width,
            PortKind::Clock => clock_in += port.width,
            PortKind::Output => out += port.width,
        }
    }
    let mut input_pin_classes = vec![PinClass {
        kind: PinClassKind::DataInput,
        capacity: data_in,
    }];
    if clock_in > 0 {
        input_pin_classes.push(PinClass {
            kind: PinClassKind::Clock,
            capacity: clock_in,
        });
    }
    let output_pin_classes = vec![PinClass {
        kind: PinClassKind::Output,
        capacity: out,
    }];

    let id = nodes.alloc(PbGraphNode {
        id: PbGraphNodeId::from_raw(0),
        pb_type,
        parent,
        placement_index,
        depth,
        children: Vec::new(),
        port_pins: Vec::new(),
        input_pin_classes,
        output_pin_classes,
        total_pb_pins: 0,
    });
    nodes[id].id = id;

    let mut port_pins = Vec::new();
    let mut own_pins = 0;
    for (port_idx, port) in t.ports.iter().enumerate() {
        let mut bits = Vec::new();
        for bit in 0..port.width {
            let pin = pins.alloc(PbGraphPin {
                id: PbGraphPinId::from_raw(0),
                node: id,
                port: port_idx as u32,
                bit,
                kind: port.kind,
                parent_pin_class: Vec::new(),
                connectable: Vec::new(),
            });
            pins[pin].id = pin;
            bits.push(pin);
            own_pins += 1;
        }
        port_pins.push(bits);
    }
    nodes[id].port_pins = port_pins;

    let mut children = Vec::new();
    let mut subtree_pins = own_pins;
    for mode in &t.modes {
        let mut mode_children = Vec::new();
        for child in &mode.children {
            let mut instances = Vec::new();
            for i in 0..child.num_pb {
                let c = expand_node(pb_types, nodes, pins, child.pb_type, Some(id), i, depth + 1);
                subtree_pins += nodes[c].total_pb_pins;
                instances.push(c);
            }
            mode_children.push(instances);
        }
        children.push(mode_children);
    }
    nodes[id].children = children;
    nodes[id].total_pb_pins = subtree_pins;

    id
}

fn collect_primitives(
    pb_types: &Arena<PbTypeId, PbType>,
    nodes: &Arena<PbGraphNodeId, PbGraphNode>,
    node: PbGraphNodeId,
    out: &mut Vec<PbGraphNodeId>,
) {
    if pb_types[nodes[node].pb_type].is_primitive() {
        out.push(node);
        return;
    }
    for mode in &nodes[node].children {
        for child_type in mode {
            for &child in child_type {
                collect_primitives(pb_types, nodes, child, out);
            }
        }
    }
}

/// Fills `parent_pin_class` and `connectable` for every pin of a primitive.
fn derive_primitive_pin_tables(
    pb_types: &Arena<PbTypeId, PbType>,
    nodes: &mut Arena<PbGraphNodeId, PbGraphNode>,
    pins: &mut Arena<PbGraphPinId, PbGraphPin>,
    prim: PbGraphNodeId,
    _root: PbGraphNodeId,
    interner: &Interner,
) -> Result<(), ArchError> {
    let prim_depth = nodes[prim].depth;

    // Ancestors from root (depth 0) to the primitive's parent.
    let mut ancestors = Vec::with_capacity(prim_depth as usize);
    let mut cur = nodes[prim].parent;
    while let Some(a) = cur {
        ancestors.push(a);
        cur = nodes[a].parent;
    }
    ancestors.reverse();

    let pin_ids: Vec<PbGraphPinId> = nodes[prim]
        .port_pins
        .iter()
        .flat_map(|p| p.iter().copied())
        .collect();

    for pin_id in pin_ids {
        let kind = pins[pin_id].kind;
        let mut classes = Vec::with_capacity(ancestors.len());
        let mut connectable = Vec::with_capacity(ancestors.len());
        for &anc in &ancestors {
            let class = match kind {
                PortKind::Input => 0,
                PortKind::Clock => {
                    let idx = nodes[anc]
                        .input_pin_classes
                        .iter()
                        .position(|c| c.kind == PinClassKind::Clock);
                    match idx {
                        Some(i) => i as u32,
                        None => {
                            let t = &pb_types[nodes[anc].pb_type];
                            return Err(ArchError::NoClockPath {
                                pb_type: interner.resolve(t.name).to_string(),
                            });
                        }
                    }
                }
                PortKind::Output => 0,
            };
            classes.push(class);

            if kind == PortKind::Output {
                // Complete crossbar within each mode: every primitive data
                // input in the ancestor's subtree is reachable.
                let mut prims = Vec::new();
                collect_primitives(pb_types, nodes, anc, &mut prims);
                prims.sort();
                let mut reachable = Vec::new();
                for p in prims {
                    for port in &nodes[p].port_pins {
                        for &q in port {
                            if pins[q].kind == PortKind::Input {
                                reachable.push(q);
                            }
                        }
                    }
                }
                connectable.push(reachable);
            } else {
                connectable.push(Vec::new());
            }
        }
        pins[pin_id].parent_pin_class = classes;
        pins[pin_id].connectable = connectable;
    }

    Ok(())
}
