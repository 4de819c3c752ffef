//! Mutable pb instances, pb-stats, and the per-cluster pb arena.
//!
//! Each cluster under construction owns an arena of [`Pb`]s. Children are
//! held by id table (never by pointer); parents are non-owning ids, so the
//! tree has no ownership cycles. The atom ↔ pb mapping is updated in
//! lockstep by [`ClusterState::place_atom`] / [`ClusterState::unplace_atom`]
//! only.

use crate::ids::{ClusterId, PbId};
use serde::{Deserialize, Serialize};
use silica_arch::{Architecture, BlockTypeId, PbGraphNodeId, PbGraphPinId};
use silica_common::{Arena, Ident};
use silica_netlist::{AtomId, MoleculeId, NetId};
use std::collections::HashMap;

/// Sentinel meaning "no mode selected yet".
pub const NO_MODE: usize = usize::MAX;

/// One entry of a cluster's saved intra-cluster routing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PbRouteEntry {
    /// The cluster pin this entry describes.
    pub pin: PbGraphPinId,
    /// The atom net carried by the pin.
    pub net: Option<NetId>,
    /// The in-cluster pin driving this one, if the net is driven inside.
    pub driver_pin: Option<PbGraphPinId>,
    /// In-cluster sink pins fed from this pin.
    pub sinks: Vec<PbGraphPinId>,
}

/// Scoring and bookkeeping state attached to a container pb while its
/// cluster is under construction. Freed when the cluster is finalized.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PbStats {
    /// Committed nets per input pin class.
    pub input_pins_used: Vec<Vec<NetId>>,
    /// Committed nets per output pin class.
    pub output_pins_used: Vec<Vec<NetId>>,
    /// Speculative nets per input pin class, recomputed on every try-pack.
    pub lookahead_input_pins_used: Vec<Vec<NetId>>,
    /// Speculative nets per output pin class.
    pub lookahead_output_pins_used: Vec<Vec<NetId>>,
    /// Candidate queue in ascending-gain order; `None` means "not yet
    /// computed" and triggers a rebuild from the marked atoms.
    pub feasible_blocks: Option<Vec<MoleculeId>>,
    /// Blended total gain per candidate atom.
    pub gain: HashMap<AtomId, f32>,
    /// Timing gain per candidate atom.
    pub timinggain: HashMap<AtomId, f32>,
    /// Connection gain per candidate atom.
    pub connectiongain: HashMap<AtomId, f32>,
    /// Sharing gain per candidate atom.
    pub sharinggain: HashMap<AtomId, f32>,
    /// Hill gain per candidate atom.
    pub hillgain: HashMap<AtomId, f32>,
    /// Pins of each net already inside this pb.
    pub num_pins_of_net_in_pb: HashMap<NetId, u32>,
    /// Atoms with any gain entry, in first-touch order.
    pub marked_atoms: Vec<AtomId>,
    /// Nets touched by this pb, in first-touch order.
    pub marked_nets: Vec<NetId>,
    /// Committed child blocks below this pb.
    pub num_child_blocks_in_pb: u32,
    /// The lightest ignored high-fanout net, explored when the candidate
    /// queue runs dry.
    pub tie_break_high_fanout_net: Option<NetId>,
    /// Whether molecules two hops away may still be explored.
    pub explore_transitive_fanout: bool,
    /// Transitive-fanout candidates, loaded lazily.
    pub transitive_fanout_candidates: Option<Vec<MoleculeId>>,
}

impl PbStats {
    /// Creates stats sized for the given pb-graph node's pin classes.
    pub fn for_node(arch: &Architecture, node: PbGraphNodeId) -> Self {
        let n = &arch.nodes[node];
        Self {
            input_pins_used: vec![Vec::new(); n.input_pin_classes.len()],
            output_pins_used: vec![Vec::new(); n.output_pin_classes.len()],
            lookahead_input_pins_used: vec![Vec::new(); n.input_pin_classes.len()],
            lookahead_output_pins_used: vec![Vec::new(); n.output_pin_classes.len()],
            feasible_blocks: None,
            explore_transitive_fanout: true,
            ..Default::default()
        }
    }
}

/// A mutable instance of a pb-graph node inside a cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pb {
    /// The pb's id within its cluster's arena.
    pub id: PbId,
    /// The pb-graph node this pb instantiates.
    pub graph_node: PbGraphNodeId,
    /// The name, inherited from the first atom placed beneath; `None` while
    /// unoccupied.
    pub name: Option<Ident>,
    /// The selected mode, [`NO_MODE`] until children are opened.
    pub mode: usize,
    /// The parent pb, `None` for the cluster root.
    pub parent: Option<PbId>,
    /// Child pb slots `[child-type][instance]` for the selected mode;
    /// `None` until the pb is opened.
    pub children: Option<Vec<Vec<Option<PbId>>>>,
    /// The atom mapped to this pb (primitives only).
    pub atom: Option<AtomId>,
    /// Construction-time stats; present on containers while the cluster is
    /// open.
    pub stats: Option<PbStats>,
}

impl Pb {
    /// Returns `true` if no atom and no opened children are attached.
    pub fn is_vacant(&self) -> bool {
        self.atom.is_none() && self.children.is_none() && self.name.is_none()
    }
}

/// Two-way atom ↔ (cluster, pb) mapping.
///
/// Only [`ClusterState::place_atom`] and [`ClusterState::unplace_atom`]
/// write to it, keeping both directions consistent.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct AtomLookup {
    atom_cluster: Vec<Option<ClusterId>>,
    atom_pb: Vec<Option<PbId>>,
}

impl AtomLookup {
    /// Creates a lookup for `num_atoms` atoms, all unclustered.
    pub fn new(num_atoms: usize) -> Self {
        Self {
            atom_cluster: vec![None; num_atoms],
            atom_pb: vec![None; num_atoms],
        }
    }

    /// The cluster an atom is committed or tentatively placed in.
    pub fn atom_cluster(&self, atom: AtomId) -> Option<ClusterId> {
        self.atom_cluster[atom.as_raw() as usize]
    }

    /// The pb an atom is placed on, within its cluster's arena.
    pub fn atom_pb(&self, atom: AtomId) -> Option<PbId> {
        self.atom_pb[atom.as_raw() as usize]
    }

    /// Returns `true` if the atom is not in any cluster.
    pub fn is_unclustered(&self, atom: AtomId) -> bool {
        self.atom_cluster[atom.as_raw() as usize].is_none()
    }
}

/// A cluster under construction or finalized: the pb arena plus saved
/// routing and inter-cluster net info.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterState {
    /// This cluster's id (index into the controller's cluster list).
    pub id: ClusterId,
    /// The block type this cluster instantiates.
    pub block_type: BlockTypeId,
    /// The cluster name (`cb.<seed-atom>`).
    pub name: Ident,
    /// The pb arena; ids are stable, reverted pbs become orphans.
    pub pbs: Arena<PbId, Pb>,
    /// The root pb.
    pub root: PbId,
    /// Low-external-fanout nets absorbed by this cluster, recorded at
    /// finalize for transitive-fanout exploration.
    pub nets_in_lb: Vec<NetId>,
    /// Saved intra-cluster routing, recorded at finalize.
    pub route: Vec<PbRouteEntry>,
}

impl ClusterState {
    /// Opens a new cluster of `block_type` with a stats-carrying root pb.
    pub fn open(arch: &Architecture, id: ClusterId, block_type: BlockTypeId, name: Ident) -> Self {
        let root_node = arch.block_types[block_type.as_raw() as usize].root;
        let mut pbs = Arena::new();
        let root = pbs.alloc(Pb {
            id: PbId::from_raw(0),
            graph_node: root_node,
            name: Some(name),
            mode: NO_MODE,
            parent: None,
            children: None,
            atom: None,
            stats: Some(PbStats::for_node(arch, root_node)),
        });
        pbs[root].id = root;
        Self {
            id,
            block_type,
            name,
            pbs,
            root,
            nets_in_lb: Vec::new(),
            route: Vec::new(),
        }
    }

    /// Sets the root pb's mode and drops any children opened for a
    /// previously tried mode.
    pub fn set_root_mode(&mut self, mode: usize) {
        let root = self.root;
        self.pbs[root].mode = mode;
        self.pbs[root].children = None;
    }

    /// Opens a pb's children table for the given mode.
    ///
    /// # Panics
    ///
    /// Panics if the children are already open.
    pub fn open_children(&mut self, arch: &Architecture, pb: PbId, mode: usize) {
        assert!(self.pbs[pb].children.is_none(), "pb children already open");
        let node = self.pbs[pb].graph_node;
        let table: Vec<Vec<Option<PbId>>> = arch.nodes[node].children[mode]
            .iter()
            .map(|instances| vec![None; instances.len()])
            .collect();
        self.pbs[pb].mode = mode;
        self.pbs[pb].children = Some(table);
    }

    /// Gets or lazily creates the child pb for a pb-graph child node.
    ///
    /// The parent must already be opened in the mode containing
    /// `child_node`.
    pub fn get_or_create_child(
        &mut self,
        arch: &Architecture,
        parent: PbId,
        child_node: PbGraphNodeId,
    ) -> PbId {
        let mode = self.pbs[parent].mode;
        let parent_node = self.pbs[parent].graph_node;
        let (type_idx, inst_idx) = child_position(arch, parent_node, mode, child_node);

        if let Some(existing) = self.pbs[parent].children.as_ref().unwrap()[type_idx][inst_idx] {
            return existing;
        }

        let needs_stats = !arch.pb_types[arch.nodes[child_node].pb_type].is_primitive();
        let child = self.pbs.alloc(Pb {
            id: PbId::from_raw(0),
            graph_node: child_node,
            name: None,
            mode: NO_MODE,
            parent: Some(parent),
            children: None,
            atom: None,
            stats: needs_stats.then(|| PbStats::for_node(arch, child_node)),
        });
        self.pbs[child].id = child;
        self.pbs[parent].children.as_mut().unwrap()[type_idx][inst_idx] = Some(child);
        child
    }

    /// Maps an atom onto a primitive pb, updating both mapping directions.
    pub fn place_atom(&mut self, lookup: &mut AtomLookup, atom: AtomId, pb: PbId, name: Ident) {
        debug_assert!(self.pbs[pb].atom.is_none());
        debug_assert!(lookup.atom_pb(atom).is_none());
        self.pbs[pb].atom = Some(atom);
        self.pbs[pb].name = Some(name);
        lookup.atom_cluster[atom.as_raw() as usize] = Some(self.id);
        lookup.atom_pb[atom.as_raw() as usize] = Some(pb);
    }

    /// Removes an atom from its pb, updating both mapping directions.
    /// Returns the pb the atom was on.
    pub fn unplace_atom(&mut self, lookup: &mut AtomLookup, atom: AtomId) -> Option<PbId> {
        let pb = lookup.atom_pb(atom)?;
        self.pbs[pb].atom = None;
        self.pbs[pb].name = None;
        lookup.atom_cluster[atom.as_raw() as usize] = None;
        lookup.atom_pb[atom.as_raw() as usize] = None;
        Some(pb)
    }

    /// Detaches a pb from its parent's child table, orphaning it.
    pub fn detach_pb(&mut self, pb: PbId) {
        let Some(parent) = self.pbs[pb].parent else {
            return;
        };
        if let Some(children) = self.pbs[parent].children.as_mut() {
            for row in children.iter_mut() {
                for slot in row.iter_mut() {
                    if *slot == Some(pb) {
                        *slot = None;
                        return;
                    }
                }
            }
        }
    }

    /// The atom mapped to a pb, if any.
    pub fn pb_atom(&self, pb: PbId) -> Option<AtomId> {
        self.pbs[pb].atom
    }

    /// Iterates the pb chain from `pb` (inclusive) up to the root.
    pub fn ancestors(&self, pb: PbId) -> Vec<PbId> {
        let mut chain = Vec::new();
        let mut cur = Some(pb);
        while let Some(p) = cur {
            chain.push(p);
            cur = self.pbs[p].parent;
        }
        chain
    }

    /// Collects all atoms placed in the subtree under `pb`, in pb-id
    /// creation order.
    pub fn atoms_under(&self, pb: PbId) -> Vec<AtomId> {
        let mut atoms = Vec::new();
        self.collect_atoms(pb, &mut atoms);
        atoms
    }

    fn collect_atoms(&self, pb: PbId, out: &mut Vec<AtomId>) {
        if let Some(atom) = self.pbs[pb].atom {
            out.push(atom);
        }
        if let Some(children) = &self.pbs[pb].children {
            for row in children {
                for slot in row.iter().flatten() {
                    self.collect_atoms(*slot, out);
                }
            }
        }
    }

    /// Drops construction-time stats from every pb (cluster finalized).
    pub fn free_pb_stats(&mut self) {
        for (_, pb) in self.pbs.iter_mut() {
            pb.stats = None;
        }
    }
}

/// Finds `[child-type][instance]` of a child node within its parent's mode.
///
/// # Panics
///
/// Panics if the child is not part of the given mode (caller must check
/// mode consistency first).
pub fn child_position(
    arch: &Architecture,
    parent_node: PbGraphNodeId,
    mode: usize,
    child_node: PbGraphNodeId,
) -> (usize, usize) {
    let mode_children = &arch.nodes[parent_node].children[mode];
    for (type_idx, instances) in mode_children.iter().enumerate() {
        if let Some(inst_idx) = instances.iter().position(|&n| n == child_node) {
            return (type_idx, inst_idx);
        }
    }
    panic!("child node not present in parent's selected mode");
}

/// Returns the mode index of `parent_node` whose children include
/// `child_node`, or `None` if the child belongs to no mode.
pub fn mode_of_child(
    arch: &Architecture,
    parent_node: PbGraphNodeId,
    child_node: PbGraphNodeId,
) -> Option<usize> {
    arch.nodes[parent_node]
        .children
        .iter()
        .position(|mode| mode.iter().any(|insts| insts.contains(&child_node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_arch::ArchSpec;
    use silica_common::Interner;

    fn test_arch(interner: &Interner) -> Architecture {
        let json = r##"{
            "name": "t",
            "models": [
                {"name": "lut4", "ports": [
                    {"name": "in", "kind": "Input", "width": 4},
                    {"name": "out", "kind": "Output", "width": 1}
                ]}
            ],
            "pb_types": [
                {"name": "lut4", "model": "lut4"},
                {"name": "clb", "ports": [
                    {"name": "I", "kind": "Input", "width": 10},
                    {"name": "O", "kind": "Output", "width": 4}
                ], "modes": [
                    {"name": "default", "children": [{"pb_type": "lut4", "num_pb": 4}]}
                ]}
            ],
            "block_types": ["clb"]
        }"##;
        let spec: ArchSpec = serde_json::from_str(json).unwrap();
        spec.expand(interner).unwrap()
    }

    #[test]
    fn open_and_create_children() {
        let interner = Interner::new();
        let arch = test_arch(&interner);
        let mut cluster = ClusterState::open(
            &arch,
            ClusterId::from_raw(0),
            BlockTypeId::from_raw(0),
            interner.get_or_intern("cb.u"),
        );
        cluster.set_root_mode(0);
        let root = cluster.root;
        cluster.open_children(&arch, root, 0);

        let lut_node = arch.primitives(BlockTypeId::from_raw(0))[0];
        let child = cluster.get_or_create_child(&arch, root, lut_node);
        assert_eq!(cluster.pbs[child].parent, Some(root));
        // Same node yields the same pb.
        assert_eq!(cluster.get_or_create_child(&arch, root, lut_node), child);
    }

    #[test]
    fn place_and_unplace_keep_mapping_consistent() {
        let interner = Interner::new();
        let arch = test_arch(&interner);
        let mut cluster = ClusterState::open(
            &arch,
            ClusterId::from_raw(0),
            BlockTypeId::from_raw(0),
            interner.get_or_intern("cb.u"),
        );
        cluster.set_root_mode(0);
        let root = cluster.root;
        cluster.open_children(&arch, root, 0);
        let lut_node = arch.primitives(BlockTypeId::from_raw(0))[0];
        let pb = cluster.get_or_create_child(&arch, root, lut_node);

        let mut lookup = AtomLookup::new(1);
        let atom = AtomId::from_raw(0);
        let name = interner.get_or_intern("u");
        cluster.place_atom(&mut lookup, atom, pb, name);

        assert_eq!(lookup.atom_pb(atom), Some(pb));
        assert_eq!(lookup.atom_cluster(atom), Some(ClusterId::from_raw(0)));
        assert_eq!(cluster.pb_atom(pb), Some(atom));
        assert!(!lookup.is_unclustered(atom));

        let was = cluster.unplace_atom(&mut lookup, atom);
        assert_eq!(was, Some(pb));
        assert!(lookup.is_unclustered(atom));
        assert_eq!(cluster.pb_atom(pb), None);
        assert!(lookup.atom_pb(atom).is_none());
    }

    #[test]
    fn detach_orphans_child() {
        let interner = Interner::new();
        let arch = test_arch(&interner);
        let mut cluster = ClusterState::open(
            &arch,
            ClusterId::from_raw(0),
            BlockTypeId::from_raw(0),
            interner.get_or_intern("cb.u"),
        );
        cluster.set_root_mode(0);
        let root = cluster.root;
        cluster.open_children(&arch, root, 0);
        let lut_node = arch.primitives(BlockTypeId::from_raw(0))[0];
        let child = cluster.get_or_create_child(&arch, root, lut_node);

        cluster.detach_pb(child);
        // Slot is free again; a new pb is created on re-entry.
        let again = cluster.get_or_create_child(&arch, root, lut_node);
        assert_ne!(again, child);
    }

    #[test]
    fn ancestors_chain() {
        let interner = Interner::new();
        let arch = test_arch(&interner);
        let mut cluster = ClusterState::open(
            &arch,
            ClusterId::from_raw(0),
            BlockTypeId::from_raw(0),
            interner.get_or_intern("cb.u"),
        );
        cluster.set_root_mode(0);
        let root = cluster.root;
        cluster.open_children(&arch, root, 0);
        let lut_node = arch.primitives(BlockTypeId::from_raw(0))[0];
        let child = cluster.get_or_create_child(&arch, root, lut_node);

        assert_eq!(cluster.ancestors(child), vec![child, root]);
    }

    #[test]
    fn mode_of_child_found() {
        let interner = Interner::new();
        let arch = test_arch(&interner);
        let root_node = arch.block_types[0].root;
        let lut_node = arch.primitives(BlockTypeId::from_raw(0))[0];
        assert_eq!(mode_of_child(&arch, root_node, lut_node), Some(0));
    }
}
