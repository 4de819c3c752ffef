//! Cluster placement stats: which primitive positions are still open.
//!
//! One instance exists per block type. It tracks free versus committed
//! primitives under the currently open cluster, restricts the free set when
//! modes are selected, and enumerates pattern-shaped candidate placements
//! for molecules with a "previously tried" filter. Candidate tuples that
//! reuse already-occupied neighborhoods are preferred, so molecules
//! consolidate; ties break on pb-graph-node id, keeping output
//! deterministic.

use silica_arch::{Architecture, BlockTypeId, PbGraphNodeId};
use silica_netlist::{AtomNetlist, Molecule};
use std::collections::{HashMap, HashSet};

/// Free/committed/tried tracking for one block type.
#[derive(Debug)]
pub struct ClusterPlacementStats {
    /// The block type this instance serves.
    pub block_type: BlockTypeId,
    primitives: Vec<PbGraphNodeId>,
    index_of: HashMap<PbGraphNodeId, usize>,
    all_nodes: Vec<PbGraphNodeId>,
    free: Vec<bool>,
    mode_valid: Vec<bool>,
    tried: HashSet<Vec<PbGraphNodeId>>,
    curr_molecule: Option<silica_netlist::MoleculeId>,
    committed_under: HashMap<PbGraphNodeId, u32>,
}

impl ClusterPlacementStats {
    /// Creates stats for a block type, all primitives free.
    pub fn new(arch: &Architecture, block_type: BlockTypeId) -> Self {
        let primitives = arch.primitives(block_type).to_vec();
        let index_of = primitives
            .iter()
            .enumerate()
            .map(|(i, &p)| (p, i))
            .collect();
        let root = arch.block_types[block_type.as_raw() as usize].root;
        let mut all_nodes = Vec::new();
        collect_nodes(arch, root, &mut all_nodes);
        all_nodes.sort();
        let n = primitives.len();
        Self {
            block_type,
            primitives,
            index_of,
            all_nodes,
            free: vec![true; n],
            mode_valid: vec![true; n],
            tried: HashSet::new(),
            curr_molecule: None,
            committed_under: HashMap::new(),
        }
    }

    /// Reinitializes before opening a new cluster of this type.
    pub fn reset(&mut self) {
        self.free.iter_mut().for_each(|f| *f = true);
        self.mode_valid.iter_mut().for_each(|v| *v = true);
        self.tried.clear();
        self.curr_molecule = None;
        self.committed_under.clear();
    }

    /// Clears only the tried-tuple filter.
    pub fn reset_tried_but_unused(&mut self) {
        self.tried.clear();
    }

    /// Restricts the free set under `node` to children of the selected
    /// mode. Only narrows; [`reset`](Self::reset) restores the full set.
    pub fn set_mode(&mut self, arch: &Architecture, node: PbGraphNodeId, mode: usize) {
        for (i, &prim) in self.primitives.iter().enumerate() {
            if !is_under(arch, prim, node) || prim == node {
                continue;
            }
            let in_mode = arch.nodes[node].children[mode]
                .iter()
                .flat_map(|insts| insts.iter())
                .any(|&child| prim == child || is_under(arch, prim, child));
            if !in_mode {
                self.mode_valid[i] = false;
            }
        }
    }

    /// Moves a primitive from free to committed and locks in the modes on
    /// its ancestor path.
    pub fn commit_primitive(&mut self, arch: &Architecture, prim: PbGraphNodeId) {
        if let Some(&i) = self.index_of.get(&prim) {
            self.free[i] = false;
        }
        let mut child = prim;
        let mut parent = arch.nodes[prim].parent;
        while let Some(p) = parent {
            *self.committed_under.entry(p).or_insert(0) += 1;
            if let Some(mode) = crate::pb::mode_of_child(arch, p, child) {
                self.set_mode(arch, p, mode);
            }
            child = p;
            parent = arch.nodes[p].parent;
        }
    }

    /// Whether a primitive position is currently available.
    pub fn is_available(&self, prim: PbGraphNodeId) -> bool {
        self.index_of
            .get(&prim)
            .is_some_and(|&i| self.free[i] && self.mode_valid[i])
    }

    /// The currently available primitive positions, in id order.
    pub fn free_primitives(&self) -> Vec<PbGraphNodeId> {
        self.primitives
            .iter()
            .enumerate()
            .filter(|&(i, _)| self.free[i] && self.mode_valid[i])
            .map(|(_, &p)| p)
            .collect()
    }

    /// Fast prefilter: does any available primitive match the atom's model?
    pub fn exists_free_primitive_for_atom(
        &self,
        arch: &Architecture,
        netlist: &AtomNetlist,
        atom: silica_netlist::AtomId,
    ) -> bool {
        let model = netlist.atoms[atom].model;
        self.primitives.iter().enumerate().any(|(i, &p)| {
            self.free[i] && self.mode_valid[i] && arch.primitive_model(p) == Some(model)
        })
    }

    /// Returns the next untried placement tuple for a molecule, or `None`
    /// when every combination has been offered since the last
    /// [`reset_tried_but_unused`](Self::reset_tried_but_unused).
    ///
    /// The returned vector parallels the molecule's slots.
    pub fn get_next_primitive_list(
        &mut self,
        arch: &Architecture,
        netlist: &AtomNetlist,
        molecule: &Molecule,
    ) -> Option<Vec<Option<PbGraphNodeId>>> {
        // A new molecule starts a fresh search: placements tried by the
        // previous molecule become available again.
        if self.curr_molecule != Some(molecule.id) {
            self.tried.clear();
            self.curr_molecule = Some(molecule.id);
        }

        let mut candidates = self.enumerate_candidates(arch, netlist, molecule);

        // Prefer tuples that open the fewest untouched ancestors, then
        // lowest node ids.
        candidates.sort_by(|a, b| {
            let ca = self.newly_opened_parents(arch, a);
            let cb = self.newly_opened_parents(arch, b);
            ca.cmp(&cb).then_with(|| a.cmp(b))
        });

        for tuple in candidates {
            if self.tried.contains(&tuple) {
                continue;
            }
            self.tried.insert(tuple.clone());
            // Re-expand into slot-parallel form.
            let mut out = vec![None; molecule.atoms.len()];
            let mut it = tuple.into_iter();
            for (slot, atom) in molecule.atoms.iter().enumerate() {
                if atom.is_some() {
                    out[slot] = Some(it.next().expect("tuple arity matches occupied slots"));
                }
            }
            return Some(out);
        }
        None
    }

    /// Distinct ancestors of the tuple with no committed primitive below.
    fn newly_opened_parents(&self, arch: &Architecture, tuple: &[PbGraphNodeId]) -> usize {
        let mut opened = HashSet::new();
        for &prim in tuple {
            let mut parent = arch.nodes[prim].parent;
            while let Some(p) = parent {
                if self.committed_under.get(&p).copied().unwrap_or(0) == 0 {
                    opened.insert(p);
                }
                parent = arch.nodes[p].parent;
            }
        }
        opened.len()
    }

    /// All shape-respecting tuples of available primitives for a molecule.
    /// Tuples list only the occupied slots, in slot order.
    fn enumerate_candidates(
        &self,
        arch: &Architecture,
        netlist: &AtomNetlist,
        molecule: &Molecule,
    ) -> Vec<Vec<PbGraphNodeId>> {
        let members: Vec<silica_netlist::AtomId> = molecule.atom_ids().collect();
        let pattern = molecule.pattern.map(|p| &arch.patterns[p.as_raw() as usize]);

        if molecule.is_chain {
            return self.enumerate_chain(arch, netlist, &members);
        }

        if members.len() == 1 {
            let model = netlist.atoms[members[0]].model;
            return self
                .primitives
                .iter()
                .enumerate()
                .filter(|&(i, &p)| {
                    self.free[i] && self.mode_valid[i] && arch.primitive_model(p) == Some(model)
                })
                .map(|(_, &p)| vec![p])
                .collect();
        }

        let Some(pattern) = pattern else {
            return Vec::new();
        };

        // Non-chain pattern: all slots inside one instance of the pattern's
        // scope container.
        let mut tuples = Vec::new();
        for &scope in self
            .all_nodes
            .iter()
            .filter(|&&n| arch.nodes[n].pb_type == pattern.scope)
        {
            let mut per_slot: Vec<Vec<PbGraphNodeId>> = Vec::new();
            for (slot_idx, slot) in pattern.slots.iter().enumerate() {
                let Some(&atom) = members.get(slot_idx) else {
                    break;
                };
                let model = netlist.atoms[atom].model;
                let options: Vec<PbGraphNodeId> = self
                    .primitives
                    .iter()
                    .enumerate()
                    .filter(|&(i, &p)| {
                        self.free[i]
                            && self.mode_valid[i]
                            && arch.nodes[p].pb_type == slot.pb_type
                            && arch.primitive_model(p) == Some(model)
                            && is_under(arch, p, scope)
                    })
                    .map(|(_, &p)| p)
                    .collect();
                per_slot.push(options);
            }
            if per_slot.len() != members.len() || per_slot.iter().any(|o| o.is_empty()) {
                continue;
            }
            cartesian_distinct(&per_slot, &mut tuples);
        }
        tuples
    }

    /// Chain tuples: consecutive placement positions of the chain's
    /// primitive type.
    fn enumerate_chain(
        &self,
        arch: &Architecture,
        netlist: &AtomNetlist,
        members: &[silica_netlist::AtomId],
    ) -> Vec<Vec<PbGraphNodeId>> {
        let model = netlist.atoms[members[0]].model;
        let positions: Vec<(usize, PbGraphNodeId)> = self
            .primitives
            .iter()
            .enumerate()
            .filter(|&(_, &p)| arch.primitive_model(p) == Some(model))
            .map(|(i, &p)| (i, p))
            .collect();

        let len = members.len();
        let mut tuples = Vec::new();
        if positions.len() < len {
            return tuples;
        }
        for start in 0..=positions.len() - len {
            let window = &positions[start..start + len];
            if window
                .iter()
                .all(|&(i, _)| self.free[i] && self.mode_valid[i])
            {
                tuples.push(window.iter().map(|&(_, p)| p).collect());
            }
        }
        tuples
    }
}

/// Depth-first collection of every node in a subtree.
fn collect_nodes(arch: &Architecture, node: PbGraphNodeId, out: &mut Vec<PbGraphNodeId>) {
    out.push(node);
    for mode in &arch.nodes[node].children {
        for insts in mode {
            for &child in insts {
                collect_nodes(arch, child, out);
            }
        }
    }
}

/// Whether `anc` lies on `node`'s parent chain (strict).
fn is_under(arch: &Architecture, node: PbGraphNodeId, anc: PbGraphNodeId) -> bool {
    let mut cur = arch.nodes[node].parent;
    while let Some(p) = cur {
        if p == anc {
            return true;
        }
        cur = arch.nodes[p].parent;
    }
    false
}

/// Cartesian product over per-slot options, skipping tuples that reuse a
/// primitive.
fn cartesian_distinct(per_slot: &[Vec<PbGraphNodeId>], out: &mut Vec<Vec<PbGraphNodeId>>) {
    let mut current = Vec::with_capacity(per_slot.len());
    fn rec(
        per_slot: &[Vec<PbGraphNodeId>],
        slot: usize,
        current: &mut Vec<PbGraphNodeId>,
        out: &mut Vec<Vec<PbGraphNodeId>>,
    ) {
        if slot == per_slot.len() {
            out.push(current.clone());
            return;
        }
        for &p in &per_slot[slot] {
            if current.contains(&p) {
                continue;
            }
            current.push(p);
            rec(per_slot, slot + 1, current, out);
            current.pop();
        }
    }
    rec(per_slot, 0, &mut current, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_arch::ArchSpec;
    use silica_common::Interner;
    use silica_netlist::MoleculeStore;

    fn clb_arch(interner: &Interner) -> Architecture {
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

    fn one_lut_netlist(interner: &Interner, arch: &Architecture) -> (AtomNetlist, MoleculeStore) {
        let model_id = arch.find_model(interner.get_or_intern("lut4")).unwrap();
        let model = arch.models[model_id].clone();
        let mut nl = AtomNetlist::new();
        nl.add_atom(interner.get_or_intern("u"), &model);
        nl.rebuild_indices();
        let molecules = MoleculeStore::build(&nl, arch);
        (nl, molecules)
    }

    #[test]
    fn enumerates_free_singletons_until_exhausted() {
        let interner = Interner::new();
        let arch = clb_arch(&interner);
        let (nl, molecules) = one_lut_netlist(&interner, &arch);
        let mol = &molecules.molecules[silica_netlist::MoleculeId::from_raw(0)];

        let mut stats = ClusterPlacementStats::new(&arch, BlockTypeId::from_raw(0));
        let mut seen = Vec::new();
        while let Some(tuple) = stats.get_next_primitive_list(&arch, &nl, mol) {
            seen.push(tuple[0].unwrap());
        }
        // Four lut positions, each offered exactly once.
        assert_eq!(seen.len(), 4);
        let unique: std::collections::HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn reset_tried_reoffers_positions() {
        let interner = Interner::new();
        let arch = clb_arch(&interner);
        let (nl, molecules) = one_lut_netlist(&interner, &arch);
        let mol = &molecules.molecules[silica_netlist::MoleculeId::from_raw(0)];

        let mut stats = ClusterPlacementStats::new(&arch, BlockTypeId::from_raw(0));
        let first = stats.get_next_primitive_list(&arch, &nl, mol).unwrap();
        while stats.get_next_primitive_list(&arch, &nl, mol).is_some() {}
        stats.reset_tried_but_unused();
        let again = stats.get_next_primitive_list(&arch, &nl, mol).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn committed_positions_not_offered() {
        let interner = Interner::new();
        let arch = clb_arch(&interner);
        let (nl, molecules) = one_lut_netlist(&interner, &arch);
        let mol = &molecules.molecules[silica_netlist::MoleculeId::from_raw(0)];

        let mut stats = ClusterPlacementStats::new(&arch, BlockTypeId::from_raw(0));
        let first = stats.get_next_primitive_list(&arch, &nl, mol).unwrap()[0].unwrap();
        stats.commit_primitive(&arch, first);
        stats.reset_tried_but_unused();

        let mut seen = Vec::new();
        while let Some(t) = stats.get_next_primitive_list(&arch, &nl, mol) {
            seen.push(t[0].unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains(&first));
        assert!(!stats.is_available(first));
    }

    #[test]
    fn exists_free_prefilter() {
        let interner = Interner::new();
        let arch = clb_arch(&interner);
        let (nl, _) = one_lut_netlist(&interner, &arch);
        let mut stats = ClusterPlacementStats::new(&arch, BlockTypeId::from_raw(0));
        let atom = silica_netlist::AtomId::from_raw(0);
        assert!(stats.exists_free_primitive_for_atom(&arch, &nl, atom));

        for &p in arch.primitives(BlockTypeId::from_raw(0)) {
            stats.commit_primitive(&arch, p);
        }
        assert!(!stats.exists_free_primitive_for_atom(&arch, &nl, atom));

        stats.reset();
        assert!(stats.exists_free_primitive_for_atom(&arch, &nl, atom));
    }
}
