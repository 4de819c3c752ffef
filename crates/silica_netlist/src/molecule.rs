//! Molecules: rigid atom groups that pack as a unit.
//!
//! The store is built once before clustering (pre-pack) and afterwards only
//! its `valid` flags change: committing an atom invalidates every molecule
//! containing it, rolling back revalidates molecules whose atoms are all
//! free again.

use crate::atom::AtomNetlist;
use crate::ids::{AtomId, MoleculeId, NetId};
use serde::{Deserialize, Serialize};
use silica_arch::{Architecture, PatternId, PbGraphPinId, PortKind};
use silica_common::Arena;
use std::collections::HashSet;

/// A maximal rigid group of atoms that must be packed together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    /// The molecule's unique id.
    pub id: MoleculeId,
    /// The pack pattern that produced this molecule, if any.
    pub pattern: Option<PatternId>,
    /// Whether this molecule is a carry chain.
    pub is_chain: bool,
    /// Ordered atom slots; empty slots are `None`.
    pub atoms: Vec<Option<AtomId>>,
    /// Index of the root slot.
    pub root: usize,
    /// For chains: the dedicated inter-cluster carry input pin.
    pub chain_root_pin: Option<PbGraphPinId>,
    /// Seed-selection affinity.
    pub base_gain: f32,
    /// Distinct input nets driven from outside the molecule.
    pub num_ext_inputs: u32,
    /// Cleared when any member atom is committed to a cluster.
    pub valid: bool,
}

impl Molecule {
    /// Iterates the occupied atom slots.
    pub fn atom_ids(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.atoms.iter().filter_map(|a| *a)
    }

    /// Number of occupied slots.
    pub fn num_atoms(&self) -> usize {
        self.atoms.iter().filter(|a| a.is_some()).count()
    }

    /// The atom in the root slot.
    ///
    /// # Panics
    ///
    /// Panics if the root slot is empty (molecules are never built that
    /// way).
    pub fn root_atom(&self) -> AtomId {
        self.atoms[self.root].expect("molecule root slot is occupied")
    }
}

/// The molecule store: a multimap from atoms to the molecules containing
/// them.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct MoleculeStore {
    /// All molecules.
    pub molecules: Arena<MoleculeId, Molecule>,
    by_atom: Vec<Vec<MoleculeId>>,
}

impl MoleculeStore {
    /// Creates an empty store sized for `num_atoms` atoms.
    pub fn new(num_atoms: usize) -> Self {
        Self {
            molecules: Arena::new(),
            by_atom: vec![Vec::new(); num_atoms],
        }
    }

    /// Pre-packs the netlist: chain molecules along chain patterns,
    /// two-slot pattern molecules, and a singleton molecule per atom not
    /// already forced into a chain.
    pub fn build(netlist: &AtomNetlist, arch: &Architecture) -> Self {
        let mut store = Self::new(netlist.atoms.len());
        let mut in_chain: HashSet<AtomId> = HashSet::new();

        // Carry chains first so that their atoms keep chain placement
        // priority over pattern pairs.
        for pattern in &arch.patterns {
            if !pattern.is_chain {
                continue;
            }
            let (Some(in_port), Some(out_port)) = (pattern.chain_root_port, pattern.chain_out_port)
            else {
                continue;
            };
            let Some(slot_model) = arch.pb_types[pattern.slots[pattern.root].pb_type].model else {
                continue;
            };

            for (atom_id, atom) in netlist.atoms.iter() {
                if atom.model != slot_model || in_chain.contains(&atom_id) {
                    continue;
                }
                // Chain starts: carry input unconnected or driven by a
                // non-chain source.
                if chain_predecessor(netlist, atom_id, slot_model, in_port, out_port).is_some() {
                    continue;
                }
                let mut links = vec![atom_id];
                let mut cur = atom_id;
                while let Some(next) = chain_successor(netlist, cur, slot_model, in_port, out_port)
                {
                    if in_chain.contains(&next) || links.contains(&next) {
                        break;
                    }
                    links.push(next);
                    cur = next;
                }
                for &a in &links {
                    in_chain.insert(a);
                }
                // A chain longer than the fabric can absorb is split into
                // windows; every window keeps the chain-root constraint so
                // spans entering a cluster land on the dedicated carry-in
                // position.
                let capacity = chain_capacity(arch, pattern.slots[pattern.root].pb_type).max(1);
                for window in links.chunks(capacity) {
                    let slots: Vec<Option<AtomId>> = window.iter().copied().map(Some).collect();
                    store.add(
                        slots,
                        0,
                        Some(pattern.id),
                        true,
                        pattern.chain_root_pin,
                        netlist,
                    );
                }
            }
        }

        // Two-slot patterns (e.g. a LUT feeding a FF through a dedicated
        // link).
        for pattern in &arch.patterns {
            if pattern.is_chain || pattern.slots.len() != 2 {
                continue;
            }
            let (Some(m0), Some(m1)) = (
                arch.pb_types[pattern.slots[0].pb_type].model,
                arch.pb_types[pattern.slots[1].pb_type].model,
            ) else {
                continue;
            };
            for (a, atom) in netlist.atoms.iter() {
                if atom.model != m0 {
                    continue;
                }
                let Some(b) = single_fanout_sink(netlist, a, m1) else {
                    continue;
                };
                store.add(
                    vec![Some(a), Some(b)],
                    pattern.root,
                    Some(pattern.id),
                    false,
                    None,
                    netlist,
                );
            }
        }

        // Singleton molecule for every atom not forced into a chain; chain
        // atoms placed individually would silently break carry continuity.
        for (a, _) in netlist.atoms.iter() {
            if in_chain.contains(&a) {
                continue;
            }
            store.add(vec![Some(a)], 0, None, false, None, netlist);
        }

        store
    }

    /// Adds a molecule, computing `num_ext_inputs` and `base_gain`.
    pub fn add(
        &mut self,
        atoms: Vec<Option<AtomId>>,
        root: usize,
        pattern: Option<PatternId>,
        is_chain: bool,
        chain_root_pin: Option<PbGraphPinId>,
        netlist: &AtomNetlist,
    ) -> MoleculeId {
        let members: Vec<AtomId> = atoms.iter().filter_map(|a| *a).collect();
        let num_ext_inputs = num_ext_inputs_of(netlist, &members);
        let base_gain = members.len() as f32 - 0.1 * num_ext_inputs as f32;
        let id = self.molecules.alloc(Molecule {
            id: MoleculeId::from_raw(0),
            pattern,
            is_chain,
            atoms,
            root,
            chain_root_pin,
            base_gain,
            num_ext_inputs,
            valid: true,
        });
        self.molecules[id].id = id;
        for &a in &members {
            self.by_atom[a.as_raw() as usize].push(id);
        }
        id
    }

    /// All molecules containing an atom.
    pub fn molecules_of(&self, atom: AtomId) -> &[MoleculeId] {
        &self.by_atom[atom.as_raw() as usize]
    }

    /// Still-valid molecules containing an atom.
    pub fn valid_molecules_for(&self, atom: AtomId) -> impl Iterator<Item = MoleculeId> + '_ {
        self.by_atom[atom.as_raw() as usize]
            .iter()
            .copied()
            .filter(|&m| self.molecules[m].valid)
    }

    /// Invalidates every molecule containing an atom (the atom was
    /// committed).
    pub fn invalidate_molecules_of(&mut self, atom: AtomId) {
        for &m in &self.by_atom[atom.as_raw() as usize] {
            self.molecules[m].valid = false;
        }
    }

    /// Revalidates molecules of an atom whose members are all unclustered
    /// again (the atom was rolled back).
    pub fn revalidate_molecules_of<F>(&mut self, atom: AtomId, is_unclustered: F)
    where
        F: Fn(AtomId) -> bool,
    {
        for &m in &self.by_atom[atom.as_raw() as usize] {
            if self.molecules[m].valid {
                continue;
            }
            if self.molecules[m].atom_ids().all(&is_unclustered) {
                self.molecules[m].valid = true;
            }
        }
    }

    /// Largest `num_ext_inputs` over all molecules.
    pub fn max_molecule_inputs(&self) -> u32 {
        self.molecules
            .values()
            .map(|m| m.num_ext_inputs)
            .max()
            .unwrap_or(0)
    }

    /// Largest slot count over all molecules.
    pub fn max_molecule_size(&self) -> usize {
        self.molecules
            .values()
            .map(|m| m.atoms.len())
            .max()
            .unwrap_or(1)
    }
}

/// The largest run of same-type chain primitives any block type offers.
fn chain_capacity(arch: &Architecture, slot_type: silica_arch::PbTypeId) -> usize {
    arch.block_types
        .iter()
        .map(|bt| {
            arch.primitives(bt.id)
                .iter()
                .filter(|&&p| arch.nodes[p].pb_type == slot_type)
                .count()
        })
        .max()
        .unwrap_or(0)
}

/// Distinct nets feeding data inputs of `members` from outside the group.
fn num_ext_inputs_of(netlist: &AtomNetlist, members: &[AtomId]) -> u32 {
    let mut ext_nets: HashSet<NetId> = HashSet::new();
    for &a in members {
        for pin in netlist.atom_pins_of_kind(a, PortKind::Input) {
            let Some(net) = netlist.pins[pin].net else {
                continue;
            };
            let driven_inside = netlist
                .net_driver_atom(net)
                .is_some_and(|d| members.contains(&d));
            if !driven_inside {
                ext_nets.insert(net);
            }
        }
    }
    ext_nets.len() as u32
}

/// The chain atom driving `atom`'s carry input, if any.
fn chain_predecessor(
    netlist: &AtomNetlist,
    atom: AtomId,
    slot_model: silica_arch::ModelId,
    in_port: silica_common::Ident,
    out_port: silica_common::Ident,
) -> Option<AtomId> {
    let port = netlist.atoms[atom].ports.iter().find(|p| p.name == in_port)?;
    let pin = *port.pins.first()?;
    let net = netlist.pins[pin].net?;
    let driver = netlist.nets[net].driver?;
    let driver_atom = netlist.pins[driver].atom;
    if netlist.atoms[driver_atom].model != slot_model {
        return None;
    }
    let driver_port = &netlist.atoms[driver_atom].ports[netlist.pins[driver].port as usize];
    (driver_port.name == out_port).then_some(driver_atom)
}

/// The chain atom fed by `atom`'s carry output, if any.
fn chain_successor(
    netlist: &AtomNetlist,
    atom: AtomId,
    slot_model: silica_arch::ModelId,
    in_port: silica_common::Ident,
    out_port: silica_common::Ident,
) -> Option<AtomId> {
    let port = netlist.atoms[atom].ports.iter().find(|p| p.name == out_port)?;
    let pin = *port.pins.first()?;
    let net = netlist.pins[pin].net?;
    for &sink in &netlist.nets[net].sinks {
        let sink_atom = netlist.pins[sink].atom;
        if netlist.atoms[sink_atom].model != slot_model {
            continue;
        }
        let sink_port = &netlist.atoms[sink_atom].ports[netlist.pins[sink].port as usize];
        if sink_port.name == in_port {
            return Some(sink_atom);
        }
    }
    None
}

/// The single sink atom of `atom`'s only-fanout output net, if it has model
/// `sink_model`.
fn single_fanout_sink(
    netlist: &AtomNetlist,
    atom: AtomId,
    sink_model: silica_arch::ModelId,
) -> Option<AtomId> {
    for pin in netlist.atom_pins_of_kind(atom, PortKind::Output) {
        let Some(net) = netlist.pins[pin].net else {
            continue;
        };
        let n = &netlist.nets[net];
        if n.sinks.len() != 1 {
            continue;
        }
        let sink_pin = n.sinks[0];
        if netlist.pins[sink_pin].kind != PortKind::Input {
            continue;
        }
        let sink_atom = netlist.pins[sink_pin].atom;
        if sink_atom != atom && netlist.atoms[sink_atom].model == sink_model {
            return Some(sink_atom);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_common::Interner;

    fn two_lut_netlist(interner: &Interner) -> (AtomNetlist, AtomId, AtomId) {
        use silica_arch::{Model, ModelId, ModelPort};
        let model = Model {
            id: ModelId::from_raw(0),
            name: interner.get_or_intern("lut4"),
            ports: vec![
                ModelPort {
                    name: interner.get_or_intern("in"),
                    kind: PortKind::Input,
                    width: 4,
                    class: None,
                },
                ModelPort {
                    name: interner.get_or_intern("out"),
                    kind: PortKind::Output,
                    width: 1,
                    class: None,
                },
            ],
        };
        let mut nl = AtomNetlist::new();
        let a = nl.add_atom(interner.get_or_intern("a"), &model);
        let b = nl.add_atom(interner.get_or_intern("b"), &model);
        let n = nl.add_net(interner.get_or_intern("n"));
        nl.connect(a, interner.get_or_intern("out"), 0, n, interner)
            .unwrap();
        nl.connect(b, interner.get_or_intern("in"), 0, n, interner)
            .unwrap();
        nl.rebuild_indices();
        (nl, a, b)
    }

    #[test]
    fn manual_molecule_ext_inputs() {
        let interner = Interner::new();
        let (nl, a, b) = two_lut_netlist(&interner);
        let mut store = MoleculeStore::new(nl.atoms.len());

        // Pair molecule absorbs the internal net.
        let pair = store.add(vec![Some(a), Some(b)], 0, None, false, None, &nl);
        assert_eq!(store.molecules[pair].num_ext_inputs, 0);

        // Singleton for b sees one external input.
        let single = store.add(vec![Some(b)], 0, None, false, None, &nl);
        assert_eq!(store.molecules[single].num_ext_inputs, 1);
    }

    #[test]
    fn invalidate_and_revalidate() {
        let interner = Interner::new();
        let (nl, a, b) = two_lut_netlist(&interner);
        let mut store = MoleculeStore::new(nl.atoms.len());
        let pair = store.add(vec![Some(a), Some(b)], 0, None, false, None, &nl);
        let sa = store.add(vec![Some(a)], 0, None, false, None, &nl);

        store.invalidate_molecules_of(a);
        assert!(!store.molecules[pair].valid);
        assert!(!store.molecules[sa].valid);
        assert_eq!(store.valid_molecules_for(a).count(), 0);

        // a becomes free again; everything containing only free atoms
        // revalidates.
        store.revalidate_molecules_of(a, |_| true);
        assert!(store.molecules[pair].valid);
        assert!(store.molecules[sa].valid);
    }

    #[test]
    fn revalidate_respects_still_clustered_members() {
        let interner = Interner::new();
        let (nl, a, b) = two_lut_netlist(&interner);
        let mut store = MoleculeStore::new(nl.atoms.len());
        let pair = store.add(vec![Some(a), Some(b)], 0, None, false, None, &nl);

        store.invalidate_molecules_of(a);
        // b is still clustered: the pair must stay invalid.
        store.revalidate_molecules_of(a, |x| x == a);
        assert!(!store.molecules[pair].valid);
    }

    #[test]
    fn root_atom_and_counts() {
        let interner = Interner::new();
        let (nl, a, b) = two_lut_netlist(&interner);
        let mut store = MoleculeStore::new(nl.atoms.len());
        let m = store.add(vec![Some(a), None, Some(b)], 2, None, false, None, &nl);
        assert_eq!(store.molecules[m].num_atoms(), 2);
        assert_eq!(store.molecules[m].root_atom(), b);
        assert_eq!(store.molecules[m].atom_ids().collect::<Vec<_>>(), vec![a, b]);
    }
}
