//! Seed selection: which molecule opens the next cluster.

use crate::candidates::UnclusteredLists;
use crate::context::{PackerContext, SeedPolicy};
use crate::pb::AtomLookup;
use silica_netlist::{AtomId, MoleculeId, MoleculeStore, PortKind};
use std::collections::HashMap;

/// Chooses seed molecules in a policy-defined atom order.
///
/// The selector holds an index into its sorted atom array; requesting the
/// next seed advances past atoms that were clustered in the meantime. The
/// index can be saved and restored so a discarded cluster retries its seed.
pub(crate) struct SeedSelector {
    order: Vec<AtomId>,
    index: usize,
    policy: SeedPolicy,
}

impl SeedSelector {
    /// Builds the seed order for the configured policy.
    pub fn new(ctx: &PackerContext<'_>, molecules: &MoleculeStore) -> Self {
        let policy = if ctx.options.timing_driven {
            ctx.options.seed_policy
        } else {
            // Without timing information only input counts are meaningful.
            SeedPolicy::MaxInputs
        };

        let mut score: HashMap<AtomId, f32> = HashMap::new();
        match policy {
            SeedPolicy::MaxInputs => {
                for (atom, _) in ctx.netlist.atoms.iter() {
                    let best = molecules
                        .molecules_of(atom)
                        .iter()
                        .map(|&m| molecules.molecules[m].num_ext_inputs)
                        .max()
                        .unwrap_or(0);
                    score.insert(atom, best as f32);
                }
            }
            SeedPolicy::Timing => {
                for (atom, _) in ctx.netlist.atoms.iter() {
                    score.insert(atom, block_criticality(ctx, atom));
                }
            }
            SeedPolicy::Blend => {
                let max_inputs = molecules.max_molecule_inputs().max(1) as f32;
                const BLEND_FAC: f32 = 0.5;
                for (atom, _) in ctx.netlist.atoms.iter() {
                    let crit = block_criticality(ctx, atom);
                    let mut best = 0.0f32;
                    for &m in molecules.molecules_of(atom) {
                        let mol = &molecules.molecules[m];
                        let inputs = mol.num_ext_inputs as f32;
                        let blocks = mol.num_atoms() as f32;
                        let mut blend =
                            BLEND_FAC * crit + (1.0 - BLEND_FAC) * (inputs / max_inputs);
                        blend *= 1.0 + 0.2 * (blocks - 1.0);
                        if blend > best {
                            best = blend;
                        }
                    }
                    score.insert(atom, best);
                }
            }
        }

        let mut order: Vec<AtomId> = ctx.netlist.atoms.ids().collect();
        order.sort_by(|a, b| {
            score[b]
                .partial_cmp(&score[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });
        Self {
            order,
            index: 0,
            policy,
        }
    }

    /// The active policy (after the non-timing-driven downgrade).
    pub fn policy(&self) -> SeedPolicy {
        self.policy
    }

    /// The next seed molecule: the highest-base-gain valid molecule of the
    /// next unclustered atom. `None` when every atom is clustered.
    pub fn next_seed(
        &mut self,
        lookup: &AtomLookup,
        molecules: &MoleculeStore,
        unclustered: &UnclusteredLists,
    ) -> Option<MoleculeId> {
        if self.policy == SeedPolicy::MaxInputs {
            // Bucketed path: the valid molecule with the most external
            // inputs, independent of the atom order index.
            return unclustered.get_seed_molecule_with_most_ext_inputs(molecules);
        }
        while self.index < self.order.len() {
            let atom = self.order[self.index];
            self.index += 1;
            if !lookup.is_unclustered(atom) {
                continue;
            }
            let mut best: Option<MoleculeId> = None;
            for m in molecules.valid_molecules_for(atom) {
                best = match best {
                    None => Some(m),
                    Some(b) => {
                        if molecules.molecules[m].base_gain > molecules.molecules[b].base_gain {
                            Some(m)
                        } else {
                            Some(b)
                        }
                    }
                };
            }
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// Saves the current index so a discarded cluster can retry its seed.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Restores a saved index.
    pub fn set_position(&mut self, index: usize) {
        self.index = index;
    }
}

/// Max setup criticality over an atom's data input pins.
fn block_criticality(ctx: &PackerContext<'_>, atom: AtomId) -> f32 {
    let mut crit = 0.0f32;
    for pin in ctx.netlist.atom_pins_of_kind(atom, PortKind::Input) {
        if ctx.netlist.pins[pin].net.is_some() {
            let c = ctx.timing.setup_pin_criticality(pin);
            if c > crit {
                crit = c;
            }
        }
    }
    crit
}
