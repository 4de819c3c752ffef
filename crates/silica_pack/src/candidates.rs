//! Candidate molecule selection for the open cluster.
//!
//! Selection escalates through three sources: strongly connected molecules
//! from the gain-marked atoms, sinks of the remembered high-fanout net, and
//! transitive neighbours two hops away through already-finalized clusters.
//! When all run dry the controller may fall back to an unrelated molecule
//! chosen from the unclustered lists by external input count.

use crate::context::PackerContext;
use crate::lookahead::committed_inputs_used;
use crate::pb::{AtomLookup, ClusterState};
use crate::placement_stats::ClusterPlacementStats;
use crate::{
    MAX_FEASIBLE_BLOCK_ARRAY_SIZE, MAX_HIGH_FANOUT_EXPLORE, MAX_TRANSITIVE_EXPLORE,
    MAX_TRANSITIVE_FANOUT_EXPLORE,
};
use silica_netlist::{AtomId, Molecule, MoleculeId, MoleculeStore, PortKind};
use std::collections::HashMap;

/// Gain of packing a molecule into the current cluster: the sum of member
/// gains, a small base-gain tie break, and a penalty per input a
/// cluster-unrelated member drags in.
pub(crate) fn get_molecule_gain(
    ctx: &PackerContext<'_>,
    gains: &HashMap<AtomId, f32>,
    molecule: &Molecule,
) -> f32 {
    let mut gain = 0.0;
    let mut num_introduced_inputs = 0i32;
    for blk in molecule.atom_ids() {
        if let Some(g) = gains.get(&blk) {
            gain += *g;
        } else {
            // Unrelated member: each external input it pulls in counts
            // against the molecule unless driven inside the molecule.
            for pin in ctx.netlist.atom_pins_of_kind(blk, PortKind::Input) {
                let Some(net) = ctx.netlist.pins[pin].net else {
                    continue;
                };
                num_introduced_inputs += 1;
                if let Some(driver) = ctx.netlist.net_driver_atom(net) {
                    if molecule.atom_ids().any(|m| m == driver) {
                        num_introduced_inputs -= 1;
                    }
                }
            }
        }
    }
    gain += molecule.base_gain * 0.0001;
    gain -= num_introduced_inputs as f32 * 0.001;
    gain
}

/// Inserts a molecule into the bounded ascending-gain candidate queue.
///
/// When the queue is at capacity, the new molecule must strictly beat the
/// lowest-gain incumbent; a tie leaves the queue unchanged.
pub(crate) fn add_molecule_to_candidates(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    molecules: &MoleculeStore,
    molecule: MoleculeId,
    max_queue_size: usize,
) {
    let root = cluster.root;
    let gains = cluster.pbs[root]
        .stats
        .as_ref()
        .expect("root stats present")
        .gain
        .clone();
    let new_gain = get_molecule_gain(ctx, &gains, &molecules.molecules[molecule]);

    let queue = cluster.pbs[root]
        .stats
        .as_mut()
        .unwrap()
        .feasible_blocks
        .get_or_insert_with(Vec::new);

    if queue.contains(&molecule) {
        return;
    }

    if queue.len() >= max_queue_size {
        let min_gain = get_molecule_gain(ctx, &gains, &molecules.molecules[queue[0]]);
        if new_gain <= min_gain {
            return;
        }
        queue.remove(0);
    }
    let pos = queue
        .iter()
        .position(|&m| get_molecule_gain(ctx, &gains, &molecules.molecules[m]) > new_gain)
        .unwrap_or(queue.len());
    queue.insert(pos, molecule);
}

/// Whether every atom of a molecule still has a free compatible primitive.
fn molecule_placeable(
    ctx: &PackerContext<'_>,
    stats: &ClusterPlacementStats,
    molecules: &MoleculeStore,
    molecule: MoleculeId,
) -> bool {
    molecules.molecules[molecule]
        .atom_ids()
        .all(|a| stats.exists_free_primitive_for_atom(ctx.arch, ctx.netlist, a))
}

/// Returns the highest-gain packable molecule for the open cluster, working
/// through the three candidate sources.
pub(crate) fn get_highest_gain_molecule(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    molecules: &MoleculeStore,
    lookup: &AtomLookup,
    stats: &mut ClusterPlacementStats,
    finalized: &[ClusterState],
) -> Option<MoleculeId> {
    let root = cluster.root;

    // 1. Strong neighbours: molecules of gain-marked atoms.
    if cluster.pbs[root].stats.as_ref().unwrap().feasible_blocks.is_none() {
        {
            let s = cluster.pbs[root].stats.as_mut().unwrap();
            s.feasible_blocks = Some(Vec::new());
            s.explore_transitive_fanout = true;
        }
        let marked: Vec<AtomId> = cluster.pbs[root].stats.as_ref().unwrap().marked_atoms.clone();
        for blk in marked {
            if !lookup.is_unclustered(blk) {
                continue;
            }
            let mols: Vec<MoleculeId> = molecules.valid_molecules_for(blk).collect();
            for m in mols {
                if molecule_placeable(ctx, stats, molecules, m) {
                    add_molecule_to_candidates(
                        ctx,
                        cluster,
                        molecules,
                        m,
                        MAX_FEASIBLE_BLOCK_ARRAY_SIZE,
                    );
                }
            }
        }
    }

    // 2. Weak neighbours: sinks of the remembered high-fanout net.
    let queue_empty = cluster.pbs[root]
        .stats
        .as_ref()
        .unwrap()
        .feasible_blocks
        .as_ref()
        .is_some_and(|q| q.is_empty());
    let tie_break = cluster.pbs[root].stats.as_ref().unwrap().tie_break_high_fanout_net;
    if queue_empty {
        if let Some(net) = tie_break {
            stats.reset_tried_but_unused();
            let mut count = 0usize;
            let pins = ctx.netlist.net_pins_for_gain(net);
            for pin in pins {
                if count >= MAX_HIGH_FANOUT_EXPLORE {
                    break;
                }
                let blk = ctx.netlist.pins[pin].atom;
                if !lookup.is_unclustered(blk) {
                    continue;
                }
                let mols: Vec<MoleculeId> = molecules.valid_molecules_for(blk).collect();
                for m in mols {
                    if molecule_placeable(ctx, stats, molecules, m) {
                        add_molecule_to_candidates(
                            ctx,
                            cluster,
                            molecules,
                            m,
                            MAX_FEASIBLE_BLOCK_ARRAY_SIZE.min(MAX_HIGH_FANOUT_EXPLORE),
                        );
                        count += 1;
                    }
                }
            }
            // This high-fanout net has had its chance.
            cluster.pbs[root].stats.as_mut().unwrap().tie_break_high_fanout_net = None;
        }
    }

    // 3. Transitive neighbours, two hops through finalized clusters.
    let queue_empty = cluster.pbs[root]
        .stats
        .as_ref()
        .unwrap()
        .feasible_blocks
        .as_ref()
        .is_some_and(|q| q.is_empty());
    let s = cluster.pbs[root].stats.as_ref().unwrap();
    if queue_empty && s.tie_break_high_fanout_net.is_none() && s.explore_transitive_fanout {
        if cluster.pbs[root].stats.as_ref().unwrap().transitive_fanout_candidates.is_none() {
            load_transitive_fanout_candidates(ctx, cluster, molecules, lookup, finalized);
            let candidates = cluster.pbs[root]
                .stats
                .as_ref()
                .unwrap()
                .transitive_fanout_candidates
                .clone()
                .unwrap_or_default();
            for m in candidates {
                if molecules.molecules[m].valid && molecule_placeable(ctx, stats, molecules, m) {
                    add_molecule_to_candidates(
                        ctx,
                        cluster,
                        molecules,
                        m,
                        MAX_FEASIBLE_BLOCK_ARRAY_SIZE.min(MAX_TRANSITIVE_EXPLORE),
                    );
                }
            }
        } else {
            // Already explored; stop considering transitive fanout.
            let s = cluster.pbs[root].stats.as_mut().unwrap();
            s.transitive_fanout_candidates = None;
            s.explore_transitive_fanout = false;
        }
    }

    // Pop the highest-gain candidate.
    let queue = cluster.pbs[root]
        .stats
        .as_mut()
        .unwrap()
        .feasible_blocks
        .as_mut()
        .unwrap();
    let best = queue.pop();
    if let Some(m) = best {
        debug_assert!(molecules.molecules[m].valid);
    }
    best
}

/// Scores unclustered atoms two hops away and collects their molecules.
fn load_transitive_fanout_candidates(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    molecules: &MoleculeStore,
    lookup: &AtomLookup,
    finalized: &[ClusterState],
) {
    let root = cluster.root;
    let this_cluster = cluster.id;
    let marked_nets: Vec<silica_netlist::NetId> =
        cluster.pbs[root].stats.as_ref().unwrap().marked_nets.clone();

    let mut candidates: Vec<MoleculeId> = Vec::new();
    for net in marked_nets {
        let num_pins = ctx.netlist.nets[net].sinks.len() + 1;
        if num_pins >= MAX_TRANSITIVE_FANOUT_EXPLORE + 1 {
            continue;
        }
        let n = &ctx.netlist.nets[net];
        for pin in n.driver.iter().copied().chain(n.sinks.iter().copied()) {
            let blk = ctx.netlist.pins[pin].atom;
            let Some(tclb) = lookup.atom_cluster(blk) else {
                continue;
            };
            if tclb == this_cluster {
                continue;
            }
            let Some(other) = finalized.iter().find(|c| c.id == tclb) else {
                continue;
            };
            for &tnet in &other.nets_in_lb {
                let tn = &ctx.netlist.nets[tnet];
                for tpin in tn.driver.iter().copied().chain(tn.sinks.iter().copied()) {
                    let tblk = ctx.netlist.pins[tpin].atom;
                    if !lookup.is_unclustered(tblk) {
                        continue;
                    }
                    // Score the transitive atom and queue its molecules.
                    let stats = cluster.pbs[root].stats.as_mut().unwrap();
                    *stats.gain.entry(tblk).or_insert(0.0) += 0.001;
                    for m in molecules.valid_molecules_for(tblk) {
                        if !candidates.contains(&m) {
                            candidates.push(m);
                        }
                    }
                }
            }
        }
    }
    cluster.pbs[root].stats.as_mut().unwrap().transitive_fanout_candidates = Some(candidates);
}

/// Molecules bucketed by external input count, highest base gain first.
///
/// Powers the unrelated-molecule fallback and the max-inputs seed policy.
#[derive(Debug)]
pub(crate) struct UnclusteredLists {
    buckets: Vec<Vec<MoleculeId>>,
}

impl UnclusteredLists {
    /// The number of buckets (`max_molecule_inputs + 1`).
    pub fn head_size(&self) -> usize {
        self.buckets.len()
    }

    /// Builds the buckets from the molecule store.
    pub fn build(molecules: &MoleculeStore) -> Self {
        let max_inputs = molecules.max_molecule_inputs() as usize;
        let mut buckets: Vec<Vec<MoleculeId>> = vec![Vec::new(); max_inputs + 1];
        for (id, m) in molecules.molecules.iter() {
            buckets[m.num_ext_inputs as usize].push(id);
        }
        for bucket in &mut buckets {
            bucket.sort_by(|&a, &b| {
                let ga = molecules.molecules[a].base_gain;
                let gb = molecules.molecules[b].base_gain;
                gb.partial_cmp(&ga)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
        }
        Self { buckets }
    }

    /// First valid, placeable molecule with exactly `ext_inputs` external
    /// inputs.
    pub fn get_molecule_by_num_ext_inputs(
        &self,
        ctx: &PackerContext<'_>,
        molecules: &MoleculeStore,
        stats: &ClusterPlacementStats,
        ext_inputs: usize,
    ) -> Option<MoleculeId> {
        self.buckets.get(ext_inputs)?.iter().copied().find(|&m| {
            molecules.molecules[m].valid && molecule_placeable(ctx, stats, molecules, m)
        })
    }

    /// Unrelated fallback: the placeable molecule with the most external
    /// inputs within the cluster's committed input budget.
    pub fn get_free_molecule_with_most_ext_inputs_for_cluster(
        &self,
        ctx: &PackerContext<'_>,
        cluster: &ClusterState,
        molecules: &MoleculeStore,
        stats: &ClusterPlacementStats,
    ) -> Option<MoleculeId> {
        let mut inputs_avail = committed_inputs_used(cluster, cluster.root);
        if inputs_avail >= self.buckets.len() {
            inputs_avail = self.buckets.len() - 1;
        }
        for ext in (0..=inputs_avail).rev() {
            if let Some(m) = self.get_molecule_by_num_ext_inputs(ctx, molecules, stats, ext) {
                return Some(m);
            }
        }
        None
    }

    /// Seed variant: the first valid molecule scanning buckets from the
    /// most external inputs down, with no placement prefilter.
    pub fn get_seed_molecule_with_most_ext_inputs(
        &self,
        molecules: &MoleculeStore,
    ) -> Option<MoleculeId> {
        for bucket in self.buckets.iter().rev() {
            if let Some(&m) = bucket.iter().find(|&&m| molecules.molecules[m].valid) {
                return Some(m);
            }
        }
        None
    }
}

/// Gain-based candidate, then (optionally, once per dry spell) an unrelated
/// molecule.
#[allow(clippy::too_many_arguments)]
pub(crate) fn get_molecule_for_cluster(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    molecules: &MoleculeStore,
    lookup: &AtomLookup,
    stats: &mut ClusterPlacementStats,
    unclustered: &UnclusteredLists,
    finalized: &[ClusterState],
    num_unrelated_attempts: &mut u32,
) -> Option<MoleculeId> {
    let best = get_highest_gain_molecule(ctx, cluster, molecules, lookup, stats, finalized);

    if ctx.options.allow_unrelated_clustering {
        match best {
            None => {
                if *num_unrelated_attempts == 0 {
                    *num_unrelated_attempts += 1;
                    return unclustered.get_free_molecule_with_most_ext_inputs_for_cluster(
                        ctx, cluster, molecules, stats,
                    );
                }
                return None;
            }
            Some(_) => {
                *num_unrelated_attempts = 0;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn queue_is_bounded_and_ties_rejected() {
        let fx = Fixture::lut_chain(3);
        let (mut cluster, _lookup) = fx.cluster_with_first_atom_placed();
        let ctx = fx.ctx();

        // All molecules have equal (zero-ish) atom gain; fill a size-2
        // queue, then a tying insert must leave it unchanged.
        cluster.pbs[cluster.root]
            .stats
            .as_mut()
            .unwrap()
            .feasible_blocks = Some(Vec::new());
        let mols: Vec<MoleculeId> = fx.molecules.molecules.ids().collect();
        // Pick two singleton molecules of distinct atoms with identical
        // gain profiles.
        let singles: Vec<MoleculeId> = mols
            .iter()
            .copied()
            .filter(|&m| fx.molecules.molecules[m].num_atoms() == 1)
            .collect();
        add_molecule_to_candidates(&ctx, &mut cluster, &fx.molecules, singles[0], 2);
        add_molecule_to_candidates(&ctx, &mut cluster, &fx.molecules, singles[1], 2);
        let before = cluster.pbs[cluster.root]
            .stats
            .as_ref()
            .unwrap()
            .feasible_blocks
            .clone()
            .unwrap();
        assert_eq!(before.len(), 2);

        add_molecule_to_candidates(&ctx, &mut cluster, &fx.molecules, singles[2], 2);
        let after = cluster.pbs[cluster.root]
            .stats
            .as_ref()
            .unwrap()
            .feasible_blocks
            .clone()
            .unwrap();
        // Gains tie, so the queue must be unchanged.
        assert_eq!(before, after);
    }

    #[test]
    fn queue_orders_ascending_and_pops_best() {
        let fx = Fixture::lut_chain(3);
        let (mut cluster, _lookup) = fx.cluster_with_first_atom_placed();
        let ctx = fx.ctx();

        let singles: Vec<MoleculeId> = fx
            .molecules
            .molecules
            .ids()
            .filter(|&m| fx.molecules.molecules[m].num_atoms() == 1)
            .collect();
        // Give atom 2 a strong gain so its singleton outranks the others.
        let favored_atom = fx.atoms[2];
        cluster.pbs[cluster.root]
            .stats
            .as_mut()
            .unwrap()
            .gain
            .insert(favored_atom, 5.0);

        cluster.pbs[cluster.root]
            .stats
            .as_mut()
            .unwrap()
            .feasible_blocks = Some(Vec::new());
        for &m in &singles {
            add_molecule_to_candidates(
                &ctx,
                &mut cluster,
                &fx.molecules,
                m,
                MAX_FEASIBLE_BLOCK_ARRAY_SIZE,
            );
        }
        let queue = cluster.pbs[cluster.root]
            .stats
            .as_ref()
            .unwrap()
            .feasible_blocks
            .clone()
            .unwrap();
        let top = *queue.last().unwrap();
        assert_eq!(fx.molecules.molecules[top].root_atom(), favored_atom);
    }

    #[test]
    fn high_fanout_tie_break_explored_once() {
        use crate::MAX_HIGH_FANOUT_EXPLORE;
        let fx = Fixture::star(12);
        let (mut cluster, lookup) = fx.cluster_with_first_atom_placed();
        let ctx = fx.ctx();
        let mut stats = fx.placement_stats();

        // Strong-neighbour queue is computed and empty; the remembered
        // high-fanout net is the only remaining source.
        {
            let s = cluster.pbs[cluster.root].stats.as_mut().unwrap();
            s.feasible_blocks = Some(Vec::new());
            s.tie_break_high_fanout_net = Some(fx.nets[0]);
        }

        let got = get_highest_gain_molecule(
            &ctx,
            &mut cluster,
            &fx.molecules,
            &lookup,
            &mut stats,
            &[],
        );
        assert!(got.is_some());
        let s = cluster.pbs[cluster.root].stats.as_ref().unwrap();
        // At most MAX_HIGH_FANOUT_EXPLORE sinks were queued, one popped,
        // and the field was cleared after its single use.
        assert_eq!(
            s.feasible_blocks.as_ref().unwrap().len(),
            MAX_HIGH_FANOUT_EXPLORE - 1
        );
        assert_eq!(s.tie_break_high_fanout_net, None);
    }

    #[test]
    fn unclustered_lists_bucket_by_ext_inputs() {
        let fx = Fixture::lut_chain(3);
        let lists = UnclusteredLists::build(&fx.molecules);
        // Chain fixture: singletons have 1 external input except the head
        // (driven by nothing) with 0; pairs/absorbing molecules vary.
        assert!(lists.head_size() >= 2);
        let seed = lists.get_seed_molecule_with_most_ext_inputs(&fx.molecules);
        assert!(seed.is_some());
    }
}
