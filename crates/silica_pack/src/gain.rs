//! Incremental gain scoring of unpacked atoms against the open cluster.
//!
//! Every committed atom marks its incident nets on each pb from its
//! placement up to the cluster root, updating sharing, hill, connection and
//! timing gains for the unclustered atoms those nets touch, then blends the
//! terms into a total gain.

use crate::context::PackerContext;
use crate::lookahead;
use crate::pb::{AtomLookup, ClusterState, PbStats};
use crate::ids::PbId;
use crate::MAX_NET_SINKS_IGNORE;
use silica_netlist::{AtomId, Molecule, NetId};
use silica_arch::PortKind;

/// Whether a marked net contributes gain or only pin bookkeeping.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum GainMode {
    /// Update gains of affected atoms.
    Gain,
    /// Only track pin counts (global clocks).
    NoGain,
}

/// How the marked net relates to the newly clustered atom.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum NetRelation {
    /// The net drives an input (or clock) pin of the clustered atom.
    Input,
    /// The net is driven by the clustered atom.
    Output,
}

fn stats_mut<'a>(cluster: &'a mut ClusterState, pb: PbId) -> &'a mut PbStats {
    cluster.pbs[pb]
        .stats
        .as_mut()
        .expect("container pb carries stats while cluster is open")
}

/// Returns `true` if `pb` lies on `atom`'s placement chain (inclusive).
fn is_atom_in_pb(cluster: &ClusterState, lookup: &AtomLookup, atom: AtomId, pb: PbId) -> bool {
    let Some(mut cur) = lookup.atom_pb(atom) else {
        return false;
    };
    loop {
        if cur == pb {
            return true;
        }
        match cluster.pbs[cur].parent {
            Some(p) => cur = p,
            None => return false,
        }
    }
}

/// Updates all cluster stats after a molecule was successfully packed:
/// resets candidate queues, bumps child counts, marks gains of incident
/// nets, blends totals, and commits the speculative pin usage.
pub(crate) fn update_cluster_stats(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    molecule: &Molecule,
) {
    let global_clocks = ctx.options.global_clocks;
    let root = cluster.root;

    for atom in molecule.atom_ids() {
        let atom_pb = lookup
            .atom_pb(atom)
            .expect("packed atom is mapped to a pb");
        let chain = cluster.ancestors(atom_pb);
        for &pb in &chain[1..] {
            let stats = stats_mut(cluster, pb);
            stats.feasible_blocks = None;
            stats.num_child_blocks_in_pb += 1;
        }

        // Outputs first.
        for pin in ctx.netlist.atom_pins_of_kind(atom, PortKind::Output) {
            let Some(net) = ctx.netlist.pins[pin].net else {
                continue;
            };
            let flag = if !ctx.netlist.nets[net].is_clock || !global_clocks {
                GainMode::Gain
            } else {
                GainMode::NoGain
            };
            mark_and_update_partial_gain(ctx, cluster, lookup, net, flag, atom, NetRelation::Output);
        }

        // Then inputs.
        for pin in ctx.netlist.atom_pins_of_kind(atom, PortKind::Input) {
            let Some(net) = ctx.netlist.pins[pin].net else {
                continue;
            };
            mark_and_update_partial_gain(
                ctx,
                cluster,
                lookup,
                net,
                GainMode::Gain,
                atom,
                NetRelation::Input,
            );
        }

        // Finally clocks; globally routed clocks earn no gain.
        for pin in ctx.netlist.atom_pins_of_kind(atom, PortKind::Clock) {
            let Some(net) = ctx.netlist.pins[pin].net else {
                continue;
            };
            let flag = if global_clocks {
                GainMode::NoGain
            } else {
                GainMode::Gain
            };
            mark_and_update_partial_gain(ctx, cluster, lookup, net, flag, atom, NetRelation::Input);
        }

        update_total_gain(ctx, cluster, atom_pb);

        lookahead::commit_lookahead_pins_used(ctx, cluster, root);
    }
}

/// Marks a net on every pb from the clustered atom up to the root and, when
/// `flag` is [`GainMode::Gain`], updates the gain terms of unclustered
/// atoms on the net.
pub(crate) fn mark_and_update_partial_gain(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    net: NetId,
    flag: GainMode,
    clustered_atom: AtomId,
    relation: NetRelation,
) {
    let atom_pb = lookup
        .atom_pb(clustered_atom)
        .expect("clustered atom is mapped to a pb");
    let chain = cluster.ancestors(atom_pb);
    let parents = &chain[1..];

    if ctx.netlist.nets[net].sinks.len() > MAX_NET_SINKS_IGNORE {
        // Too costly to walk; remember the lightest such net per cluster as
        // a tie break for when the candidate queue runs dry.
        if !ctx.netlist.nets[net].is_global {
            let root = cluster.root;
            let current = cluster.pbs[root]
                .stats
                .as_ref()
                .and_then(|s| s.tie_break_high_fanout_net);
            let replace = match current {
                None => true,
                Some(stored) => {
                    ctx.netlist.nets[net].sinks.len() < ctx.netlist.nets[stored].sinks.len()
                }
            };
            if replace {
                stats_mut(cluster, root).tie_break_high_fanout_net = Some(net);
            }
        }
        return;
    }

    for &pb in parents {
        let first_touch = !stats_mut(cluster, pb).num_pins_of_net_in_pb.contains_key(&net);
        if first_touch {
            stats_mut(cluster, pb).marked_nets.push(net);
        }

        if flag == GainMode::Gain {
            if first_touch {
                for pin in ctx.netlist.net_pins_for_gain(net) {
                    let blk = ctx.netlist.pins[pin].atom;
                    if !lookup.is_unclustered(blk) {
                        continue;
                    }
                    let ext_inputs = ctx.netlist.num_ext_inputs_atom(blk);
                    let stats = stats_mut(cluster, pb);
                    if let Some(sharing) = stats.sharinggain.get_mut(&blk) {
                        *sharing += 1.0;
                        *stats.hillgain.get_mut(&blk).expect("hillgain set with sharinggain") +=
                            1.0;
                    } else {
                        stats.marked_atoms.push(blk);
                        stats.sharinggain.insert(blk, 1.0);
                        stats.hillgain.insert(blk, 1.0 - ext_inputs as f32);
                    }
                }
            }

            if ctx.options.connection_driven {
                update_connection_gain_values(ctx, cluster, lookup, net, clustered_atom, pb, relation);
            }

            if ctx.options.timing_driven {
                update_timing_gain_values(ctx, cluster, lookup, pb, net, relation);
            }
        }

        let stats = stats_mut(cluster, pb);
        *stats.num_pins_of_net_in_pb.entry(net).or_insert(0) += 1;
    }
}

/// Adjusts connection gains of unclustered atoms on a net whose
/// internal/open/stuck split changed.
fn update_connection_gain_values(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    net: NetId,
    clustered_atom: AtomId,
    pb: PbId,
    relation: NetRelation,
) {
    let this_cluster = lookup.atom_cluster(clustered_atom);
    let clustered_pb = lookup
        .atom_pb(clustered_atom)
        .expect("clustered atom is mapped to a pb");

    let mut num_internal = 0u32;
    let mut num_open = 0u32;
    let mut num_stuck = 0u32;
    let n = &ctx.netlist.nets[net];
    for pin in n.driver.iter().copied().chain(n.sinks.iter().copied()) {
        let blk = ctx.netlist.pins[pin].atom;
        if lookup.atom_cluster(blk) == this_cluster
            && is_atom_in_pb(cluster, lookup, blk, clustered_pb)
        {
            num_internal += 1;
        } else if lookup.is_unclustered(blk) {
            num_open += 1;
        } else {
            num_stuck += 1;
        }
    }

    let attraction = 1.0 / (num_open as f32 + 1.5 * num_stuck as f32 + 0.1);
    let correction = 1.0 / (num_open as f32 + 1.5 * num_stuck as f32 + 1.0 + 0.1);

    match relation {
        NetRelation::Output => {
            for &sink in &ctx.netlist.nets[net].sinks {
                let blk = ctx.netlist.pins[sink].atom;
                if !lookup.is_unclustered(blk) {
                    continue;
                }
                let stats = stats_mut(cluster, pb);
                let entry = stats.connectiongain.entry(blk).or_insert(0.0);
                if num_internal > 1 {
                    *entry -= correction;
                }
                *entry += attraction;
            }
        }
        NetRelation::Input => {
            // Attract the atom driving this net into the cluster.
            let Some(driver_atom) = ctx.netlist.net_driver_atom(net) else {
                return;
            };
            if !lookup.is_unclustered(driver_atom) {
                return;
            }
            let stats = stats_mut(cluster, pb);
            let entry = stats.connectiongain.entry(driver_atom).or_insert(0.0);
            if num_internal > 1 {
                *entry -= correction;
            }
            *entry += attraction;
        }
    }
}

/// Raises timing gains to the highest setup criticality seen on a net.
fn update_timing_gain_values(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    pb: PbId,
    net: NetId,
    relation: NetRelation,
) {
    if ctx.netlist.nets[net].is_global {
        return;
    }

    match relation {
        NetRelation::Output => {
            let pins = ctx.netlist.net_pins_for_gain(net);
            for pin in pins {
                let blk = ctx.netlist.pins[pin].atom;
                if !lookup.is_unclustered(blk) {
                    continue;
                }
                let crit = ctx.timing.setup_pin_criticality(pin);
                let stats = stats_mut(cluster, pb);
                let entry = stats.timinggain.entry(blk).or_insert(0.0);
                if crit > *entry {
                    *entry = crit;
                }
            }
        }
        NetRelation::Input => {
            let Some(driver_atom) = ctx.netlist.net_driver_atom(net) else {
                return;
            };
            if !lookup.is_unclustered(driver_atom) {
                return;
            }
            let sinks = ctx.netlist.nets[net].sinks.clone();
            for sink in sinks {
                let crit = ctx.timing.setup_pin_criticality(sink);
                let stats = stats_mut(cluster, pb);
                let entry = stats.timinggain.entry(driver_atom).or_insert(0.0);
                if crit > *entry {
                    *entry = crit;
                }
            }
        }
    }
}

/// Blends the gain terms into the total gain for every marked atom, on
/// every pb from `atom_pb`'s parent up to the root.
pub(crate) fn update_total_gain(ctx: &PackerContext<'_>, cluster: &mut ClusterState, atom_pb: PbId) {
    let chain = cluster.ancestors(atom_pb);
    for &pb in &chain[1..] {
        let marked: Vec<AtomId> = stats_mut(cluster, pb).marked_atoms.clone();
        for blk in marked {
            let used_pins = ctx.netlist.used_pins(blk).max(1) as f32;
            let stats = stats_mut(cluster, pb);
            stats.connectiongain.entry(blk).or_insert(0.0);
            stats.sharinggain.entry(blk).or_insert(0.0);

            let sharing = stats.sharinggain[&blk];
            let connection = stats.connectiongain[&blk];
            let mut gain = if ctx.options.connection_driven {
                ((1.0 - ctx.options.beta) * sharing + ctx.options.beta * connection) / used_pins
            } else {
                sharing / used_pins
            };
            if ctx.options.timing_driven {
                let timing = stats.timinggain.get(&blk).copied().unwrap_or(0.0);
                gain = ctx.options.alpha * timing + (1.0 - ctx.options.alpha) * gain;
            }
            stats.gain.insert(blk, gain);
        }
    }
}
