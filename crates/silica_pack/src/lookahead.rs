//! Speculative pin-usage accounting.
//!
//! On every try-pack the speculative per-class pin usage is recomputed from
//! scratch over the whole cluster, checked against class capacities, and
//! copied into the committed sets only when the molecule sticks. A net
//! charges no input pin at a level where its driver can reach the sink
//! through a purely internal path, and no output pin when it is fully
//! absorbed.

use crate::context::PackerContext;
use crate::ids::PbId;
use crate::pb::{AtomLookup, ClusterState};
use silica_arch::PbGraphPinId;
use silica_netlist::{AtomId, NetId, PinId};

/// Clears the speculative pin-usage sets across the cluster.
pub(crate) fn reset_lookahead_pins_used(cluster: &mut ClusterState, pb: PbId) {
    if cluster.pbs[pb].stats.is_none() || cluster.pbs[pb].name.is_none() {
        return;
    }
    {
        let stats = cluster.pbs[pb].stats.as_mut().unwrap();
        for class in &mut stats.lookahead_input_pins_used {
            class.clear();
        }
        for class in &mut stats.lookahead_output_pins_used {
            class.clear();
        }
    }
    let children = child_ids(cluster, pb);
    for child in children {
        reset_lookahead_pins_used(cluster, child);
    }
}

/// Recomputes speculative pin usage over the whole cluster.
pub(crate) fn try_update_lookahead_pins_used(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    pb: PbId,
) {
    if cluster.pbs[pb].stats.is_some() {
        if cluster.pbs[pb].name.is_some() {
            let children = child_ids(cluster, pb);
            for child in children {
                try_update_lookahead_pins_used(ctx, cluster, lookup, child);
            }
        }
    } else if let Some(atom) = cluster.pbs[pb].atom {
        compute_and_mark_lookahead_pins_used(ctx, cluster, lookup, atom);
    }
}

/// Checks every pin class against its capacity.
pub(crate) fn check_lookahead_pins_used(
    ctx: &PackerContext<'_>,
    cluster: &ClusterState,
    pb: PbId,
) -> bool {
    let Some(stats) = cluster.pbs[pb].stats.as_ref() else {
        return true;
    };
    if cluster.pbs[pb].name.is_none() {
        return true;
    }
    let node = &ctx.arch.nodes[cluster.pbs[pb].graph_node];
    for (i, class) in node.input_pin_classes.iter().enumerate() {
        if stats.lookahead_input_pins_used[i].len() > class.capacity as usize {
            return false;
        }
    }
    for (i, class) in node.output_pin_classes.iter().enumerate() {
        if stats.lookahead_output_pins_used[i].len() > class.capacity as usize {
            return false;
        }
    }
    for child in child_ids(cluster, pb) {
        if !check_lookahead_pins_used(ctx, cluster, child) {
            return false;
        }
    }
    true
}

/// Speculation succeeded: copies speculative usage into the committed sets.
pub(crate) fn commit_lookahead_pins_used(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    pb: PbId,
) {
    if cluster.pbs[pb].stats.is_some() && cluster.pbs[pb].name.is_some() {
        {
            let node = &ctx.arch.nodes[cluster.pbs[pb].graph_node];
            let stats = cluster.pbs[pb].stats.as_mut().unwrap();
            for (i, class) in node.input_pin_classes.iter().enumerate() {
                debug_assert!(
                    stats.lookahead_input_pins_used[i].len() <= class.capacity as usize
                );
                stats.input_pins_used[i] = stats.lookahead_input_pins_used[i].clone();
            }
            for (i, class) in node.output_pin_classes.iter().enumerate() {
                debug_assert!(
                    stats.lookahead_output_pins_used[i].len() <= class.capacity as usize
                );
                stats.output_pins_used[i] = stats.lookahead_output_pins_used[i].clone();
            }
        }
        for child in child_ids(cluster, pb) {
            commit_lookahead_pins_used(ctx, cluster, child);
        }
    }
}

/// Marks pin classes used by one placed atom across all its nets.
fn compute_and_mark_lookahead_pins_used(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    atom: AtomId,
) {
    for pin in ctx.netlist.atom_pins(atom).collect::<Vec<_>>() {
        let Some(net) = ctx.netlist.pins[pin].net else {
            continue;
        };
        let Some(graph_pin) = find_pb_graph_pin(ctx, cluster, lookup, pin) else {
            continue;
        };
        compute_and_mark_for_pin(ctx, cluster, lookup, atom, graph_pin, net);
    }
}

/// Marks the pin classes one primitive pin affects at each ancestor level.
fn compute_and_mark_for_pin(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    atom: AtomId,
    graph_pin: PbGraphPinId,
    net: NetId,
) {
    let this_cluster = lookup.atom_cluster(atom);
    let prim_pb = lookup.atom_pb(atom).expect("atom placed");
    let ancestors = {
        let chain = cluster.ancestors(prim_pb);
        chain[1..].to_vec()
    };
    let pin = &ctx.arch.pins[graph_pin];
    let kind = pin.kind;

    for &anc in &ancestors {
        let depth = ctx.arch.nodes[cluster.pbs[anc].graph_node].depth;
        let class = ctx.arch.pins[graph_pin].parent_pin_class[depth as usize] as usize;

        if kind.is_input_side() {
            // Skip the input pin when the driver sits inside this ancestor
            // and reaches the sink on a purely internal path.
            let mut skip = false;
            if let Some(driver_atom) = ctx.netlist.net_driver_atom(net) {
                if lookup.atom_cluster(driver_atom) == this_cluster {
                    if let Some(driver_pin) =
                        driver_graph_pin(ctx, cluster, lookup, net)
                    {
                        let driver_pb = lookup.atom_pb(driver_atom).expect("driver placed");
                        let driver_under_anc = cluster.ancestors(driver_pb).contains(&anc);
                        if driver_under_anc {
                            let reachable = &ctx.arch.pins[driver_pin].connectable[depth as usize];
                            skip = reachable.contains(&graph_pin);
                        }
                    }
                }
            }
            if !skip {
                let stats = cluster.pbs[anc].stats.as_mut().expect("container stats");
                let used = &mut stats.lookahead_input_pins_used[class];
                if !used.contains(&net) {
                    used.push(net);
                }
            }
        } else {
            // Output pin: charge unless the net is fully absorbed at this
            // level.
            let num_sinks = ctx.netlist.nets[net].sinks.len();
            let reachable = &ctx.arch.pins[graph_pin].connectable[depth as usize];
            let mut net_exits_cluster = true;
            if reachable.len() >= num_sinks {
                let all_sinks_here = ctx.netlist.nets[net]
                    .sinks
                    .iter()
                    .all(|&s| lookup.atom_cluster(ctx.netlist.pins[s].atom) == this_cluster);
                if all_sinks_here
                    && net_sinks_reachable_in_cluster(ctx, cluster, lookup, graph_pin, depth, net)
                {
                    net_exits_cluster = false;
                }
            }
            if net_exits_cluster {
                let stats = cluster.pbs[anc].stats.as_mut().expect("container stats");
                let used = &mut stats.lookahead_output_pins_used[class];
                if !used.contains(&net) {
                    used.push(net);
                }
            }
        }
    }
}

/// Whether every sink of a net is reachable from the driver pin through the
/// ancestor at `depth`.
pub(crate) fn net_sinks_reachable_in_cluster(
    ctx: &PackerContext<'_>,
    cluster: &ClusterState,
    lookup: &AtomLookup,
    driver_pin: PbGraphPinId,
    depth: u32,
    net: NetId,
) -> bool {
    let sinks = &ctx.netlist.nets[net].sinks;
    let reachable = &ctx.arch.pins[driver_pin].connectable[depth as usize];
    let mut num_reachable = 0usize;
    for &sink in sinks {
        let Some(sink_pin) = find_pb_graph_pin(ctx, cluster, lookup, sink) else {
            return false;
        };
        if reachable.contains(&sink_pin) {
            num_reachable += 1;
        }
    }
    num_reachable == sinks.len()
}

/// The pb-graph pin a placed atom pin maps to.
///
/// The atom must be placed in `cluster`; callers guarantee this.
pub(crate) fn find_pb_graph_pin(
    ctx: &PackerContext<'_>,
    cluster: &ClusterState,
    lookup: &AtomLookup,
    pin: PinId,
) -> Option<PbGraphPinId> {
    let p = &ctx.netlist.pins[pin];
    let pb = lookup.atom_pb(p.atom)?;
    let node = cluster.pbs[pb].graph_node;
    let port_name = ctx.netlist.atoms[p.atom].ports[p.port as usize].name;
    ctx.arch.primitive_pin(node, port_name, p.bit)
}

/// The pb-graph pin driving a net inside the cluster, if the driver atom is
/// placed here.
fn driver_graph_pin(
    ctx: &PackerContext<'_>,
    cluster: &ClusterState,
    lookup: &AtomLookup,
    net: NetId,
) -> Option<PbGraphPinId> {
    let driver = ctx.netlist.nets[net].driver?;
    find_pb_graph_pin(ctx, cluster, lookup, driver)
}

/// Committed input pins in use across all classes of a pb (for the
/// unrelated-molecule input budget).
pub(crate) fn committed_inputs_used(cluster: &ClusterState, pb: PbId) -> usize {
    cluster.pbs[pb]
        .stats
        .as_ref()
        .map(|s| s.input_pins_used.iter().map(|c| c.len()).sum())
        .unwrap_or(0)
}

fn child_ids(cluster: &ClusterState, pb: PbId) -> Vec<PbId> {
    match &cluster.pbs[pb].children {
        Some(children) => children
            .iter()
            .flat_map(|row| row.iter().flatten().copied())
            .collect(),
        None => Vec::new(),
    }
}
