//! The speculative, reversible placement transaction.
//!
//! `try_pack_molecule` asks the placement stats for a candidate primitive
//! tuple, descends the pb tree opening parents lazily, runs primitive,
//! memory-sibling and chain-root feasibility checks, recomputes the
//! speculative pin usage, optionally routes, and either commits or reverts
//! every side effect in LIFO order.

use crate::context::PackerContext;
use crate::ids::PbId;
use crate::lookahead;
use crate::pb::{mode_of_child, AtomLookup, ClusterState};
use crate::placement_stats::ClusterPlacementStats;
use crate::router::{IntraClusterRouter, RouterView};
use silica_arch::{PbClass, PbGraphNodeId, PbGraphPinId};
use silica_netlist::{AtomId, MoleculeId, MoleculeStore};

/// Outcome of a try-pack attempt. Not errors: the controller reacts to
/// each with its retry loops.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PackStatus {
    /// The molecule was committed to the cluster.
    Passed,
    /// No legal primitive assignment (type, pins, siblings, chain) exists.
    FailedFeasible,
    /// The intra-cluster router rejected the tentative placement.
    FailedRoute,
    /// The pb tree rejected the placement (occupied slot, mode conflict).
    FailedBlockPack,
}

/// Attempts to pack a molecule into the open cluster.
#[allow(clippy::too_many_arguments)]
pub(crate) fn try_pack_molecule(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &mut AtomLookup,
    molecules: &mut MoleculeStore,
    stats: &mut ClusterPlacementStats,
    router: &mut dyn IntraClusterRouter,
    molecule_id: MoleculeId,
    route_each_atom: bool,
) -> PackStatus {
    let molecule = molecules.molecules[molecule_id].clone();

    loop {
        let Some(primitives_list) = stats.get_next_primitive_list(ctx.arch, ctx.netlist, &molecule)
        else {
            return PackStatus::FailedFeasible;
        };

        let mut status = PackStatus::Passed;
        let mut failed_location = 0usize;

        for (i, slot) in molecule.atoms.iter().enumerate() {
            let Some(atom) = *slot else { continue };
            failed_location = i + 1;
            let is_root_of_chain = molecule.is_chain && i == molecule.root;
            let chain_root_pin = if is_root_of_chain {
                molecule.chain_root_pin
            } else {
                None
            };
            let target = primitives_list[i].expect("tuple covers occupied slots");
            if let Err(s) = try_place_atom_recursive(
                ctx,
                cluster,
                lookup,
                router,
                target,
                atom,
                is_root_of_chain,
                chain_root_pin,
            ) {
                status = s;
                break;
            }
        }

        if status == PackStatus::Passed {
            // Pin-usage feasibility over the whole cluster, from scratch.
            let root = cluster.root;
            lookahead::reset_lookahead_pins_used(cluster, root);
            lookahead::try_update_lookahead_pins_used(ctx, cluster, lookup, root);
            if !lookahead::check_lookahead_pins_used(ctx, cluster, root) {
                status = PackStatus::FailedFeasible;
            }
        }

        if status == PackStatus::Passed && route_each_atom {
            let view = RouterView {
                ctx,
                cluster,
                lookup,
            };
            if !router.try_intra_lb_route(&view) {
                status = PackStatus::FailedRoute;
            }
        }

        if status == PackStatus::Passed {
            if molecule.is_chain {
                rename_chain_ancestors(ctx, cluster, lookup, &molecule);
            }
            for (i, slot) in molecule.atoms.iter().enumerate() {
                let Some(atom) = *slot else { continue };
                molecules.invalidate_molecules_of(atom);
                stats.commit_primitive(ctx.arch, primitives_list[i].unwrap());
            }
            return PackStatus::Passed;
        }

        // Reverse in LIFO order.
        for slot in molecule.atoms[..failed_location].iter().rev() {
            let Some(atom) = *slot else { continue };
            router.remove_atom_from_target(atom);
        }
        for slot in molecule.atoms[..failed_location].iter().rev() {
            let Some(atom) = *slot else { continue };
            revert_place_atom(cluster, lookup, molecules, router, atom);
        }

        // A route failure is terminal for this molecule; feasibility and
        // block-pack failures try the next primitive assignment.
        if status == PackStatus::FailedRoute {
            return status;
        }
    }
}

/// Places an atom on a primitive position, lazily opening the parent chain
/// from the cluster root down. Each opened parent inherits the name of the
/// first atom placed under it and the mode its child demands.
#[allow(clippy::too_many_arguments)]
fn try_place_atom_recursive(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &mut AtomLookup,
    router: &mut dyn IntraClusterRouter,
    node: PbGraphNodeId,
    atom: AtomId,
    is_root_of_chain: bool,
    chain_root_pin: Option<PbGraphPinId>,
) -> Result<PbId, PackStatus> {
    let root_node = cluster.pbs[cluster.root].graph_node;
    let atom_name = ctx.netlist.atoms[atom].name;

    let parent_node = ctx.arch.nodes[node].parent.ok_or(PackStatus::FailedBlockPack)?;
    let parent_pb = if parent_node == root_node {
        cluster.root
    } else {
        try_place_atom_recursive(
            ctx,
            cluster,
            lookup,
            router,
            parent_node,
            atom,
            is_root_of_chain,
            chain_root_pin,
        )?
    };

    let required_mode = mode_of_child(ctx.arch, parent_node, node).ok_or(PackStatus::FailedBlockPack)?;

    if cluster.pbs[parent_pb].children.is_none() {
        // First descent through this parent: adopt the child's mode and the
        // atom's name.
        if parent_pb == cluster.root && cluster.pbs[parent_pb].mode != required_mode {
            return Err(PackStatus::FailedBlockPack);
        }
        cluster.open_children(ctx.arch, parent_pb, required_mode);
        if cluster.pbs[parent_pb].name.is_none() {
            cluster.pbs[parent_pb].name = Some(atom_name);
        }
        router.set_pb_mode(parent_node, required_mode, true);
    } else if cluster.pbs[parent_pb].mode != required_mode {
        return Err(PackStatus::FailedBlockPack);
    }

    let pb = cluster.get_or_create_child(ctx.arch, parent_pb, node);
    let is_primitive = ctx.arch.pb_types[ctx.arch.nodes[node].pb_type].is_primitive();
    if !is_primitive {
        return Ok(pb);
    }

    if cluster.pbs[pb].atom.is_some() || lookup.atom_pb(atom).is_some() {
        return Err(PackStatus::FailedBlockPack);
    }
    cluster.place_atom(lookup, atom, pb, atom_name);
    router.add_atom_as_target(atom);

    if !primitive_feasible(ctx, cluster, atom, pb) {
        return Err(PackStatus::FailedFeasible);
    }

    if is_root_of_chain {
        if let Some(chain_pin) = chain_root_pin {
            // A chain whose carry-in net crosses cluster boundaries must
            // sit on the dedicated chain input position.
            if chain_input_is_driven(ctx, atom, chain_pin)
                && node != ctx.arch.pins[chain_pin].node
            {
                return Err(PackStatus::FailedFeasible);
            }
        }
    }

    Ok(pb)
}

/// Model compatibility plus the memory-slice sibling equivalence check.
fn primitive_feasible(
    ctx: &PackerContext<'_>,
    cluster: &ClusterState,
    atom: AtomId,
    pb: PbId,
) -> bool {
    let node = cluster.pbs[pb].graph_node;
    let pb_type = &ctx.arch.pb_types[ctx.arch.nodes[node].pb_type];

    if !primitive_type_feasible(ctx, atom, node) {
        return false;
    }

    if pb_type.class == PbClass::Memory {
        if let Some(sibling) = find_memory_sibling(cluster, pb, atom) {
            if !memory_sibling_feasible(ctx, atom, sibling) {
                return false;
            }
        }
    }
    true
}

/// The atom's model must match the primitive's and every connected atom
/// port must fit the primitive's port widths.
fn primitive_type_feasible(ctx: &PackerContext<'_>, atom: AtomId, node: PbGraphNodeId) -> bool {
    let pb_type = &ctx.arch.pb_types[ctx.arch.nodes[node].pb_type];
    if pb_type.model != Some(ctx.netlist.atoms[atom].model) {
        return false;
    }
    for port in &ctx.netlist.atoms[atom].ports {
        let used_bits = port
            .pins
            .iter()
            .enumerate()
            .filter(|(_, &p)| ctx.netlist.pins[p].net.is_some())
            .map(|(bit, _)| bit + 1)
            .max()
            .unwrap_or(0);
        if used_bits == 0 {
            continue;
        }
        match pb_type.find_port(port.name) {
            Some((_, pb_port)) => {
                if (pb_port.width as usize) < used_bits {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

/// Another occupied memory slice under the same parent pb, if any.
fn find_memory_sibling(cluster: &ClusterState, pb: PbId, atom: AtomId) -> Option<AtomId> {
    let parent = cluster.pbs[pb].parent?;
    let children = cluster.pbs[parent].children.as_ref()?;
    for row in children {
        for &slot in row.iter().flatten() {
            if slot == pb {
                continue;
            }
            if let Some(sibling) = cluster.pbs[slot].atom {
                if sibling != atom {
                    return Some(sibling);
                }
            }
        }
    }
    None
}

/// Memory slices sharing a parent must agree on every non-data net,
/// including both pins being disconnected.
fn memory_sibling_feasible(ctx: &PackerContext<'_>, atom: AtomId, sibling: AtomId) -> bool {
    let model = &ctx.arch.models[ctx.netlist.atoms[atom].model];
    for mp in &model.ports {
        if mp.is_data_class() {
            continue;
        }
        let atom_port = ctx.netlist.atoms[atom].ports.iter().find(|p| p.name == mp.name);
        let sib_port = ctx.netlist.atoms[sibling]
            .ports
            .iter()
            .find(|p| p.name == mp.name);
        for bit in 0..mp.width as usize {
            let atom_net = atom_port.and_then(|p| p.pins.get(bit)).and_then(|&pin| {
                ctx.netlist.pins[pin].net
            });
            let sib_net = sib_port.and_then(|p| p.pins.get(bit)).and_then(|&pin| {
                ctx.netlist.pins[pin].net
            });
            if atom_net != sib_net {
                return false;
            }
        }
    }
    true
}

/// Whether the atom's chain carry-in port (the one behind `chain_pin`) is
/// connected to a net.
fn chain_input_is_driven(
    ctx: &PackerContext<'_>,
    atom: AtomId,
    chain_pin: PbGraphPinId,
) -> bool {
    let pin = &ctx.arch.pins[chain_pin];
    let node = pin.node;
    let pb_type = &ctx.arch.pb_types[ctx.arch.nodes[node].pb_type];
    let port_name = pb_type.ports[pin.port as usize].name;
    let Some(atom_port) = ctx.netlist.atoms[atom].ports.iter().find(|p| p.name == port_name)
    else {
        return false;
    };
    atom_port
        .pins
        .get(pin.bit as usize)
        .is_some_and(|&p| ctx.netlist.pins[p].net.is_some())
}

/// Renames every ancestor pb of the chain-root atom so downstream tools can
/// recognize the chain.
fn rename_chain_ancestors(
    ctx: &PackerContext<'_>,
    cluster: &mut ClusterState,
    lookup: &AtomLookup,
    molecule: &silica_netlist::Molecule,
) {
    let root_atom = molecule.root_atom();
    let name = ctx.netlist.atoms[root_atom].name;
    let Some(pb) = lookup.atom_pb(root_atom) else {
        return;
    };
    let chain = cluster.ancestors(pb);
    for &anc in &chain[1..] {
        cluster.pbs[anc].name = Some(name);
    }
}

/// Reverts one tentatively placed atom: clears the mapping, revalidates its
/// molecules, and prunes pbs that were opened only for this attempt.
pub(crate) fn revert_place_atom(
    cluster: &mut ClusterState,
    lookup: &mut AtomLookup,
    molecules: &mut MoleculeStore,
    router: &mut dyn IntraClusterRouter,
    atom: AtomId,
) {
    let Some(pb) = cluster.unplace_atom(lookup, atom) else {
        return;
    };
    molecules.revalidate_molecules_of(atom, |a| lookup.is_unclustered(a));

    // Free the primitive pb and any ancestor left holding nothing.
    cluster.detach_pb(pb);
    let mut cur = cluster.pbs[pb].parent;
    while let Some(p) = cur {
        let next = cluster.pbs[p].parent;
        let committed = cluster.pbs[p]
            .stats
            .as_ref()
            .map(|s| s.num_child_blocks_in_pb)
            .unwrap_or(0);
        if cluster.pbs[p].children.is_some()
            && committed == 0
            && cluster.atoms_under(p).is_empty()
        {
            router.set_pb_mode(cluster.pbs[p].graph_node, cluster.pbs[p].mode, false);
            if next.is_some() {
                // Opened only to hold this molecule; release it. The root
                // is kept so the seed can look for another placement.
                cluster.detach_pb(p);
                cluster.pbs[p].children = None;
                cluster.pbs[p].name = None;
            }
        }
        cur = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::PinCountingRouter;
    use crate::test_support::*;

    #[test]
    fn pack_single_lut_passes() {
        let fx = Fixture::lut_chain(1);
        let ctx = fx.ctx();
        let (mut cluster, mut lookup) = fx.cluster_builder();
        let mut molecules = fx.molecules.clone();
        let mut stats = fx.placement_stats();
        let mut router = PinCountingRouter::new();
        router.begin_cluster(&fx.arch, cluster.block_type);

        let m = molecules.molecules.ids().next().unwrap();
        let status = try_pack_molecule(
            &ctx,
            &mut cluster,
            &mut lookup,
            &mut molecules,
            &mut stats,
            &mut router,
            m,
            false,
        );
        assert_eq!(status, PackStatus::Passed);
        assert_eq!(lookup.atom_cluster(fx.atoms[0]), Some(cluster.id));
        // Packing invalidates every molecule containing the atom.
        assert!(!molecules.molecules[m].valid);
    }

    #[test]
    fn pack_fails_when_no_primitive_left() {
        let fx = Fixture::lut_chain(1);
        let ctx = fx.ctx();
        let (mut cluster, mut lookup) = fx.cluster_builder();
        let mut molecules = fx.molecules.clone();
        let mut stats = fx.placement_stats();
        let mut router = PinCountingRouter::new();
        router.begin_cluster(&fx.arch, cluster.block_type);

        for &p in fx.arch.primitives(cluster.block_type) {
            stats.commit_primitive(&fx.arch, p);
        }
        let m = molecules.molecules.ids().next().unwrap();
        let status = try_pack_molecule(
            &ctx,
            &mut cluster,
            &mut lookup,
            &mut molecules,
            &mut stats,
            &mut router,
            m,
            false,
        );
        assert_eq!(status, PackStatus::FailedFeasible);
        assert!(lookup.is_unclustered(fx.atoms[0]));
        assert!(molecules.molecules[m].valid);
    }

    #[test]
    fn rollback_restores_state_snapshot() {
        // A rejected attempt must leave the atom mapping, molecule
        // validity, placement free set, and committed pb state exactly as
        // they were before the attempt.
        let fx = Fixture::lut_ff_pair();
        let ctx = fx.ctx();
        let (mut cluster, mut lookup) = fx.cluster_builder();
        let mut molecules = fx.molecules.clone();
        let mut stats = fx.placement_stats();
        let mut router = RejectingRouter;

        let lookup_before = lookup.clone();
        let molecules_before = molecules.clone();
        let free_before = stats.free_primitives();
        let root_children_before = cluster.pbs[cluster.root].children.clone();
        let root_committed_before = cluster.pbs[cluster.root]
            .stats
            .as_ref()
            .map(|s| (s.input_pins_used.clone(), s.output_pins_used.clone(), s.gain.clone()));

        // The lut+ff pair molecule.
        let pair = molecules
            .molecules
            .ids()
            .find(|&m| molecules.molecules[m].num_atoms() == 2)
            .unwrap();
        let status = try_pack_molecule(
            &ctx,
            &mut cluster,
            &mut lookup,
            &mut molecules,
            &mut stats,
            &mut router,
            pair,
            true,
        );
        assert_eq!(status, PackStatus::FailedRoute);

        assert_eq!(lookup, lookup_before);
        assert_eq!(molecules, molecules_before);
        assert_eq!(stats.free_primitives(), free_before);
        assert_eq!(cluster.pbs[cluster.root].children, root_children_before);
        let root_committed_after = cluster.pbs[cluster.root]
            .stats
            .as_ref()
            .map(|s| (s.input_pins_used.clone(), s.output_pins_used.clone(), s.gain.clone()));
        assert_eq!(root_committed_after, root_committed_before);
    }

    #[test]
    fn failed_route_rolls_back_placement() {
        let fx = Fixture::lut_chain(1);
        let ctx = fx.ctx();
        let (mut cluster, mut lookup) = fx.cluster_builder();
        let mut molecules = fx.molecules.clone();
        let mut stats = fx.placement_stats();
        let mut router = RejectingRouter::default();

        let before_pbs = cluster.pbs.clone();
        let m = molecules.molecules.ids().next().unwrap();
        let status = try_pack_molecule(
            &ctx,
            &mut cluster,
            &mut lookup,
            &mut molecules,
            &mut stats,
            &mut router,
            m,
            true,
        );
        assert_eq!(status, PackStatus::FailedRoute);
        assert!(lookup.is_unclustered(fx.atoms[0]));
        assert!(molecules.molecules[m].valid);
        // Every tentatively created pb was detached again.
        for (id, pb) in cluster.pbs.iter() {
            if before_pbs.len() as u32 <= id.as_raw() {
                assert!(pb.atom.is_none());
            }
        }
    }
}
