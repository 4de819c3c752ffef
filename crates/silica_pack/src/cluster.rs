//! The top-level clustering loop.
//!
//! Opens clusters one seed at a time, grows each by gain-ranked candidates,
//! and legalizes with the intra-cluster router — once at the end of the
//! cluster by default, retrying the whole cluster with per-atom routing
//! when the end-of-cluster check fails.

use crate::candidates::{get_molecule_for_cluster, UnclusteredLists};
use crate::check::{check_clocks, check_clustering};
use crate::context::PackerContext;
use crate::error::PackError;
use crate::gain::update_cluster_stats;
use crate::ids::ClusterId;
use crate::pb::{AtomLookup, ClusterState};
use crate::placement_stats::ClusterPlacementStats;
use crate::router::{IntraClusterRouter, RouterView};
use crate::seed::SeedSelector;
use crate::try_pack::{try_pack_molecule, PackStatus};
use crate::MAX_TRANSITIVE_FANOUT_EXPLORE;
use silica_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use silica_netlist::{MoleculeId, MoleculeStore, NetId};

/// The packing output: finalized clusters plus the final atom mapping.
pub struct PackResult {
    /// Finalized clusters in creation order.
    pub clusters: Vec<ClusterState>,
    /// The atom → (cluster, pb) mapping.
    pub lookup: AtomLookup,
    /// The molecule store with post-packing validity flags.
    pub molecules: MoleculeStore,
    /// Final logical device dimensions.
    pub device: (i32, i32),
}

/// Legalization routing policy for a cluster attempt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RoutingStage {
    /// Route once when the cluster stops growing.
    AtEnd,
    /// Route after every atom; slower, catches dead ends early.
    PerAtom,
}

/// Logical device dimensions, grown on demand while keeping the aspect
/// ratio.
struct DeviceGrid {
    nx: i32,
    ny: i32,
    aspect: f32,
}

impl DeviceGrid {
    fn new(aspect: f32) -> Self {
        Self { nx: 1, ny: 1, aspect }
    }

    /// Cluster capacity per block type at the current size.
    fn capacity(&self) -> usize {
        (self.nx * self.ny) as usize
    }

    fn grow(&mut self) -> Result<(), PackError> {
        if self.aspect >= 1.0 {
            self.ny += 1;
            self.nx = (self.ny as f32 * self.aspect).round() as i32;
        } else {
            self.nx += 1;
            self.ny = (self.nx as f32 / self.aspect).round() as i32;
        }
        if self.nx > i16::MAX as i32 || self.ny > i16::MAX as i32 {
            return Err(PackError::DeviceTooLarge {
                nx: self.nx,
                ny: self.ny,
            });
        }
        Ok(())
    }
}

/// Packs the whole netlist into clusters.
///
/// Molecule validity flags are consumed and returned in the result; the
/// netlist and architecture are read-only throughout.
pub fn pack_netlist(
    ctx: &PackerContext<'_>,
    mut molecules: MoleculeStore,
    router: &mut dyn IntraClusterRouter,
    sink: &DiagnosticSink,
) -> Result<PackResult, PackError> {
    check_clocks(ctx)?;

    for (_, atom) in ctx.netlist.atoms.iter() {
        if !ctx.arch.model_hostable(atom.model) {
            let model = &ctx.arch.models[atom.model];
            return Err(PackError::UnhostableModel {
                model: ctx.interner.resolve(model.name).to_string(),
            });
        }
    }

    let unclustered = UnclusteredLists::build(&molecules);
    let mut seeds = SeedSelector::new(ctx, &molecules);
    let mut lookup = AtomLookup::new(ctx.netlist.atoms.len());
    let mut placement_stats: Vec<ClusterPlacementStats> = ctx
        .arch
        .block_types
        .iter()
        .map(|bt| ClusterPlacementStats::new(ctx.arch, bt.id))
        .collect();
    let mut device = DeviceGrid::new(ctx.options.aspect);
    let mut num_used_instances = vec![0usize; ctx.arch.block_types.len()];
    let mut clusters: Vec<ClusterState> = Vec::new();

    let mut istart = seeds.next_seed(&lookup, &molecules, &unclustered);
    while let Some(seed) = istart {
        let saved_seed_pos = seeds.position();
        let mut legal = false;

        for stage in [RoutingStage::AtEnd, RoutingStage::PerAtom] {
            if legal {
                break;
            }
            let route_each_atom = stage == RoutingStage::PerAtom;
            let cluster_id = ClusterId::from_raw(clusters.len() as u32);

            let (mut cluster, type_idx) = start_new_cluster(
                ctx,
                cluster_id,
                seed,
                &mut lookup,
                &mut molecules,
                &mut placement_stats,
                router,
                &mut device,
                &num_used_instances,
                route_each_atom,
                sink,
            )?;
            num_used_instances[type_idx] += 1;

            let seed_molecule = molecules.molecules[seed].clone();
            update_cluster_stats(ctx, &mut cluster, &lookup, &seed_molecule);

            // Grow the cluster by gain until nothing fits.
            let mut num_unrelated_attempts = 0u32;
            let mut prev: MoleculeId = seed;
            let mut next = get_molecule_for_cluster(
                ctx,
                &mut cluster,
                &molecules,
                &lookup,
                &mut placement_stats[type_idx],
                &unclustered,
                &clusters,
                &mut num_unrelated_attempts,
            );
            while let Some(candidate) = next {
                if candidate == prev {
                    break;
                }
                let status = try_pack_molecule(
                    ctx,
                    &mut cluster,
                    &mut lookup,
                    &mut molecules,
                    &mut placement_stats[type_idx],
                    router,
                    candidate,
                    route_each_atom,
                );
                prev = candidate;
                if status == PackStatus::Passed {
                    let m = molecules.molecules[candidate].clone();
                    update_cluster_stats(ctx, &mut cluster, &lookup, &m);
                    num_unrelated_attempts = 0;
                }
                next = get_molecule_for_cluster(
                    ctx,
                    &mut cluster,
                    &molecules,
                    &lookup,
                    &mut placement_stats[type_idx],
                    &unclustered,
                    &clusters,
                    &mut num_unrelated_attempts,
                );
            }

            legal = match stage {
                RoutingStage::AtEnd => {
                    let view = RouterView {
                        ctx,
                        cluster: &cluster,
                        lookup: &lookup,
                    };
                    router.try_intra_lb_route(&view)
                }
                RoutingStage::PerAtom => true,
            };

            if legal {
                let saved = {
                    let view = RouterView {
                        ctx,
                        cluster: &cluster,
                        lookup: &lookup,
                    };
                    router.saved_routing(&view)
                };
                cluster.route = saved;
                record_nets_in_lb(ctx, &mut cluster);
                cluster.free_pb_stats();
                clusters.push(cluster);

                istart = seeds.next_seed(&lookup, &molecules, &unclustered);
            } else {
                sink.emit(Diagnostic::note(
                    DiagnosticCode::new(Category::Pack, 2),
                    format!(
                        "cluster '{}' failed end-of-cluster routing; repacking with per-atom routing",
                        ctx.interner.resolve(cluster.name)
                    ),
                ));
                num_used_instances[type_idx] -= 1;
                discard_cluster(&mut cluster, &mut lookup, &mut molecules);
                seeds.set_position(saved_seed_pos);
            }
            router.end_cluster();
        }
    }

    if clusters.is_empty() {
        sink.emit(Diagnostic::warning(
            DiagnosticCode::new(Category::Pack, 1),
            "packing produced no clusters",
        ));
    }

    check_clustering(ctx, &clusters, &lookup)?;

    Ok(PackResult {
        clusters,
        lookup,
        molecules,
        device: (device.nx, device.ny),
    })
}

/// Finds a (type, mode) that accepts the seed molecule, growing the device
/// when every type with capacity is exhausted.
#[allow(clippy::too_many_arguments)]
fn start_new_cluster(
    ctx: &PackerContext<'_>,
    cluster_id: ClusterId,
    seed: MoleculeId,
    lookup: &mut AtomLookup,
    molecules: &mut MoleculeStore,
    placement_stats: &mut [ClusterPlacementStats],
    router: &mut dyn IntraClusterRouter,
    device: &mut DeviceGrid,
    num_used_instances: &[usize],
    route_each_atom: bool,
    sink: &DiagnosticSink,
) -> Result<(ClusterState, usize), PackError> {
    let root_atom = molecules.molecules[seed].root_atom();
    let root_atom_name = ctx.interner.resolve(ctx.netlist.atoms[root_atom].name).to_string();
    let cluster_name = ctx.interner.get_or_intern(&format!("cb.{root_atom_name}"));

    loop {
        let mut tried = 0usize;
        for (type_idx, bt) in ctx.arch.block_types.iter().enumerate() {
            if num_used_instances[type_idx] >= device.capacity() {
                continue;
            }
            tried += 1;

            let mut cluster = ClusterState::open(ctx.arch, cluster_id, bt.id, cluster_name);
            router.begin_cluster(ctx.arch, bt.id);
            let root_node = ctx.arch.block_types[type_idx].root;
            let num_modes = ctx.arch.pb_types[ctx.arch.nodes[root_node].pb_type].modes.len();

            for mode in 0..num_modes {
                cluster.set_root_mode(mode);
                placement_stats[type_idx].reset();
                placement_stats[type_idx].set_mode(ctx.arch, root_node, mode);
                let status = try_pack_molecule(
                    ctx,
                    &mut cluster,
                    lookup,
                    molecules,
                    &mut placement_stats[type_idx],
                    router,
                    seed,
                    route_each_atom,
                );
                if status == PackStatus::Passed {
                    return Ok((cluster, type_idx));
                }
            }
            router.end_cluster();
        }

        if tried == ctx.arch.block_types.len() {
            return Err(PackError::MoleculeUnhostable {
                root_atom: root_atom_name,
            });
        }

        device.grow()?;
        sink.emit(Diagnostic::note(
            DiagnosticCode::new(Category::Pack, 3),
            format!(
                "not enough resources; expanding device to {} x {}",
                device.nx, device.ny
            ),
        ));
    }
}

/// Records the cluster's low-external-fanout nets for later transitive
/// exploration.
fn record_nets_in_lb(ctx: &PackerContext<'_>, cluster: &mut ClusterState) {
    let root = cluster.root;
    let Some(stats) = cluster.pbs[root].stats.as_ref() else {
        return;
    };
    let mut nets: Vec<NetId> = Vec::new();
    for &net in &stats.marked_nets {
        let total_pins = ctx.netlist.nets[net].sinks.len() + 1;
        let inside = stats.num_pins_of_net_in_pb.get(&net).copied().unwrap_or(0) as usize;
        let external = total_pins.saturating_sub(inside);
        if external > 0 && external < MAX_TRANSITIVE_FANOUT_EXPLORE {
            nets.push(net);
        }
    }
    cluster.nets_in_lb = nets;
}

/// Rolls back every atom of a cluster that failed end-of-cluster routing.
fn discard_cluster(
    cluster: &mut ClusterState,
    lookup: &mut AtomLookup,
    molecules: &mut MoleculeStore,
) {
    let atoms = cluster.atoms_under(cluster.root);
    for &atom in &atoms {
        cluster.unplace_atom(lookup, atom);
    }
    for &atom in &atoms {
        molecules.revalidate_molecules_of(atom, |a| lookup.is_unclustered(a));
    }
}
