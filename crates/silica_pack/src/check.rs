//! Pre-pack sanity checks and post-pack invariant verification.

use crate::context::PackerContext;
use crate::pb::{AtomLookup, ClusterState};
use crate::error::PackError;
use silica_common::{InternalError, SilicaResult};
use silica_netlist::PortKind;
use std::collections::HashSet;

/// Rejects clock nets that fan into non-clock inputs of combinational
/// atoms. Output pads (atoms with no output ports) are exempt.
pub(crate) fn check_clocks(ctx: &PackerContext<'_>) -> Result<(), PackError> {
    for (net_id, net) in ctx.netlist.nets.iter() {
        if !net.is_clock {
            continue;
        }
        for &sink in &net.sinks {
            let pin = &ctx.netlist.pins[sink];
            if pin.kind != PortKind::Input {
                continue;
            }
            let atom = &ctx.netlist.atoms[pin.atom];
            let model = &ctx.arch.models[atom.model];
            let is_output_pad = !model.ports.iter().any(|p| p.kind == PortKind::Output);
            if model.is_combinational() && !is_output_pad {
                return Err(PackError::ClockIntoLogic {
                    net: ctx.interner.resolve(ctx.netlist.nets[net_id].name).to_string(),
                    atom: ctx.interner.resolve(atom.name).to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Verifies the post-packing invariants: every atom in exactly one cluster,
/// consistent two-way mapping, and every pb chain ending at its cluster
/// root.
pub(crate) fn check_clustering(
    ctx: &PackerContext<'_>,
    clusters: &[ClusterState],
    lookup: &AtomLookup,
) -> SilicaResult<()> {
    let mut atoms_seen: HashSet<silica_netlist::AtomId> = HashSet::new();

    for (atom_id, atom) in ctx.netlist.atoms.iter() {
        let name = ctx.interner.resolve(atom.name);
        let Some(cluster_id) = lookup.atom_cluster(atom_id) else {
            return Err(InternalError::new(format!(
                "atom '{name}' is not mapped to a cluster"
            )));
        };
        let Some(pb) = lookup.atom_pb(atom_id) else {
            return Err(InternalError::new(format!(
                "atom '{name}' is not mapped to a pb"
            )));
        };
        let cluster = clusters
            .iter()
            .find(|c| c.id == cluster_id)
            .ok_or_else(|| {
                InternalError::new(format!("atom '{name}' maps to a nonexistent cluster"))
            })?;

        if cluster.pb_atom(pb) != Some(atom_id) {
            return Err(InternalError::new(format!(
                "pb does not map back to atom '{name}'"
            )));
        }

        let chain = cluster.ancestors(pb);
        let top = *chain.last().expect("ancestor chain is never empty");
        if top != cluster.root {
            return Err(InternalError::new(format!(
                "pb chain of atom '{name}' does not reach its cluster root"
            )));
        }
    }

    // No pb may claim an atom twice across clusters.
    for cluster in clusters {
        for atom in cluster.atoms_under(cluster.root) {
            if !atoms_seen.insert(atom) {
                let name = ctx.interner.resolve(ctx.netlist.atoms[atom].name);
                return Err(InternalError::new(format!(
                    "atom '{name}' appears in more than one cluster"
                )));
            }
        }
    }
    for (atom_id, atom) in ctx.netlist.atoms.iter() {
        if !atoms_seen.contains(&atom_id) {
            let name = ctx.interner.resolve(atom.name);
            return Err(InternalError::new(format!(
                "atom '{name}' not found in any cluster"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn clock_into_lut_input_rejected() {
        let mut fx = Fixture::lut_chain(2);
        // Mark the LUT-to-LUT net as a clock: it feeds a combinational
        // data input, which the packer refuses.
        fx.netlist.set_clock(fx.nets[0], true);
        let ctx = fx.ctx();
        assert!(matches!(
            check_clocks(&ctx),
            Err(PackError::ClockIntoLogic { .. })
        ));
    }

    #[test]
    fn clock_into_ff_clock_pin_accepted() {
        let fx = Fixture::lut_ff_pair();
        let ctx = fx.ctx();
        assert!(check_clocks(&ctx).is_ok());
    }

    #[test]
    fn unclustered_atom_fails_check() {
        let fx = Fixture::lut_chain(1);
        let ctx = fx.ctx();
        let lookup = AtomLookup::new(fx.netlist.atoms.len());
        let err = check_clustering(&ctx, &[], &lookup);
        assert!(err.is_err());
    }
}
