//! The intra-cluster router seam.
//!
//! Detailed legalization routing inside a cluster is delegated through
//! [`IntraClusterRouter`]; calls nest in a stack discipline mirroring the
//! try-place recursion (targets are added as atoms are tentatively placed
//! and removed in reverse on rollback). The crate ships
//! [`PinCountingRouter`], a conservative reference implementation that
//! checks per-class pin usage and records pin-level route tables.

use crate::context::PackerContext;
use crate::pb::{AtomLookup, ClusterState, PbRouteEntry};
use silica_arch::{Architecture, BlockTypeId, PbGraphNodeId, PbGraphPinId, PortKind};
use silica_netlist::{AtomId, NetId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Read-only view handed to the router on route and save calls.
pub struct RouterView<'a> {
    /// The architecture.
    pub ctx: &'a PackerContext<'a>,
    /// The cluster being routed.
    pub cluster: &'a ClusterState,
    /// The atom mapping.
    pub lookup: &'a AtomLookup,
}

/// The external intra-cluster router contract.
pub trait IntraClusterRouter {
    /// Allocates routing state for a newly opened cluster.
    fn begin_cluster(&mut self, arch: &Architecture, block_type: BlockTypeId);

    /// Enables or disables a pb mode selection.
    fn set_pb_mode(&mut self, node: PbGraphNodeId, mode: usize, enable: bool);

    /// Adds an atom to the target set.
    fn add_atom_as_target(&mut self, atom: AtomId);

    /// Removes an atom from the target set (rollback).
    fn remove_atom_from_target(&mut self, atom: AtomId);

    /// Attempts to route the current target set.
    fn try_intra_lb_route(&mut self, view: &RouterView<'_>) -> bool;

    /// Extracts the route tables for the routed target set.
    fn saved_routing(&mut self, view: &RouterView<'_>) -> Vec<PbRouteEntry>;

    /// Releases routing state (cluster finalized or discarded).
    fn end_cluster(&mut self);
}

/// Conservative reference router: legal iff every pin class across the
/// cluster hierarchy has capacity for the nets that must cross it.
#[derive(Default)]
pub struct PinCountingRouter {
    targets: BTreeSet<AtomId>,
    active: bool,
}

impl PinCountingRouter {
    /// Creates an idle router.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pb-graph pin of an atom pin, through the placement mapping.
    fn graph_pin(view: &RouterView<'_>, pin: silica_netlist::PinId) -> Option<PbGraphPinId> {
        let p = &view.ctx.netlist.pins[pin];
        let pb = view.lookup.atom_pb(p.atom)?;
        let node = view.cluster.pbs[pb].graph_node;
        let port_name = view.ctx.netlist.atoms[p.atom].ports[p.port as usize].name;
        view.ctx.arch.primitive_pin(node, port_name, p.bit)
    }
}

impl IntraClusterRouter for PinCountingRouter {
    fn begin_cluster(&mut self, _arch: &Architecture, _block_type: BlockTypeId) {
        assert!(!self.active, "router data already allocated");
        self.targets.clear();
        self.active = true;
    }

    fn set_pb_mode(&mut self, _node: PbGraphNodeId, _mode: usize, _enable: bool) {}

    fn add_atom_as_target(&mut self, atom: AtomId) {
        self.targets.insert(atom);
    }

    fn remove_atom_from_target(&mut self, atom: AtomId) {
        self.targets.remove(&atom);
    }

    fn try_intra_lb_route(&mut self, view: &RouterView<'_>) -> bool {
        let arch = view.ctx.arch;
        let netlist = view.ctx.netlist;

        // Per (container node, class) sets of nets needing a boundary pin.
        let mut input_use: HashMap<(PbGraphNodeId, u32), BTreeSet<NetId>> = HashMap::new();
        let mut output_use: HashMap<(PbGraphNodeId, u32), BTreeSet<NetId>> = HashMap::new();

        for &atom in &self.targets {
            for pin in netlist.atom_pins(atom) {
                let Some(net) = netlist.pins[pin].net else {
                    continue;
                };
                let Some(graph_pin) = Self::graph_pin(view, pin) else {
                    return false;
                };
                let prim_node = arch.pins[graph_pin].node;
                let kind = arch.pins[graph_pin].kind;

                let mut anc = arch.nodes[prim_node].parent;
                while let Some(node) = anc {
                    let depth = arch.nodes[node].depth as usize;
                    let class = arch.pins[graph_pin].parent_pin_class[depth];

                    if kind.is_input_side() {
                        let absorbed = netlist.nets[net].driver.is_some_and(|driver| {
                            let driver_atom = netlist.pins[driver].atom;
                            self.targets.contains(&driver_atom)
                                && Self::graph_pin(view, driver).is_some_and(|dp| {
                                    arch.nodes[arch.pins[dp].node].depth > depth as u32
                                        && arch.ancestor_at_depth(arch.pins[dp].node, depth as u32)
                                            == node
                                        && arch.pins[dp].connectable[depth].contains(&graph_pin)
                                })
                        });
                        if !absorbed {
                            input_use.entry((node, class)).or_default().insert(net);
                        }
                    } else {
                        let sinks = &netlist.nets[net].sinks;
                        let reachable = &arch.pins[graph_pin].connectable[depth];
                        let absorbed = reachable.len() >= sinks.len()
                            && sinks.iter().all(|&s| {
                                let sink_atom = netlist.pins[s].atom;
                                self.targets.contains(&sink_atom)
                                    && Self::graph_pin(view, s)
                                        .is_some_and(|sp| reachable.contains(&sp))
                            });
                        if !absorbed {
                            output_use.entry((node, class)).or_default().insert(net);
                        }
                    }
                    anc = arch.nodes[node].parent;
                }
            }
        }

        for ((node, class), nets) in &input_use {
            let capacity = arch.nodes[*node].input_pin_classes[*class as usize].capacity;
            if nets.len() > capacity as usize {
                return false;
            }
        }
        for ((node, class), nets) in &output_use {
            let capacity = arch.nodes[*node].output_pin_classes[*class as usize].capacity;
            if nets.len() > capacity as usize {
                return false;
            }
        }
        true
    }

    fn saved_routing(&mut self, view: &RouterView<'_>) -> Vec<PbRouteEntry> {
        let netlist = view.ctx.netlist;
        let mut entries: BTreeMap<PbGraphPinId, PbRouteEntry> = BTreeMap::new();

        for &atom in &self.targets {
            for pin in netlist.atom_pins(atom) {
                let Some(net) = netlist.pins[pin].net else {
                    continue;
                };
                let Some(graph_pin) = Self::graph_pin(view, pin) else {
                    continue;
                };
                let driver_pin = netlist.nets[net].driver.and_then(|d| {
                    let driver_atom = netlist.pins[d].atom;
                    self.targets
                        .contains(&driver_atom)
                        .then(|| Self::graph_pin(view, d))
                        .flatten()
                });
                let sinks = netlist.nets[net]
                    .sinks
                    .iter()
                    .filter(|&&s| self.targets.contains(&netlist.pins[s].atom))
                    .filter_map(|&s| Self::graph_pin(view, s))
                    .collect();
                entries.insert(
                    graph_pin,
                    PbRouteEntry {
                        pin: graph_pin,
                        net: Some(net),
                        driver_pin,
                        sinks,
                    },
                );
            }
        }
        entries.into_values().collect()
    }

    fn end_cluster(&mut self) {
        self.targets.clear();
        self.active = false;
    }
}
