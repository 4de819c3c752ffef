//! The packer (clusterer) core of the Silica FPGA flow.
//!
//! Takes a flat netlist of primitive atoms, pre-grouped into rigid
//! molecules, and assigns each molecule to a legal position inside a
//! complex logic block of the target architecture. Placement is
//! transactional: molecules are tried, provisionally pinned, and rolled
//! back atomically when type compatibility, pin-class capacity,
//! memory-sibling equivalence, carry-chain continuity, or intra-cluster
//! routability rejects them.
//!
//! # Usage
//!
//! ```ignore
//! use silica_pack::{pack_netlist, PackerContext, PackerOptions, PinCountingRouter};
//!
//! let ctx = PackerContext { arch: &arch, netlist: &netlist, interner: &interner,
//!                           timing: &timing, options: PackerOptions::default() };
//! let mut router = PinCountingRouter::new();
//! let result = pack_netlist(&ctx, molecules, &mut router, &sink)?;
//! assert!(result.clusters.iter().all(|c| !c.atoms_under(c.root).is_empty()));
//! ```

#![warn(missing_docs)]

pub mod candidates;
pub mod check;
pub mod cluster;
pub mod context;
pub mod error;
pub mod gain;
pub mod ids;
pub mod lookahead;
pub mod pb;
pub mod placement_stats;
pub mod router;
pub mod seed;
pub mod timing;
pub mod try_pack;

pub use cluster::{pack_netlist, PackResult};
pub use context::{PackerContext, PackerOptions, SeedPolicy};
pub use error::PackError;
pub use ids::{ClusterId, PbId};
pub use pb::{AtomLookup, ClusterState, Pb, PbRouteEntry, PbStats};
pub use placement_stats::ClusterPlacementStats;
pub use router::{IntraClusterRouter, PinCountingRouter, RouterView};
pub use timing::{MapCriticality, SetupTimingInfo, UniformCriticality};
pub use try_pack::PackStatus;

/// Bound on the candidate priority array.
pub const MAX_FEASIBLE_BLOCK_ARRAY_SIZE: usize = 30;

/// Nets with more sinks than this are not walked for gain.
pub const MAX_NET_SINKS_IGNORE: usize = 256;

/// How many sinks of an ignored high-fanout net are explored as
/// candidates.
pub const MAX_HIGH_FANOUT_EXPLORE: usize = 10;

/// Highest-fanout net considered for transitive fanout exploration.
pub const MAX_TRANSITIVE_FANOUT_EXPLORE: usize = 4;

/// Bound on molecules taken from transitive fanout.
pub const MAX_TRANSITIVE_EXPLORE: usize = 4;

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for the packer's unit tests.

    use crate::context::{PackerContext, PackerOptions};
    use crate::ids::ClusterId;
    use crate::pb::{AtomLookup, ClusterState};
    use crate::placement_stats::ClusterPlacementStats;
    use crate::router::{IntraClusterRouter, RouterView};
    use crate::timing::UniformCriticality;
    use silica_arch::{ArchSpec, Architecture, BlockTypeId, PbGraphNodeId};
    use silica_common::Interner;
    use silica_netlist::{AtomId, AtomNetlist, MoleculeStore, NetId};

    /// A self-contained netlist + architecture test rig.
    pub struct Fixture {
        pub interner: Interner,
        pub arch: Architecture,
        pub netlist: AtomNetlist,
        pub molecules: MoleculeStore,
        pub atoms: Vec<AtomId>,
        pub nets: Vec<NetId>,
        pub options: PackerOptions,
        pub timing: UniformCriticality,
    }

    /// A CLB holding four lut4 primitives directly behind a crossbar.
    fn flat_clb_arch(interner: &Interner) -> Architecture {
        let spec: ArchSpec = serde_json::from_str(
            r##"{
                "name": "flat_clb",
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
            }"##,
        )
        .unwrap();
        spec.expand(interner).unwrap()
    }

    /// A CLB of four BLEs (lut4 + dff) with a `ble` pack pattern.
    fn ble_clb_arch(interner: &Interner) -> Architecture {
        let spec: ArchSpec = serde_json::from_str(
            r##"{
                "name": "ble_clb",
                "models": [
                    {"name": "lut4", "ports": [
                        {"name": "in", "kind": "Input", "width": 4},
                        {"name": "out", "kind": "Output", "width": 1}
                    ]},
                    {"name": "dff", "ports": [
                        {"name": "D", "kind": "Input", "width": 1},
                        {"name": "clk", "kind": "Clock", "width": 1, "class": "clock"},
                        {"name": "Q", "kind": "Output", "width": 1}
                    ]}
                ],
                "pb_types": [
                    {"name": "lut4", "model": "lut4"},
                    {"name": "dff", "model": "dff"},
                    {"name": "ble", "ports": [
                        {"name": "in", "kind": "Input", "width": 4},
                        {"name": "clk", "kind": "Clock", "width": 1},
                        {"name": "out", "kind": "Output", "width": 2}
                    ], "modes": [
                        {"name": "default", "children": [
                            {"pb_type": "lut4", "num_pb": 1},
                            {"pb_type": "dff", "num_pb": 1}
                        ]}
                    ]},
                    {"name": "clb", "ports": [
                        {"name": "I", "kind": "Input", "width": 16},
                        {"name": "clk", "kind": "Clock", "width": 1},
                        {"name": "O", "kind": "Output", "width": 8}
                    ], "modes": [
                        {"name": "default", "children": [{"pb_type": "ble", "num_pb": 4}]}
                    ]}
                ],
                "block_types": ["clb"],
                "patterns": [
                    {"name": "ble", "scope": "ble", "slots": ["lut4", "dff"]}
                ]
            }"##,
        )
        .unwrap();
        spec.expand(interner).unwrap()
    }

    impl Fixture {
        /// `n` lut4 atoms in a chain: `a0 → a1 → ... → a(n-1)`.
        pub fn lut_chain(n: usize) -> Self {
            let interner = Interner::new();
            let arch = flat_clb_arch(&interner);
            let model_id = arch.find_model(interner.get_or_intern("lut4")).unwrap();
            let model = arch.models[model_id].clone();

            let mut netlist = AtomNetlist::new();
            let mut atoms = Vec::new();
            for i in 0..n {
                let name = interner.get_or_intern(&format!("a{i}"));
                atoms.push(netlist.add_atom(name, &model));
            }
            let mut nets = Vec::new();
            for i in 0..n.saturating_sub(1) {
                let net = netlist.add_net(interner.get_or_intern(&format!("n{i}")));
                netlist
                    .connect(atoms[i], interner.get_or_intern("out"), 0, net, &interner)
                    .unwrap();
                netlist
                    .connect(atoms[i + 1], interner.get_or_intern("in"), 0, net, &interner)
                    .unwrap();
                nets.push(net);
            }
            netlist.rebuild_indices();
            let molecules = MoleculeStore::build(&netlist, &arch);
            Self {
                interner,
                arch,
                netlist,
                molecules,
                atoms,
                nets,
                options: PackerOptions::default(),
                timing: UniformCriticality(0.0),
            }
        }

        /// A lut feeding a dff (`l.out → f.D`) plus a clock pad net, on the
        /// BLE architecture with the `ble` pack pattern.
        pub fn lut_ff_pair() -> Self {
            let interner = Interner::new();
            let arch = ble_clb_arch(&interner);
            let lut_model = arch.models[arch.find_model(interner.get_or_intern("lut4")).unwrap()]
                .clone();
            let dff_model =
                arch.models[arch.find_model(interner.get_or_intern("dff")).unwrap()].clone();

            let mut netlist = AtomNetlist::new();
            let l = netlist.add_atom(interner.get_or_intern("l"), &lut_model);
            let f = netlist.add_atom(interner.get_or_intern("f"), &dff_model);
            let n = netlist.add_net(interner.get_or_intern("n"));
            netlist
                .connect(l, interner.get_or_intern("out"), 0, n, &interner)
                .unwrap();
            netlist
                .connect(f, interner.get_or_intern("D"), 0, n, &interner)
                .unwrap();
            let clk = netlist.add_net(interner.get_or_intern("clk"));
            netlist
                .connect(f, interner.get_or_intern("clk"), 0, clk, &interner)
                .unwrap();
            netlist.set_clock(clk, true);
            netlist.rebuild_indices();
            let molecules = MoleculeStore::build(&netlist, &arch);
            Self {
                interner,
                arch,
                netlist,
                molecules,
                atoms: vec![l, f],
                nets: vec![n, clk],
                options: PackerOptions::default(),
                timing: UniformCriticality(0.0),
            }
        }

        /// One driver lut fanning out to `num_sinks` lut inputs over a
        /// single net. `atoms[0]` drives `nets[0]`.
        pub fn star(num_sinks: usize) -> Self {
            let interner = Interner::new();
            let arch = flat_clb_arch(&interner);
            let model_id = arch.find_model(interner.get_or_intern("lut4")).unwrap();
            let model = arch.models[model_id].clone();

            let mut netlist = AtomNetlist::new();
            let driver = netlist.add_atom(interner.get_or_intern("drv"), &model);
            let net = netlist.add_net(interner.get_or_intern("fanout"));
            netlist
                .connect(driver, interner.get_or_intern("out"), 0, net, &interner)
                .unwrap();
            let mut atoms = vec![driver];
            for i in 0..num_sinks {
                let sink = netlist.add_atom(interner.get_or_intern(&format!("s{i}")), &model);
                netlist
                    .connect(sink, interner.get_or_intern("in"), 0, net, &interner)
                    .unwrap();
                atoms.push(sink);
            }
            netlist.rebuild_indices();
            let molecules = MoleculeStore::build(&netlist, &arch);
            Self {
                interner,
                arch,
                netlist,
                molecules,
                atoms,
                nets: vec![net],
                options: PackerOptions::default(),
                timing: UniformCriticality(0.0),
            }
        }

        /// `n` luts (`atoms[0..n]`) each reading four private nets, every
        /// net driven by its own feeder lut outside the cluster under
        /// test.
        pub fn wide_inputs(n: usize) -> Self {
            let interner = Interner::new();
            let arch = flat_clb_arch(&interner);
            let model_id = arch.find_model(interner.get_or_intern("lut4")).unwrap();
            let model = arch.models[model_id].clone();

            let mut netlist = AtomNetlist::new();
            let mut atoms = Vec::new();
            for i in 0..n {
                atoms.push(netlist.add_atom(interner.get_or_intern(&format!("w{i}")), &model));
            }
            let mut nets = Vec::new();
            for i in 0..n {
                for bit in 0..4u32 {
                    let feeder =
                        netlist.add_atom(interner.get_or_intern(&format!("src{i}_{bit}")), &model);
                    let net = netlist.add_net(interner.get_or_intern(&format!("i{i}_{bit}")));
                    netlist
                        .connect(feeder, interner.get_or_intern("out"), 0, net, &interner)
                        .unwrap();
                    netlist
                        .connect(atoms[i], interner.get_or_intern("in"), bit, net, &interner)
                        .unwrap();
                    nets.push(net);
                }
            }
            netlist.rebuild_indices();
            let molecules = MoleculeStore::build(&netlist, &arch);
            Self {
                interner,
                arch,
                netlist,
                molecules,
                atoms,
                nets,
                options: PackerOptions::default(),
                timing: UniformCriticality(0.0),
            }
        }

        /// No atoms at all.
        pub fn empty() -> Self {
            let interner = Interner::new();
            let arch = flat_clb_arch(&interner);
            let mut netlist = AtomNetlist::new();
            netlist.rebuild_indices();
            let molecules = MoleculeStore::build(&netlist, &arch);
            Self {
                interner,
                arch,
                netlist,
                molecules,
                atoms: Vec::new(),
                nets: Vec::new(),
                options: PackerOptions::default(),
                timing: UniformCriticality(0.0),
            }
        }

        /// A context borrowing this fixture.
        pub fn ctx(&self) -> PackerContext<'_> {
            PackerContext {
                arch: &self.arch,
                netlist: &self.netlist,
                interner: &self.interner,
                timing: &self.timing,
                options: self.options.clone(),
            }
        }

        /// An open cluster of block type 0 with the root mode selected and
        /// children opened.
        pub fn cluster_builder(&self) -> (ClusterState, AtomLookup) {
            let mut cluster = ClusterState::open(
                &self.arch,
                ClusterId::from_raw(0),
                BlockTypeId::from_raw(0),
                self.interner.get_or_intern("cb.test"),
            );
            cluster.set_root_mode(0);
            let root = cluster.root;
            cluster.open_children(&self.arch, root, 0);
            let lookup = AtomLookup::new(self.netlist.atoms.len());
            (cluster, lookup)
        }

        /// As [`cluster_builder`](Self::cluster_builder), with the first
        /// atom placed on the first primitive.
        pub fn cluster_with_first_atom_placed(&self) -> (ClusterState, AtomLookup) {
            let (mut cluster, mut lookup) = self.cluster_builder();
            let prim = self.arch.primitives(BlockTypeId::from_raw(0))[0];
            let pb = cluster.get_or_create_child(&self.arch, cluster.root, prim);
            cluster.place_atom(
                &mut lookup,
                self.atoms[0],
                pb,
                self.netlist.atoms[self.atoms[0]].name,
            );
            (cluster, lookup)
        }

        /// Fresh placement stats for block type 0 with the root mode set.
        pub fn placement_stats(&self) -> ClusterPlacementStats {
            let mut stats = ClusterPlacementStats::new(&self.arch, BlockTypeId::from_raw(0));
            let root = self.arch.block_types[0].root;
            stats.set_mode(&self.arch, root, 0);
            stats
        }
    }

    /// A router test double that rejects every routing attempt.
    #[derive(Default)]
    pub struct RejectingRouter;

    impl IntraClusterRouter for RejectingRouter {
        fn begin_cluster(&mut self, _arch: &Architecture, _block_type: BlockTypeId) {}
        fn set_pb_mode(&mut self, _node: PbGraphNodeId, _mode: usize, _enable: bool) {}
        fn add_atom_as_target(&mut self, _atom: AtomId) {}
        fn remove_atom_from_target(&mut self, _atom: AtomId) {}
        fn try_intra_lb_route(&mut self, _view: &RouterView<'_>) -> bool {
            false
        }
        fn saved_routing(&mut self, _view: &RouterView<'_>) -> Vec<crate::pb::PbRouteEntry> {
            Vec::new()
        }
        fn end_cluster(&mut self) {}
    }
}
