//! Conformance test helpers for the Silica packing flow.
//!
//! Provides reference architectures and a shared flow harness that builds a
//! netlist, pre-packs molecules, runs the packer, and returns structured
//! results for assertion in integration tests.

#![warn(missing_docs)]

use silica_arch::{ArchSpec, Architecture};
use silica_common::Interner;
use silica_diagnostics::{Diagnostic, DiagnosticSink};
use silica_netlist::{AtomNetlist, MoleculeStore, NetlistSpec};
use silica_pack::{
    pack_netlist, IntraClusterRouter, PackError, PackResult, PackerContext, PackerOptions,
    PinCountingRouter, UniformCriticality,
};

/// A CLB with a single lut4 primitive.
pub fn single_lut_arch() -> &'static str {
    r##"{
        "name": "single_lut",
        "models": [
            {"name": "lut4", "ports": [
                {"name": "in", "kind": "Input", "width": 4},
                {"name": "out", "kind": "Output", "width": 1}
            ]}
        ],
        "pb_types": [
            {"name": "lut4", "model": "lut4"},
            {"name": "clb", "ports": [
                {"name": "I", "kind": "Input", "width": 4},
                {"name": "O", "kind": "Output", "width": 1}
            ], "modes": [
                {"name": "default", "children": [{"pb_type": "lut4", "num_pb": 1}]}
            ]}
        ],
        "block_types": ["clb"]
    }"##
}

/// A CLB of four BLEs (lut4 + dff) with a `ble` pack pattern.
pub fn ble_arch() -> &'static str {
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
    }"##
}

/// A CLB holding two adder bits wired as a carry chain.
pub fn carry_arch() -> &'static str {
    r##"{
        "name": "carry_clb",
        "models": [
            {"name": "adder", "ports": [
                {"name": "a", "kind": "Input", "width": 1},
                {"name": "b", "kind": "Input", "width": 1},
                {"name": "cin", "kind": "Input", "width": 1},
                {"name": "sum", "kind": "Output", "width": 1},
                {"name": "cout", "kind": "Output", "width": 1}
            ]}
        ],
        "pb_types": [
            {"name": "adder", "model": "adder"},
            {"name": "clb", "ports": [
                {"name": "I", "kind": "Input", "width": 8},
                {"name": "cin", "kind": "Input", "width": 1},
                {"name": "O", "kind": "Output", "width": 4}
            ], "modes": [
                {"name": "arith", "children": [{"pb_type": "adder", "num_pb": 2}]}
            ]}
        ],
        "block_types": ["clb"],
        "patterns": [
            {"name": "carry_chain", "is_chain": true, "scope": "clb",
             "slots": ["adder"], "chain_root_port": "cin", "chain_out_port": "cout"}
        ]
    }"##
}

/// A memory block with two memory-class slices sharing address and clock.
pub fn memory_arch() -> &'static str {
    r##"{
        "name": "memory_block",
        "models": [
            {"name": "memory_slice", "ports": [
                {"name": "addr", "kind": "Input", "width": 2, "class": "address"},
                {"name": "data_in", "kind": "Input", "width": 1, "class": "data_in1"},
                {"name": "clk", "kind": "Clock", "width": 1, "class": "clock"},
                {"name": "data_out", "kind": "Output", "width": 1, "class": "data_out1"}
            ]}
        ],
        "pb_types": [
            {"name": "mem_slice", "model": "memory_slice", "memory_class": true},
            {"name": "memory", "ports": [
                {"name": "addr", "kind": "Input", "width": 2},
                {"name": "data_in", "kind": "Input", "width": 2},
                {"name": "clk", "kind": "Clock", "width": 1},
                {"name": "data_out", "kind": "Output", "width": 2}
            ], "modes": [
                {"name": "dual", "children": [{"pb_type": "mem_slice", "num_pb": 2}]}
            ]},
            {"name": "memblock", "ports": [
                {"name": "I", "kind": "Input", "width": 8},
                {"name": "clk", "kind": "Clock", "width": 1},
                {"name": "O", "kind": "Output", "width": 4}
            ], "modes": [
                {"name": "default", "children": [{"pb_type": "memory", "num_pb": 2}]}
            ]}
        ],
        "block_types": ["memblock"]
    }"##
}

/// A flow harness: architecture, netlist, molecules and options in one
/// place.
pub struct Flow {
    /// The shared interner.
    pub interner: Interner,
    /// The expanded architecture.
    pub arch: Architecture,
    /// The atom netlist.
    pub netlist: AtomNetlist,
    /// Pre-packed molecules.
    pub molecules: MoleculeStore,
    /// Packer options.
    pub options: PackerOptions,
}

impl Flow {
    /// Builds a flow from an architecture JSON and a netlist JSON.
    pub fn new(arch_json: &str, netlist_json: &str) -> Self {
        let interner = Interner::new();
        let arch_spec: ArchSpec = serde_json::from_str(arch_json).expect("valid arch JSON");
        let arch = arch_spec.expand(&interner).expect("arch expands");
        let netlist_spec: NetlistSpec =
            serde_json::from_str(netlist_json).expect("valid netlist JSON");
        let netlist = netlist_spec.build(&arch, &interner).expect("netlist builds");
        let molecules = MoleculeStore::build(&netlist, &arch);
        Self {
            interner,
            arch,
            netlist,
            molecules,
            options: PackerOptions::default(),
        }
    }

    /// Runs the packer with the reference pin-counting router.
    pub fn pack(&self) -> (PackResult, Vec<Diagnostic>) {
        let mut router = PinCountingRouter::new();
        let result = self
            .pack_with_router(&mut router)
            .expect("reference packing succeeds");
        result
    }

    /// Runs the packer with a caller-provided router.
    pub fn pack_with_router(
        &self,
        router: &mut dyn IntraClusterRouter,
    ) -> Result<(PackResult, Vec<Diagnostic>), PackError> {
        let timing = UniformCriticality(0.0);
        let ctx = PackerContext {
            arch: &self.arch,
            netlist: &self.netlist,
            interner: &self.interner,
            timing: &timing,
            options: self.options.clone(),
        };
        let sink = DiagnosticSink::new();
        let result = pack_netlist(&ctx, self.molecules.clone(), router, &sink)?;
        Ok((result, sink.take_all()))
    }

    /// The atom id for a netlist block name.
    pub fn atom(&self, name: &str) -> silica_netlist::AtomId {
        self.netlist
            .find_atom(self.interner.get_or_intern(name))
            .unwrap_or_else(|| panic!("no atom named '{name}'"))
    }

    /// The resolved name of a cluster.
    pub fn cluster_name(&self, result: &PackResult, index: usize) -> String {
        self.interner
            .resolve(result.clusters[index].name)
            .to_string()
    }
}
