//! The `silica pack` subcommand.

use crate::{Cli, ClusterSeed, PackArgs};
use silica_arch::ArchSpec;
use silica_diagnostics::DiagnosticSink;
use silica_io::{file_fingerprint, output_clustering};
use silica_netlist::{MoleculeStore, NetlistSpec};
use silica_pack::{
    pack_netlist, PackerContext, PackerOptions, PinCountingRouter, SeedPolicy,
    UniformCriticality,
};
use silica_common::Interner;
use std::error::Error;

pub fn run(cli: &Cli, args: &PackArgs) -> Result<(), Box<dyn Error>> {
    let interner = Interner::new();

    let arch_bytes = std::fs::read(&args.arch)?;
    let arch_spec: ArchSpec = serde_json::from_slice(&arch_bytes)?;
    let architecture_id = arch_spec.fingerprint().to_string();
    let arch = arch_spec.expand(&interner)?;

    let netlist_bytes = std::fs::read(&args.netlist)?;
    let netlist_spec: NetlistSpec = serde_json::from_slice(&netlist_bytes)?;
    let netlist_id = file_fingerprint(&netlist_bytes).to_string();
    let netlist = netlist_spec.build(&arch, &interner)?;

    let molecules = MoleculeStore::build(&netlist, &arch);

    let options = PackerOptions {
        alpha: args.alpha,
        beta: args.beta,
        timing_driven: args.timing_driven_clustering,
        connection_driven: args.connection_driven_clustering,
        allow_unrelated_clustering: args.allow_unrelated_clustering,
        global_clocks: true,
        seed_policy: match args.cluster_seed {
            ClusterSeed::MaxInputs => SeedPolicy::MaxInputs,
            ClusterSeed::Timing => SeedPolicy::Timing,
            ClusterSeed::Blend => SeedPolicy::Blend,
        },
        inter_cluster_net_delay: args.inter_cluster_net_delay,
        seed: args.seed,
        aspect: args.aspect,
    };

    // Pre-cluster criticalities come from the external timing analyzer;
    // without one every pin is equally uncritical.
    let timing = UniformCriticality(0.0);
    let ctx = PackerContext {
        arch: &arch,
        netlist: &netlist,
        interner: &interner,
        timing: &timing,
        options,
    };

    let sink = DiagnosticSink::new();
    let mut router = PinCountingRouter::new();
    let result = pack_netlist(&ctx, molecules, &mut router, &sink)?;

    output_clustering(
        &args.output,
        &arch,
        &netlist,
        &interner,
        &result,
        &netlist_id,
        &architecture_id,
        &netlist_spec.top,
    )?;

    for diag in sink.take_all() {
        if !cli.quiet {
            eprintln!("{diag}");
        }
    }
    if !cli.quiet {
        println!(
            "packed {} atoms into {} clusters (device {} x {}) -> {}",
            netlist.atoms.len(),
            result.clusters.len(),
            result.device.0,
            result.device.1,
            args.output.display()
        );
        if cli.verbose {
            for cluster in &result.clusters {
                println!(
                    "  {}: {} atoms",
                    interner.resolve(cluster.name),
                    cluster.atoms_under(cluster.root).len()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Command};
    use clap::Parser;

    const ARCH_JSON: &str = r##"{
        "name": "t",
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
    }"##;

    const NETLIST_JSON: &str = r##"{
        "top": "t",
        "atoms": [
            {"name": "a", "model": "lut4",
             "connections": [{"port": "out", "net": "n"}]},
            {"name": "b", "model": "lut4",
             "connections": [{"port": "in", "bit": 0, "net": "n"}]}
        ]
    }"##;

    #[test]
    fn pack_end_to_end_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let arch_path = dir.path().join("arch.json");
        let netlist_path = dir.path().join("top.json");
        let out_path = dir.path().join("packed.net.json");
        std::fs::write(&arch_path, ARCH_JSON).unwrap();
        std::fs::write(&netlist_path, NETLIST_JSON).unwrap();

        let cli = Cli::parse_from([
            "silica",
            "--quiet",
            "pack",
            "--arch",
            arch_path.to_str().unwrap(),
            "--netlist",
            netlist_path.to_str().unwrap(),
            "--output",
            out_path.to_str().unwrap(),
        ]);
        let Command::Pack(args) = &cli.command else {
            panic!("expected pack subcommand");
        };
        run(&cli, args).unwrap();

        let written = std::fs::read_to_string(&out_path).unwrap();
        assert!(written.contains("\"clusters\""));
        assert!(written.contains("cb.a") || written.contains("cb.b"));
    }

    #[test]
    fn pack_reports_netlist_errors() {
        let dir = tempfile::tempdir().unwrap();
        let arch_path = dir.path().join("arch.json");
        let netlist_path = dir.path().join("top.json");
        std::fs::write(&arch_path, ARCH_JSON).unwrap();
        std::fs::write(
            &netlist_path,
            r##"{"top": "t", "atoms": [{"name": "a", "model": "mystery"}]}"##,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "silica",
            "--quiet",
            "pack",
            "--arch",
            arch_path.to_str().unwrap(),
            "--netlist",
            netlist_path.to_str().unwrap(),
        ]);
        let Command::Pack(args) = &cli.command else {
            panic!("expected pack subcommand");
        };
        let err = run(&cli, args);
        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("mystery"));
    }
}
