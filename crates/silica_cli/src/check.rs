//! The `silica check` subcommand: validate flow files on resumption.

use crate::{CheckArgs, Cli};
use silica_arch::ArchSpec;
use silica_common::Interner;
use silica_diagnostics::DiagnosticSink;
use silica_io::{
    file_fingerprint, read_packed_netlist, read_placement, PackedNetlistExpectations,
    PlacementExpectations,
};
use silica_netlist::NetlistSpec;
use std::collections::HashSet;
use std::error::Error;

pub fn run(cli: &Cli, args: &CheckArgs) -> Result<(), Box<dyn Error>> {
    let interner = Interner::new();

    let arch_bytes = std::fs::read(&args.arch)?;
    let arch_spec: ArchSpec = serde_json::from_slice(&arch_bytes)?;
    let architecture_id = arch_spec.fingerprint().to_string();
    let arch = arch_spec.expand(&interner)?;

    let netlist_bytes = std::fs::read(&args.netlist)?;
    let netlist_spec: NetlistSpec = serde_json::from_slice(&netlist_bytes)?;
    let netlist_id = file_fingerprint(&netlist_bytes).to_string();
    let netlist = netlist_spec.build(&arch, &interner)?;

    let sink = DiagnosticSink::new();
    let expectations = PackedNetlistExpectations {
        arch: &arch,
        netlist: &netlist,
        interner: &interner,
        netlist_id: &netlist_id,
        architecture_id: &architecture_id,
        top: &netlist_spec.top,
    };
    let packed =
        read_packed_netlist(&args.packed, &expectations, args.verify_file_digests, &sink)?;
    if !cli.quiet {
        println!(
            "{}: {} clusters, device {} x {}",
            args.packed.display(),
            packed.clusters.len(),
            packed.nx,
            packed.ny
        );
    }

    if let Some(place) = &args.place {
        let packed_bytes = std::fs::read(&args.packed)?;
        let packed_id = file_fingerprint(&packed_bytes).to_string();
        let block_names: HashSet<String> =
            packed.clusters.iter().map(|c| c.name.clone()).collect();
        let place_expectations = PlacementExpectations {
            netlist_id: &packed_id,
            nx: packed.nx,
            ny: packed.ny,
            block_names: &block_names,
        };
        let placement =
            read_placement(place, &place_expectations, args.verify_file_digests, &sink)?;
        if !cli.quiet {
            println!("{}: {} placed blocks", place.display(), placement.blocks.len());
        }
    }

    for diag in sink.take_all() {
        if !cli.quiet {
            eprintln!("{diag}");
        }
    }
    Ok(())
}
