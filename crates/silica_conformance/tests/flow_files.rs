//! Round trips through the persisted flow files.

use silica_conformance::{ble_arch, Flow};
use silica_diagnostics::DiagnosticSink;
use silica_io::{
    output_clustering, read_packed_netlist, read_placement, write_placement,
    PackedNetlistExpectations, PlacedBlock, PlacementExpectations,
};
use silica_netlist::NetlistError;
use std::collections::HashSet;
use tempfile::tempdir;

fn small_netlist() -> &'static str {
    r##"{
        "top": "t",
        "atoms": [
            {"name": "l", "model": "lut4",
             "connections": [{"port": "out", "net": "n"}]},
            {"name": "f", "model": "dff",
             "connections": [
                 {"port": "D", "net": "n"},
                 {"port": "clk", "net": "clk"}
             ]}
        ],
        "clocks": ["clk"]
    }"##
}

#[test]
fn packed_netlist_roundtrip() {
    let flow = Flow::new(ble_arch(), small_netlist());
    let (result, _) = flow.pack();

    let dir = tempdir().unwrap();
    let path = dir.path().join("packed.net.json");
    output_clustering(
        &path,
        &flow.arch,
        &flow.netlist,
        &flow.interner,
        &result,
        "nl-fingerprint",
        "arch-fingerprint",
        "t",
    )
    .unwrap();

    let sink = DiagnosticSink::new();
    let expectations = PackedNetlistExpectations {
        arch: &flow.arch,
        netlist: &flow.netlist,
        interner: &flow.interner,
        netlist_id: "nl-fingerprint",
        architecture_id: "arch-fingerprint",
        top: "t",
    };
    let parsed = read_packed_netlist(&path, &expectations, true, &sink).unwrap();
    assert_eq!(parsed.clusters.len(), result.clusters.len());
    assert_eq!(parsed.top, "t");
    assert!(!sink.has_errors());

    let names: Vec<&str> = parsed.clusters[0]
        .atoms
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert!(names.contains(&"l"));
    assert!(names.contains(&"f"));
}

#[test]
fn stale_fingerprint_fatal_when_verifying() {
    let flow = Flow::new(ble_arch(), small_netlist());
    let (result, _) = flow.pack();

    let dir = tempdir().unwrap();
    let path = dir.path().join("packed.net.json");
    output_clustering(
        &path,
        &flow.arch,
        &flow.netlist,
        &flow.interner,
        &result,
        "old-fingerprint",
        "arch-fingerprint",
        "t",
    )
    .unwrap();

    let sink = DiagnosticSink::new();
    let expectations = PackedNetlistExpectations {
        arch: &flow.arch,
        netlist: &flow.netlist,
        interner: &flow.interner,
        netlist_id: "new-fingerprint",
        architecture_id: "arch-fingerprint",
        top: "t",
    };
    assert!(matches!(
        read_packed_netlist(&path, &expectations, true, &sink),
        Err(NetlistError::StaleFile { .. })
    ));

    // Without verification the mismatch is only a warning.
    let sink = DiagnosticSink::new();
    let parsed = read_packed_netlist(&path, &expectations, false, &sink).unwrap();
    assert_eq!(parsed.netlist_id, "old-fingerprint");
    assert_eq!(sink.diagnostics().len(), 1);
    assert!(!sink.has_errors());
}

#[test]
fn mismatched_top_rejected() {
    let flow = Flow::new(ble_arch(), small_netlist());
    let (result, _) = flow.pack();

    let dir = tempdir().unwrap();
    let path = dir.path().join("packed.net.json");
    output_clustering(
        &path,
        &flow.arch,
        &flow.netlist,
        &flow.interner,
        &result,
        "id",
        "id",
        "counter",
    )
    .unwrap();

    let sink = DiagnosticSink::new();
    let expectations = PackedNetlistExpectations {
        arch: &flow.arch,
        netlist: &flow.netlist,
        interner: &flow.interner,
        netlist_id: "id",
        architecture_id: "id",
        top: "t",
    };
    assert!(matches!(
        read_packed_netlist(&path, &expectations, false, &sink),
        Err(NetlistError::MismatchedTop { .. })
    ));
}

#[test]
fn placement_roundtrip_against_packed_clusters() {
    let flow = Flow::new(ble_arch(), small_netlist());
    let (result, _) = flow.pack();

    let dir = tempdir().unwrap();
    let blocks: Vec<PlacedBlock> = result
        .clusters
        .iter()
        .enumerate()
        .map(|(i, c)| PlacedBlock {
            name: flow.interner.resolve(c.name).to_string(),
            x: 1 + i as i32,
            y: 1,
            subblock: 0,
        })
        .collect();

    let (nx, ny) = result.device;
    let place_path = dir.path().join("top.place");
    write_placement(&place_path, "packed.net.json", "packed-id", nx, ny, &blocks).unwrap();

    let block_names: HashSet<String> = blocks.iter().map(|b| b.name.clone()).collect();
    let sink = DiagnosticSink::new();
    let expectations = PlacementExpectations {
        netlist_id: "packed-id",
        nx,
        ny,
        block_names: &block_names,
    };
    let parsed = read_placement(&place_path, &expectations, true, &sink).unwrap();
    assert_eq!(parsed.blocks, blocks);
    assert_eq!((parsed.nx, parsed.ny), (nx, ny));
}
