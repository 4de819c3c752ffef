//! Packed-netlist file writer and reader.
//!
//! The packer's output (`output_clustering`) is an ordered list of clusters
//! carrying each cluster's atoms and saved intra-cluster routing, prefixed
//! by provenance fingerprints of the atom netlist and the architecture. On
//! flow resumption the reader validates the file against the live netlist
//! and architecture; fingerprint mismatches are fatal only when
//! `verify_file_digests` is set.

use silica_arch::Architecture;
use silica_common::{ContentHash, Interner};
use silica_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use silica_netlist::{AtomNetlist, NetlistError};
use silica_pack::PackResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A pin record of a packed atom.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackedPin {
    /// The port name.
    pub port: String,
    /// The bit index within the port.
    pub bit: u32,
    /// The connected net name, `None` when open.
    pub net: Option<String>,
}

/// An atom inside a packed cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackedAtom {
    /// The atom name.
    pub name: String,
    /// The atom's model name.
    pub model: String,
    /// The pb-graph node (raw id) the atom is placed on.
    pub primitive: u32,
    /// Connected pins.
    pub pins: Vec<PackedPin>,
}

/// One routing entry of a cluster's saved intra-cluster routing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackedRouteEntry {
    /// The cluster pin (raw pb-graph pin id).
    pub pin: u32,
    /// The net carried by the pin.
    pub net: Option<String>,
    /// The in-cluster driver pin, if driven inside.
    pub driver_pin: Option<u32>,
    /// In-cluster sink pins.
    pub sinks: Vec<u32>,
}

/// A finalized cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackedCluster {
    /// The cluster name (`cb.<seed-atom>`).
    pub name: String,
    /// The block type name.
    pub block_type: String,
    /// The root mode name.
    pub mode: String,
    /// Atoms in pb-tree order.
    pub atoms: Vec<PackedAtom>,
    /// Saved intra-cluster routing.
    pub route: Vec<PackedRouteEntry>,
}

/// The packed-netlist file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackedNetlistFile {
    /// Fingerprint of the atom netlist this packing was produced from.
    pub netlist_id: String,
    /// Fingerprint of the architecture description.
    pub architecture_id: String,
    /// Name of the top instance.
    pub top: String,
    /// Logical device grid width after packing.
    pub nx: i32,
    /// Logical device grid height after packing.
    pub ny: i32,
    /// Clusters in packing order.
    pub clusters: Vec<PackedCluster>,
}

/// The fingerprint of a flow input file, used in provenance headers.
///
/// Hashes raw file bytes so the fingerprint is stable across processes.
pub fn file_fingerprint(bytes: &[u8]) -> ContentHash {
    ContentHash::from_bytes(bytes)
}

/// Builds the on-disk representation of a packing result.
pub fn build_packed_netlist(
    arch: &Architecture,
    netlist: &AtomNetlist,
    interner: &Interner,
    result: &PackResult,
    netlist_id: &str,
    architecture_id: &str,
    top: &str,
) -> PackedNetlistFile {
    let mut clusters = Vec::new();
    for cluster in &result.clusters {
        let block_type = &arch.block_types[cluster.block_type.as_raw() as usize];
        let root_node = &arch.nodes[block_type.root];
        let root_type = &arch.pb_types[root_node.pb_type];
        let mode_name = root_type
            .modes
            .get(cluster.pbs[cluster.root].mode)
            .map(|m| interner.resolve(m.name).to_string())
            .unwrap_or_default();

        let mut atoms = Vec::new();
        for atom_id in cluster.atoms_under(cluster.root) {
            let atom = &netlist.atoms[atom_id];
            let pb = result.lookup.atom_pb(atom_id).expect("packed atom has a pb");
            let node = cluster.pbs[pb].graph_node;
            let mut pins = Vec::new();
            for port in &atom.ports {
                for (bit, &pin) in port.pins.iter().enumerate() {
                    if let Some(net) = netlist.pins[pin].net {
                        pins.push(PackedPin {
                            port: interner.resolve(port.name).to_string(),
                            bit: bit as u32,
                            net: Some(interner.resolve(netlist.nets[net].name).to_string()),
                        });
                    }
                }
            }
            atoms.push(PackedAtom {
                name: interner.resolve(atom.name).to_string(),
                model: interner
                    .resolve(arch.models[atom.model].name)
                    .to_string(),
                primitive: node.as_raw(),
                pins,
            });
        }

        let route = cluster
            .route
            .iter()
            .map(|entry| PackedRouteEntry {
                pin: entry.pin.as_raw(),
                net: entry
                    .net
                    .map(|n| interner.resolve(netlist.nets[n].name).to_string()),
                driver_pin: entry.driver_pin.map(|p| p.as_raw()),
                sinks: entry.sinks.iter().map(|p| p.as_raw()).collect(),
            })
            .collect();

        clusters.push(PackedCluster {
            name: interner.resolve(cluster.name).to_string(),
            block_type: interner.resolve(block_type.name).to_string(),
            mode: mode_name,
            atoms,
            route,
        });
    }

    PackedNetlistFile {
        netlist_id: netlist_id.to_string(),
        architecture_id: architecture_id.to_string(),
        top: top.to_string(),
        nx: result.device.0,
        ny: result.device.1,
        clusters,
    }
}

/// Writes the packing result as a packed-netlist file.
#[allow(clippy::too_many_arguments)]
pub fn output_clustering(
    path: &Path,
    arch: &Architecture,
    netlist: &AtomNetlist,
    interner: &Interner,
    result: &PackResult,
    netlist_id: &str,
    architecture_id: &str,
    top: &str,
) -> std::io::Result<()> {
    let file = build_packed_netlist(
        arch,
        netlist,
        interner,
        result,
        netlist_id,
        architecture_id,
        top,
    );
    let out = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(out, &file).map_err(std::io::Error::from)
}

/// What the reader validates a packed netlist against.
pub struct PackedNetlistExpectations<'a> {
    /// The live architecture.
    pub arch: &'a Architecture,
    /// The live atom netlist.
    pub netlist: &'a AtomNetlist,
    /// The shared interner.
    pub interner: &'a Interner,
    /// Fingerprint of the live netlist.
    pub netlist_id: &'a str,
    /// Fingerprint of the live architecture.
    pub architecture_id: &'a str,
    /// Expected top instance name.
    pub top: &'a str,
}

/// Reads and validates a packed-netlist file.
pub fn read_packed_netlist(
    path: &Path,
    expected: &PackedNetlistExpectations<'_>,
    verify_file_digests: bool,
    sink: &DiagnosticSink,
) -> Result<PackedNetlistFile, NetlistError> {
    let file_name = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| NetlistError::Parse {
        file: file_name.clone(),
        line: 0,
        message: e.to_string(),
    })?;
    let parsed: PackedNetlistFile =
        serde_json::from_str(&content).map_err(|e| NetlistError::Parse {
            file: file_name.clone(),
            line: e.line() as u32,
            message: e.to_string(),
        })?;

    // Provenance.
    for (what, found, expected_id) in [
        ("netlist", &parsed.netlist_id, expected.netlist_id),
        ("architecture", &parsed.architecture_id, expected.architecture_id),
    ] {
        if found != expected_id {
            if verify_file_digests {
                return Err(NetlistError::StaleFile {
                    file: file_name.clone(),
                    what: what.to_string(),
                    expected: expected_id.to_string(),
                    found: found.clone(),
                });
            }
            sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::File, 2),
                    format!(
                        "packed netlist was generated from a different {what} \
                         (expected {expected_id}, found {found})"
                    ),
                )
                .in_file(&file_name),
            );
        }
    }

    if parsed.top != expected.top {
        return Err(NetlistError::MismatchedTop {
            expected: expected.top.to_string(),
            found: parsed.top.clone(),
        });
    }

    // Semantic validation against the live netlist and architecture.
    let mut seen_clusters = std::collections::HashSet::new();
    let mut seen_atoms = std::collections::HashSet::new();
    for cluster in &parsed.clusters {
        if !seen_clusters.insert(cluster.name.clone()) {
            return Err(NetlistError::DuplicateBlock(cluster.name.clone()));
        }
        let bt_name = expected.interner.get(&cluster.block_type);
        let block_type = bt_name.and_then(|n| expected.arch.find_block_type(n));
        let Some(block_type) = block_type else {
            return Err(NetlistError::UnknownPrimitive(cluster.block_type.clone()));
        };
        let root = expected.arch.block_types[block_type.as_raw() as usize].root;
        let root_type = &expected.arch.pb_types[expected.arch.nodes[root].pb_type];
        let mode_known = expected
            .interner
            .get(&cluster.mode)
            .and_then(|m| root_type.find_mode(m))
            .is_some();
        if !mode_known {
            return Err(NetlistError::UnknownMode {
                block: cluster.name.clone(),
                mode: cluster.mode.clone(),
            });
        }

        for atom in &cluster.atoms {
            if !seen_atoms.insert(atom.name.clone()) {
                return Err(NetlistError::DuplicateBlock(atom.name.clone()));
            }
            let atom_id = expected
                .interner
                .get(&atom.name)
                .and_then(|n| expected.netlist.find_atom(n));
            let Some(atom_id) = atom_id else {
                return Err(NetlistError::UnknownBlock(atom.name.clone()));
            };
            let live = &expected.netlist.atoms[atom_id];
            let live_model = expected
                .interner
                .resolve(expected.arch.models[live.model].name);
            if live_model != atom.model {
                return Err(NetlistError::ModelMismatch {
                    block: atom.name.clone(),
                    expected: live_model.to_string(),
                    found: atom.model.clone(),
                });
            }
            validate_pins(expected, atom, atom_id)?;
        }
    }

    Ok(parsed)
}

/// Checks every recorded pin against the live netlist, and that no
/// connected live pin is missing from the file.
fn validate_pins(
    expected: &PackedNetlistExpectations<'_>,
    atom: &PackedAtom,
    atom_id: silica_netlist::AtomId,
) -> Result<(), NetlistError> {
    let live = &expected.netlist.atoms[atom_id];

    for pin in &atom.pins {
        let port = expected
            .interner
            .get(&pin.port)
            .and_then(|p| live.ports.iter().find(|lp| lp.name == p));
        let Some(port) = port else {
            return Err(NetlistError::UnknownPort {
                atom: atom.name.clone(),
                port: pin.port.clone(),
            });
        };
        let Some(&live_pin) = port.pins.get(pin.bit as usize) else {
            return Err(NetlistError::PinOutOfRange {
                atom: atom.name.clone(),
                port: pin.port.clone(),
                bit: pin.bit,
            });
        };
        let live_net = expected.netlist.pins[live_pin]
            .net
            .map(|n| expected.interner.resolve(expected.netlist.nets[n].name).to_string());
        if live_net != pin.net {
            return Err(NetlistError::PinMismatch {
                block: atom.name.clone(),
                port: pin.port.clone(),
                bit: pin.bit,
                expected: live_net.unwrap_or_else(|| "open".to_string()),
                found: pin.net.clone().unwrap_or_else(|| "open".to_string()),
            });
        }
    }

    // Every connected live pin must be present in the file.
    for port in &live.ports {
        for (bit, &live_pin) in port.pins.iter().enumerate() {
            if expected.netlist.pins[live_pin].net.is_none() {
                continue;
            }
            let port_name = expected.interner.resolve(port.name);
            let present = atom
                .pins
                .iter()
                .any(|p| p.port == port_name && p.bit == bit as u32);
            if !present {
                return Err(NetlistError::MissingPin {
                    block: atom.name.clone(),
                    port: port_name.to_string(),
                    bit: bit as u32,
                });
            }
        }
    }
    Ok(())
}
