//! Flow-file readers and writers for the Silica packing flow.
//!
//! Two persisted artifacts matter to the packer: the packed-netlist file it
//! emits (and re-reads on flow resumption) and the placement file produced
//! by the downstream placer. Both begin with provenance fingerprints; the
//! `verify_file_digests` flag decides whether mismatches are fatal or
//! warnings.

#![warn(missing_docs)]

pub mod error;
pub mod packed_netlist;
pub mod place_file;

pub use error::PlacementFileError;
pub use packed_netlist::{
    build_packed_netlist, file_fingerprint, output_clustering, read_packed_netlist, PackedAtom,
    PackedCluster, PackedNetlistExpectations, PackedNetlistFile, PackedPin, PackedRouteEntry,
};
pub use place_file::{
    read_placement, write_placement, PlacedBlock, PlacementExpectations, PlacementFile,
};
