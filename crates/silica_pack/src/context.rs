//! Explicit packer context and options.
//!
//! Everything the packer reads is threaded through [`PackerContext`] by
//! reference; there is no process-wide state.

use crate::timing::SetupTimingInfo;
use serde::{Deserialize, Serialize};
use silica_arch::Architecture;
use silica_common::Interner;
use silica_netlist::AtomNetlist;

/// How the next seed molecule is chosen when opening a cluster.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum SeedPolicy {
    /// Highest `num_ext_inputs` wins.
    MaxInputs,
    /// Most timing-critical atom wins.
    Timing,
    /// Blend of criticality, external inputs, and molecule size.
    Blend,
}

/// Knobs controlling a packing run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackerOptions {
    /// Weight of the timing term in the total gain.
    pub alpha: f32,
    /// Weight of the connection term against the sharing term.
    pub beta: f32,
    /// Enables the timing gain term.
    pub timing_driven: bool,
    /// Enables the connection gain term.
    pub connection_driven: bool,
    /// Allows packing unconnected molecules when no candidate has gain.
    pub allow_unrelated_clustering: bool,
    /// Treats clocks as globally routed (clock nets earn no gain).
    pub global_clocks: bool,
    /// Seed selection policy.
    pub seed_policy: SeedPolicy,
    /// Estimated delay of nets between clusters, handed to the timing
    /// analyzer.
    pub inter_cluster_net_delay: f32,
    /// RNG seed recorded for downstream flow stages; the packer itself is
    /// deterministic.
    pub seed: u64,
    /// Device aspect ratio (width / height) maintained while growing.
    pub aspect: f32,
}

impl Default for PackerOptions {
    fn default() -> Self {
        Self {
            alpha: 0.75,
            beta: 0.9,
            timing_driven: true,
            connection_driven: true,
            allow_unrelated_clustering: true,
            global_clocks: true,
            seed_policy: SeedPolicy::Blend,
            inter_cluster_net_delay: 1.0,
            seed: 1,
            aspect: 1.0,
        }
    }
}

/// The read-only context a packing run works against.
pub struct PackerContext<'a> {
    /// The architecture view.
    pub arch: &'a Architecture,
    /// The atom netlist.
    pub netlist: &'a AtomNetlist,
    /// The shared name interner.
    pub interner: &'a Interner,
    /// Setup criticalities from the external timing analyzer.
    pub timing: &'a dyn SetupTimingInfo,
    /// Run options.
    pub options: PackerOptions,
}
