//! Silica CLI — the command-line interface for the Silica packing flow.
//!
//! Provides `silica pack` to cluster a technology-mapped netlist onto an
//! architecture and `silica check` to validate previously produced flow
//! files against the current inputs.

#![warn(missing_docs)]

mod check;
mod pack;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// Silica — FPGA packing flow.
#[derive(Parser, Debug)]
#[command(name = "silica", version, about = "Silica FPGA packing flow")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pack a netlist into clusters.
    Pack(PackArgs),
    /// Validate flow files against the current netlist and architecture.
    Check(CheckArgs),
}

/// Seed selection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClusterSeed {
    /// Highest external input count wins.
    #[value(name = "max_inputs")]
    MaxInputs,
    /// Most timing-critical atom wins.
    #[value(name = "timing")]
    Timing,
    /// Blend of criticality, inputs and molecule size.
    #[value(name = "blend")]
    Blend,
}

/// Arguments for the `silica pack` subcommand.
#[derive(Parser, Debug)]
pub struct PackArgs {
    /// Architecture description (JSON).
    #[arg(short, long)]
    pub arch: PathBuf,

    /// Technology-mapped atom netlist (JSON).
    #[arg(short, long)]
    pub netlist: PathBuf,

    /// Output packed-netlist file.
    #[arg(short, long, default_value = "packed.net.json")]
    pub output: PathBuf,

    /// RNG seed recorded for downstream flow stages.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Seed selection policy.
    #[arg(long = "cluster_seed", value_enum, default_value_t = ClusterSeed::Blend)]
    pub cluster_seed: ClusterSeed,

    /// Weight of the timing term in the total gain.
    #[arg(long, default_value_t = 0.75)]
    pub alpha: f32,

    /// Weight of the connection term against the sharing term.
    #[arg(long, default_value_t = 0.9)]
    pub beta: f32,

    /// Allow packing unconnected molecules when no candidate has gain.
    #[arg(long = "allow_unrelated_clustering", default_value_t = true, action = ArgAction::Set)]
    pub allow_unrelated_clustering: bool,

    /// Enable the connection gain term.
    #[arg(long = "connection_driven_clustering", default_value_t = true, action = ArgAction::Set)]
    pub connection_driven_clustering: bool,

    /// Enable the timing gain term.
    #[arg(long = "timing_driven_clustering", default_value_t = true, action = ArgAction::Set)]
    pub timing_driven_clustering: bool,

    /// Estimated delay of nets between clusters.
    #[arg(long = "inter_cluster_net_delay", default_value_t = 1.0)]
    pub inter_cluster_net_delay: f32,

    /// Device aspect ratio (width / height).
    #[arg(long, default_value_t = 1.0)]
    pub aspect: f32,
}

/// Arguments for the `silica check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Architecture description (JSON).
    #[arg(short, long)]
    pub arch: PathBuf,

    /// Technology-mapped atom netlist (JSON).
    #[arg(short, long)]
    pub netlist: PathBuf,

    /// Packed-netlist file to validate.
    #[arg(short, long)]
    pub packed: PathBuf,

    /// Placement file to validate, if any.
    #[arg(long)]
    pub place: Option<PathBuf>,

    /// Treat provenance fingerprint mismatches as errors.
    #[arg(long = "verify_file_digests", default_value_t = true, action = ArgAction::Set)]
    pub verify_file_digests: bool,
}

fn main() {
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Pack(args) => pack::run(&cli, args),
        Command::Check(args) => check::run(&cli, args),
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
