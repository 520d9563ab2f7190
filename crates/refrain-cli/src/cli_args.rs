//! CLI argument definitions for the Refrain command-line interface.
//!
//! All `#[derive(Parser)]` and `#[derive(Subcommand)]` types are defined here,
//! keeping `main.rs` focused on dispatch logic.

use clap::{Args, Parser, Subcommand};
use refrain_oracle::{DistanceKind, IrMethod, SelectionPolicy, StartPosition, ThresholdSweep};

/// Refrain - Pattern-Indexed Music Generation
#[derive(Parser)]
#[command(name = "refrain")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Build an oracle from a corpus and report its structure
    Build {
        /// Path to the corpus file (JSON)
        #[arg(short, long)]
        corpus: String,

        /// Merge threshold (overrides the corpus; swept when neither sets one)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Distance (cosine, euclidean)
        #[arg(long)]
        distance: Option<DistanceKind>,

        #[command(flatten)]
        sweep: SweepArgs,

        /// Write the serialized oracle to this file
        #[arg(short, long)]
        output: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Rank candidate thresholds by information rate
    Threshold {
        /// Path to the corpus file (JSON)
        #[arg(short, long)]
        corpus: String,

        /// Distance (cosine, euclidean)
        #[arg(long)]
        distance: Option<DistanceKind>,

        #[command(flatten)]
        sweep: SweepArgs,

        /// Print only the best N candidates
        #[arg(long)]
        top: Option<usize>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Generate sequences from a single-voice corpus
    Generate {
        /// Path to the corpus file (JSON)
        #[arg(short, long)]
        corpus: String,

        /// Merge threshold (overrides the corpus)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Events per sequence
        #[arg(short, long, default_value_t = 16)]
        length: usize,

        /// Number of sequences
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Continuation probability; ranked generation when omitted
        #[arg(short, long = "probability")]
        p: Option<f64>,

        /// Minimum repeated-suffix length of jump targets (with --probability)
        #[arg(long, default_value_t = 0)]
        min_lrs: usize,

        #[command(flatten)]
        walk: WalkArgs,

        /// Write the JSON result to this file
        #[arg(short, long)]
        output: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Generate synchronized voices from a multi-voice corpus
    Sync {
        /// Path to the multi-voice corpus file (JSON)
        #[arg(short, long)]
        corpus: String,

        /// Merge threshold for every voice (overrides the corpus)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Steps per result
        #[arg(short, long, default_value_t = 16)]
        length: usize,

        /// Number of results
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Suffix fallbacks before a copy step gives up
        #[arg(long, default_value_t = refrain_oracle::generate::multi::DEFAULT_MAX_FALLBACKS)]
        max_fallbacks: usize,

        #[command(flatten)]
        walk: WalkArgs,

        /// Write the JSON result to this file
        #[arg(short, long)]
        output: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },
}

/// Threshold sweep options.
#[derive(Args)]
pub(crate) struct SweepArgs {
    /// First candidate threshold
    #[arg(long, default_value_t = 0.0)]
    pub sweep_start: f64,

    /// End of the candidate range (exclusive)
    #[arg(long, default_value_t = 1.0)]
    pub sweep_stop: f64,

    /// Distance between candidates
    #[arg(long, default_value_t = 0.1)]
    pub sweep_step: f64,

    /// Weight of the context-free cost
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,

    /// Information-rate formula (cumulative, max-lrs, fixed)
    #[arg(long, default_value = "cumulative")]
    pub ir_method: IrMethod,
}

impl SweepArgs {
    pub fn to_sweep(&self) -> ThresholdSweep {
        ThresholdSweep {
            alpha: self.alpha,
            method: self.ir_method,
            ..ThresholdSweep::new(self.sweep_start, self.sweep_stop, self.sweep_step)
        }
    }
}

/// Options shared by the generators.
#[derive(Args)]
pub(crate) struct WalkArgs {
    /// Base seed
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,

    /// Start state (root, end, or a state index)
    #[arg(long, default_value = "1")]
    pub start: StartPosition,

    /// Jump-target policy (uniform, max-lrs, lrs-weighted)
    #[arg(long)]
    pub policy: Option<SelectionPolicy>,

    /// Attempts before a ranked loop gives up
    #[arg(long, default_value_t = 1000)]
    pub max_attempts: usize,

    /// Wall-clock limit for a ranked loop, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}
