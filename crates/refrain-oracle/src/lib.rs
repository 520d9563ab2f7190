//! Refrain Oracle - Pattern Indexing and Recombinant Sequence Generation
//!
//! This crate indexes a sequence of feature vectors (one per musical event)
//! as a variable-Markov oracle: an automaton whose forward transitions and
//! suffix links record which events continue which contexts and where
//! earlier material repeats. New sequences are produced by walking the
//! automaton, mostly copying forward and occasionally jumping along suffix
//! links to another point that shares the current context.
//!
//! # Features
//!
//! - **Incremental construction**: Continuous (thresholded distance) and symbolic (exact) builders
//! - **Threshold selection**: Information-rate sweep over candidate thresholds, scored in parallel
//! - **Single-voice generation**: Forward copying with suffix-link jumps under a pluggable policy
//! - **Multi-voice generation**: Several oracles walked in lockstep on a shared time axis
//!
//! # Determinism
//!
//! Generation takes all of its randomness from a caller-supplied RNG. The
//! ranked driver loops derive one PCG32 stream per attempt from a base seed
//! through BLAKE3, so the same seed always yields the same ranked output.
//!
//! # Example
//!
//! ```ignore
//! use refrain_oracle::{build_oracle, create_rng, generate, OracleParams, SingleRequest};
//!
//! let features = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.1]];
//! let params = OracleParams::new(2).with_threshold(0.1);
//! let oracle = build_oracle(&features, &params)?;
//!
//! let mut rng = create_rng(42);
//! let result = generate(&oracle, &SingleRequest::new(8, 0.5), &mut rng)?;
//! println!("{:?}", result.sequence);
//! ```
//!
//! # Module Structure
//!
//! - [`oracle`]: The automaton and its read-only queries
//! - [`builder`]: Incremental construction
//! - [`distance`]: Weighted distances and the fixed-dimension gate
//! - [`config`]: Build parameters and JSON corpus inputs
//! - [`compror`]: Compression codes and information rate
//! - [`threshold`]: Threshold sweep
//! - [`generate`]: Single and synchronized generators, ranked driver loops
//! - [`render`]: Mapping generated states back to feature vectors

pub mod builder;
pub mod compror;
pub mod config;
pub mod distance;
pub mod error;
pub mod generate;
pub mod oracle;
pub mod render;
pub mod rng;
pub mod threshold;

// Re-export main types
pub use builder::{
    build_oracle, build_symbolic_oracle, ContinuousBuilder, OracleBuilder, SymbolicBuilder,
};
pub use compror::{encode, information_rate, segment, Codeword, InformationRate, IrMethod};
pub use config::{validate_features, Corpus, MultiCorpus, OracleParams, VoiceCorpus};
pub use distance::{DistanceKind, FeatureMetric, FIXED_DIMENSION_SENTINEL};
pub use error::{OracleError, OracleResult};
pub use generate::{
    generate, generate_ranked_single, generate_ranked_sync, sync_generate, CancelToken, Ensemble,
    GenerationBudget, Generation, SelectionPolicy, SingleRequest, StartPosition, SyncEvent,
    SyncGeneration, SyncRequest,
};
pub use oracle::{Oracle, OracleKind};
pub use render::{render_single, render_voices, RenderedEvent, RenderedVoice};
pub use rng::{create_attempt_rng, create_rng, derive_attempt_seed};
pub use threshold::{
    build_with_best_threshold, select_threshold, ThresholdScore, ThresholdSelection,
    ThresholdSweep,
};

/// Crate version for reporting.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
