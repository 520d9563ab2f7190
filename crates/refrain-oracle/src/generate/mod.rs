//! Generation from built oracles.
//!
//! # Module Organization
//!
//! - [`policy`] - Jump-target selection shared by both generators
//! - [`single`] - Random traversal of one oracle
//! - [`align`] - Offset alignment between voices
//! - [`multi`] - Synchronized traversal of several voices
//! - [`ranking`] - Driver loops that produce and rank many sequences
//!
//! Every generator takes its randomness from a caller-supplied `rand::Rng`,
//! so a seeded [`crate::rng::create_rng`] makes the output reproducible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};

pub mod align;
pub mod multi;
pub mod policy;
pub mod ranking;
pub mod single;

#[cfg(test)]
mod tests;

pub use align::{Ensemble, EnsembleVoice, VoiceTimeline};
pub use multi::{
    sync_generate, sync_generate_with, SyncEvent, SyncGeneration, SyncRequest, VoiceGeneration,
};
pub use policy::{NeighborSelector, SelectionPolicy};
pub use ranking::{
    generate_ranked_single, generate_ranked_sync, jump_fraction, windowed_distance,
    CancelToken, GenerationBudget, RankedSingle, RankedSync, SYNC_P_MAX, SYNC_P_MIN,
};
pub use single::{generate, generate_with, Generation, SingleRequest};

/// Where a traversal starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// The root state; the first step emits state 1.
    Root,
    /// A specific state.
    Index(usize),
    /// The last state.
    NearEnd,
}

impl Default for StartPosition {
    fn default() -> Self {
        StartPosition::Index(1)
    }
}

impl StartPosition {
    /// Resolves the start state in an oracle whose last state is `last`.
    pub fn resolve(&self, last: usize) -> OracleResult<usize> {
        match *self {
            StartPosition::Root => Ok(0),
            StartPosition::NearEnd => Ok(last),
            StartPosition::Index(i) if i <= last => Ok(i),
            StartPosition::Index(i) => Err(OracleError::config(format!(
                "start state {} is past the last state {}",
                i, last
            ))),
        }
    }
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPosition::Root => f.write_str("root"),
            StartPosition::Index(i) => write!(f, "{}", i),
            StartPosition::NearEnd => f.write_str("end"),
        }
    }
}

impl FromStr for StartPosition {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "root" => Ok(StartPosition::Root),
            "end" | "near-end" | "last" => Ok(StartPosition::NearEnd),
            other => other.parse::<usize>().map(StartPosition::Index).map_err(|_| {
                OracleError::config(format!(
                    "invalid start position '{}' (expected root, end or a state index)",
                    other
                ))
            }),
        }
    }
}
