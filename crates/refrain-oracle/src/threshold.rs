//! Threshold selection by information rate.
//!
//! The merge threshold controls how coarse the symbol alphabet is: too low
//! and every vector is its own symbol, too high and everything collapses into
//! one. The sweep builds one oracle per candidate threshold, scores each by
//! total information rate, and ranks the candidates.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::build_oracle;
use crate::compror::{information_rate, IrMethod};
use crate::config::{validate_features, OracleParams};
use crate::error::{OracleError, OracleResult};
use crate::oracle::Oracle;

/// Most candidates one sweep may build oracles for.
pub const MAX_SWEEP_CANDIDATES: usize = 10_000;

fn default_alpha() -> f64 {
    1.0
}

/// Candidate range and scoring options for the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSweep {
    /// First candidate (inclusive).
    pub start: f64,
    /// End of the range (exclusive).
    pub stop: f64,
    /// Distance between candidates.
    pub step: f64,
    /// Weight of the context-free cost in the information rate.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Information-rate formula.
    #[serde(default)]
    pub method: IrMethod,
}

impl Default for ThresholdSweep {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 1.0,
            step: 0.1,
            alpha: default_alpha(),
            method: IrMethod::default(),
        }
    }
}

impl ThresholdSweep {
    /// Creates a sweep over `[start, stop)` in steps of `step`.
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self {
            start,
            stop,
            step,
            ..Self::default()
        }
    }

    /// Validates the range.
    pub fn validate(&self) -> OracleResult<()> {
        if !(self.start.is_finite() && self.stop.is_finite() && self.step.is_finite()) {
            return Err(OracleError::config(format!(
                "sweep bounds must be finite, got start={} stop={} step={}",
                self.start, self.stop, self.step
            )));
        }
        if self.step <= 0.0 {
            return Err(OracleError::config(format!(
                "sweep step must be positive, got {}",
                self.step
            )));
        }
        if self.stop <= self.start {
            return Err(OracleError::config(format!(
                "sweep stop ({}) must exceed start ({})",
                self.stop, self.start
            )));
        }
        if self.start < 0.0 {
            return Err(OracleError::config(format!(
                "sweep start must be non-negative, got {}",
                self.start
            )));
        }
        if !self.alpha.is_finite() {
            return Err(OracleError::config("alpha must be finite"));
        }
        let span = ((self.stop - self.start) / self.step).ceil();
        if span > MAX_SWEEP_CANDIDATES as f64 {
            return Err(OracleError::config(format!(
                "sweep of step {} over [{}, {}) exceeds {} candidates",
                self.step, self.start, self.stop, MAX_SWEEP_CANDIDATES
            )));
        }
        Ok(())
    }

    /// Candidate thresholds, `start + i * step` while below `stop`.
    pub fn candidates(&self) -> OracleResult<Vec<f64>> {
        self.validate()?;
        // One extra index absorbs rounding in the division.
        let bound = ((self.stop - self.start) / self.step).ceil() as usize + 1;
        Ok((0..bound)
            .map(|i| self.start + i as f64 * self.step)
            .take_while(|&t| t < self.stop)
            .collect())
    }
}

/// Score of one candidate threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdScore {
    /// Candidate threshold.
    pub threshold: f64,
    /// Total information rate.
    pub score: f64,
    /// Sum of the context-free cost.
    pub h0: f64,
    /// Sum of the compror cost.
    pub h1: f64,
    /// States linked to the root.
    pub clusters: usize,
}

/// Ranked result of a sweep, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSelection {
    /// Every candidate, sorted by descending score; ties keep sweep order.
    pub ranked: Vec<ThresholdScore>,
}

impl ThresholdSelection {
    /// Highest-scoring candidate.
    pub fn best(&self) -> Option<&ThresholdScore> {
        self.ranked.first()
    }

    /// Threshold of the highest-scoring candidate.
    pub fn best_threshold(&self) -> Option<f64> {
        self.best().map(|s| s.threshold)
    }
}

/// Builds an oracle for every candidate threshold and ranks them by
/// information rate. `params.threshold` is ignored.
pub fn select_threshold(
    features: &[Vec<f64>],
    params: &OracleParams,
    sweep: &ThresholdSweep,
) -> OracleResult<ThresholdSelection> {
    if features.is_empty() {
        return Err(OracleError::config("feature matrix is empty"));
    }
    params.validate()?;
    validate_features(features, params.dim)?;
    let candidates = sweep.candidates()?;

    let mut ranked: Vec<ThresholdScore> = candidates
        .par_iter()
        .map(|&threshold| {
            let oracle = build_oracle(features, &params.clone().with_threshold(threshold))?;
            let rate = information_rate(&oracle, sweep.method, sweep.alpha);
            let score = ThresholdScore {
                threshold,
                score: rate.total(),
                h0: rate.h0_total(),
                h1: rate.h1_total(),
                clusters: oracle.num_clusters(),
            };
            debug!(
                threshold,
                score = score.score,
                clusters = score.clusters,
                "scored threshold candidate"
            );
            Ok(score)
        })
        .collect::<OracleResult<Vec<_>>>()?;

    // Stable: equal scores keep sweep order.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(ThresholdSelection { ranked })
}

/// Sweeps thresholds, then builds the oracle with the best one.
pub fn build_with_best_threshold(
    features: &[Vec<f64>],
    params: &OracleParams,
    sweep: &ThresholdSweep,
) -> OracleResult<(Oracle, ThresholdSelection)> {
    let selection = select_threshold(features, params, sweep)?;
    let threshold = selection
        .best_threshold()
        .ok_or_else(|| OracleError::config("threshold sweep produced no candidates"))?;
    let oracle = build_oracle(features, &params.clone().with_threshold(threshold))?;
    Ok((oracle, selection))
}
