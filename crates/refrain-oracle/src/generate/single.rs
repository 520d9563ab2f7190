//! Random traversal of one oracle.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{OracleError, OracleResult};
use crate::oracle::Oracle;

use super::policy::{NeighborSelector, SelectionPolicy};
use super::StartPosition;

/// Parameters for one single-oracle generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRequest {
    /// Number of states to emit.
    pub seq_len: usize,
    /// Probability of copying forward instead of jumping.
    pub p: f64,
    /// Minimum lrs a jump target must have.
    #[serde(default)]
    pub min_lrs: usize,
    /// Where traversal starts.
    #[serde(default)]
    pub start: StartPosition,
    /// How jump targets are chosen.
    #[serde(default)]
    pub policy: SelectionPolicy,
}

impl Default for SingleRequest {
    fn default() -> Self {
        Self {
            seq_len: 16,
            p: 0.5,
            min_lrs: 0,
            start: StartPosition::default(),
            policy: SelectionPolicy::default(),
        }
    }
}

impl SingleRequest {
    /// Creates a request for `seq_len` states with continuation probability `p`.
    pub fn new(seq_len: usize, p: f64) -> Self {
        Self {
            seq_len,
            p,
            ..Self::default()
        }
    }

    /// Sets the minimum jump lrs.
    pub fn with_min_lrs(mut self, min_lrs: usize) -> Self {
        self.min_lrs = min_lrs;
        self
    }

    /// Sets the start position.
    pub fn with_start(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    /// Sets the selection policy.
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checks the probability.
    pub fn validate(&self) -> OracleResult<()> {
        if !(0.0..=1.0).contains(&self.p) {
            return Err(OracleError::config(format!(
                "continuation probability must be within [0, 1], got {}",
                self.p
            )));
        }
        Ok(())
    }
}

/// Result of one traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Emitted states, 1-based (state `i` is input vector `i - 1`).
    pub sequence: Vec<usize>,
    /// State the traversal stopped at (0 after a reset).
    pub end_state: usize,
    /// Every visited state, starting with the start state.
    pub trace: Vec<usize>,
}

/// Generates a sequence using the request's selection policy.
pub fn generate<R: Rng>(
    oracle: &Oracle,
    request: &SingleRequest,
    rng: &mut R,
) -> OracleResult<Generation> {
    generate_with(oracle, request, &request.policy, rng)
}

/// Generates a sequence with an injected selection strategy.
pub fn generate_with<R: Rng>(
    oracle: &Oracle,
    request: &SingleRequest,
    selector: &dyn NeighborSelector,
    rng: &mut R,
) -> OracleResult<Generation> {
    request.validate()?;
    if oracle.is_empty() {
        return Err(OracleError::config("cannot generate from an empty oracle"));
    }
    let last = oracle.last_state();
    let mut k = request.start.resolve(last)?;

    let mut sequence = Vec::with_capacity(request.seq_len);
    let mut trace = Vec::with_capacity(request.seq_len + 1);
    trace.push(k);

    for step in 0..request.seq_len {
        let next = match oracle.sfx(k) {
            Some(s) if s != 0 => {
                if rng.gen::<f64>() < request.p {
                    let mut targets = oracle.trn(k);
                    if targets.is_empty() {
                        k = s;
                        trace.push(k);
                        targets = oracle.trn(k);
                    }
                    targets[rng.gen_range(0..targets.len())]
                } else {
                    trace.push(k);
                    jump(oracle, k, request.min_lrs, selector, rng)
                }
            }
            _ => advance(oracle, k),
        };

        trace!(step, from = k, to = next, "single step");
        sequence.push(next);
        trace.push(next);
        k = next;
        if k >= last {
            k = 0;
        }
    }

    Ok(Generation {
        sequence,
        end_state: k,
        trace,
    })
}

/// Lands one past a suffix-linked state, or advances when none qualifies.
fn jump<R: Rng>(
    oracle: &Oracle,
    k: usize,
    min_lrs: usize,
    selector: &dyn NeighborSelector,
    rng: &mut R,
) -> usize {
    let links: Vec<usize> = oracle
        .suffix_links(k)
        .into_iter()
        .filter(|&s| oracle.lrs(s) >= min_lrs)
        .collect();
    let lrs: Vec<usize> = links.iter().map(|&s| oracle.lrs(s)).collect();

    // Out-of-range picks from an injected selector count as no pick.
    match selector.select(&lrs, rng).and_then(|idx| links.get(idx)) {
        Some(&chosen) => {
            if oracle.is_last(chosen) {
                oracle.sfx(chosen).unwrap_or(0) + 1
            } else {
                chosen + 1
            }
        }
        None => advance(oracle, k),
    }
}

/// `k + 1`, or one past the suffix of the last state.
fn advance(oracle: &Oracle, k: usize) -> usize {
    if k < oracle.last_state() {
        k + 1
    } else {
        oracle.sfx(k).unwrap_or(0) + 1
    }
}
