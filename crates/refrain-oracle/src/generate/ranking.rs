//! Driver loops that generate many candidates and rank them.
//!
//! Each attempt draws its own parameters from an RNG derived from the base
//! seed and the attempt index, so a ranked batch is reproducible from one
//! seed. Loops stop with [`OracleError::Exhaustion`] when the attempt budget
//! is spent, the deadline passes or the cancel token fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance::euclidean;
use crate::error::{OracleError, OracleResult};
use crate::oracle::Oracle;
use crate::rng::{create_attempt_rng, derive_attempt_seed};

use super::align::Ensemble;
use super::multi::{sync_generate, SyncEvent, SyncGeneration, SyncRequest};
use super::single::{generate, Generation, SingleRequest};

/// Lower bound of the copy probability drawn per synchronized attempt.
pub const SYNC_P_MIN: f64 = 0.3;
/// Upper bound of the copy probability drawn per synchronized attempt.
pub const SYNC_P_MAX: f64 = 0.5;

fn default_max_attempts() -> usize {
    1000
}

/// Limits on a driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationBudget {
    /// Attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Wall-clock limit in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for GenerationBudget {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_ms: None,
        }
    }
}

impl GenerationBudget {
    /// Budget of `max_attempts` attempts and no deadline.
    pub fn attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            timeout_ms: None,
        }
    }

    /// Sets a wall-clock limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    fn deadline(&self, started: Instant) -> Option<Instant> {
        self.timeout_ms
            .and_then(|ms| started.checked_add(Duration::from_millis(ms)))
    }
}

/// Shared flag that stops driver loops between attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One ranked single-oracle sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSingle {
    /// The generated sequence.
    pub generation: Generation,
    /// Closest windowed distance to the corpus.
    pub feature_distance: f64,
    /// Share of non-consecutive moves in the trace.
    pub jump_fraction: f64,
    /// Continuation probability used.
    pub p: f64,
    /// Minimum jump lrs used.
    pub min_lrs: usize,
    /// Seed of the attempt.
    pub seed: u64,
}

/// One ranked synchronized generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSync {
    /// The generated voices.
    pub generation: SyncGeneration,
    /// Mean windowed distance over voices.
    pub feature_distance: f64,
    /// Mean share of jumps and gaps over voices.
    pub discontinuity: f64,
    /// Copy probability used.
    pub p: f64,
    /// Seed of the attempt.
    pub seed: u64,
}

/// Minimum mean euclidean distance between `generated` and any equally long
/// window of `corpus`.
///
/// When `generated` is longer than the corpus, only its first
/// `corpus.len()` frames are compared.
pub fn windowed_distance(generated: &[&[f64]], corpus: &[Vec<f64>]) -> f64 {
    if generated.is_empty() || corpus.is_empty() {
        return 0.0;
    }
    let len = generated.len().min(corpus.len());
    (0..=corpus.len() - len)
        .map(|start| {
            generated[..len]
                .iter()
                .zip(&corpus[start..start + len])
                .map(|(g, c)| euclidean(g, c))
                .sum::<f64>()
                / len as f64
        })
        .fold(f64::INFINITY, f64::min)
}

/// Share of consecutive trace entries that are not `previous + 1`.
pub fn jump_fraction(trace: &[usize]) -> f64 {
    if trace.is_empty() {
        return 0.0;
    }
    let jumps = trace.windows(2).filter(|w| w[1] != w[0] + 1).count();
    jumps as f64 / trace.len() as f64
}

/// Tracks attempts against a budget and a cancel token.
struct AttemptGuard<'c> {
    budget: GenerationBudget,
    cancel: &'c CancelToken,
    deadline: Option<Instant>,
    requested: usize,
    attempts: usize,
}

impl<'c> AttemptGuard<'c> {
    fn new(budget: GenerationBudget, cancel: &'c CancelToken, requested: usize) -> Self {
        Self {
            budget,
            cancel,
            deadline: budget.deadline(Instant::now()),
            requested,
            attempts: 0,
        }
    }

    /// Returns the next attempt index, or the exhaustion error.
    fn next(&mut self, produced: usize) -> OracleResult<u64> {
        let reason = if self.cancel.is_cancelled() {
            Some("cancelled")
        } else if self.deadline.map_or(false, |d| Instant::now() >= d) {
            Some("deadline exceeded")
        } else if self.attempts >= self.budget.max_attempts {
            Some("attempt budget spent")
        } else {
            None
        };

        if let Some(reason) = reason {
            warn!(
                requested = self.requested,
                produced,
                attempts = self.attempts,
                reason,
                "generation loop stopped early"
            );
            return Err(OracleError::Exhaustion {
                requested: self.requested,
                produced,
                attempts: self.attempts,
                reason: reason.to_string(),
            });
        }

        let attempt = self.attempts as u64;
        self.attempts += 1;
        Ok(attempt)
    }
}

/// Generates `count` non-empty sequences from one oracle and ranks them by
/// jump fraction, most continuous first.
///
/// Each attempt draws `p ~ U(0, 1)` and a minimum jump lrs from
/// `[1, max lrs)`; `template` supplies the length, start and policy.
pub fn generate_ranked_single(
    oracle: &Oracle,
    template: &SingleRequest,
    count: usize,
    base_seed: u64,
    budget: GenerationBudget,
    cancel: &CancelToken,
) -> OracleResult<Vec<RankedSingle>> {
    let corpus = oracle.feature_rows();
    let max_lrs = oracle.lrs_all().iter().copied().max().unwrap_or(0);
    let mut guard = AttemptGuard::new(budget, cancel, count);
    let mut ranked = Vec::with_capacity(count);

    while ranked.len() < count {
        let attempt = guard.next(ranked.len())?;
        let seed = derive_attempt_seed(base_seed, attempt);
        let mut rng = create_attempt_rng(base_seed, attempt);

        let p = rng.gen_range(0.0..1.0);
        let min_lrs = if max_lrs > 1 {
            rng.gen_range(1..max_lrs)
        } else {
            max_lrs
        };
        let request = SingleRequest {
            p,
            min_lrs,
            ..template.clone()
        };

        let generation = generate(oracle, &request, &mut rng)?;
        if generation.sequence.is_empty() {
            debug!(attempt, "discarding empty sequence");
            continue;
        }

        let rows: Vec<&[f64]> = generation
            .sequence
            .iter()
            .map(|&s| oracle.features(s))
            .collect();
        ranked.push(RankedSingle {
            feature_distance: windowed_distance(&rows, corpus),
            jump_fraction: jump_fraction(&generation.trace),
            generation,
            p,
            min_lrs,
            seed,
        });
    }

    ranked.sort_by(|a, b| a.jump_fraction.total_cmp(&b.jump_fraction));
    Ok(ranked)
}

/// Generates `count` valid synchronized results and ranks them by mean
/// discontinuity, most continuous first.
///
/// A result is valid when every voice emitted at least one state and no
/// voice has more than `seq_len / 5` gap markers. Each attempt draws
/// `p ~ U(0.3, 0.5)`; `template` supplies the rest.
pub fn generate_ranked_sync(
    ensemble: &Ensemble<'_>,
    template: &SyncRequest,
    count: usize,
    base_seed: u64,
    budget: GenerationBudget,
    cancel: &CancelToken,
) -> OracleResult<Vec<RankedSync>> {
    let max_gaps = template.seq_len as f64 / 5.0;
    let mut guard = AttemptGuard::new(budget, cancel, count);
    let mut ranked = Vec::with_capacity(count);

    while ranked.len() < count {
        let attempt = guard.next(ranked.len())?;
        let seed = derive_attempt_seed(base_seed, attempt);
        let mut rng = create_attempt_rng(base_seed, attempt);

        let p = rng.gen_range(SYNC_P_MIN..SYNC_P_MAX);
        let request = SyncRequest {
            p,
            ..template.clone()
        };
        let generation = sync_generate(ensemble, &request, &mut rng)?;

        let valid = generation
            .voices
            .iter()
            .all(|v| v.states().next().is_some() && v.gap_count() as f64 <= max_gaps);
        if !valid {
            debug!(attempt, "discarding result with silent or gappy voice");
            continue;
        }

        let mut distances = Vec::with_capacity(ensemble.len());
        let mut discontinuities = Vec::with_capacity(ensemble.len());
        for (voice, output) in ensemble.voices().iter().zip(&generation.voices) {
            let rows: Vec<&[f64]> = output.states().map(|s| voice.oracle.features(s)).collect();
            distances.push(windowed_distance(&rows, voice.oracle.feature_rows()));
            discontinuities.push(discontinuity(&output.events));
        }

        ranked.push(RankedSync {
            generation,
            feature_distance: mean(&distances),
            discontinuity: mean(&discontinuities),
            p,
            seed,
        });
    }

    ranked.sort_by(|a, b| a.discontinuity.total_cmp(&b.discontinuity));
    Ok(ranked)
}

/// (non-consecutive state pairs + gaps) / events.
fn discontinuity(events: &[SyncEvent]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let states: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::State(s) => Some(*s),
            SyncEvent::Gap => None,
        })
        .collect();
    let jumps = states.windows(2).filter(|w| w[1] != w[0] + 1).count();
    let gaps = events.len() - states.len();
    (jumps + gaps) as f64 / events.len() as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
