//! Neighbour-selection strategies shared by both generators.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::OracleError;

/// Chooses one jump candidate given the lrs of every candidate.
///
/// Implementations return an index into `lrs`, or `None` when `lrs` is empty.
pub trait NeighborSelector {
    /// Picks a candidate.
    fn select(&self, lrs: &[usize], rng: &mut dyn RngCore) -> Option<usize>;
}

/// Built-in selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Any candidate with equal probability.
    #[default]
    Uniform,
    /// The earliest candidate with the longest repeated suffix.
    MaxLrs,
    /// Candidates near a randomly lowered maximum lrs.
    LrsWeighted,
}

impl SelectionPolicy {
    /// Name used in configuration files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            SelectionPolicy::Uniform => "uniform",
            SelectionPolicy::MaxLrs => "max-lrs",
            SelectionPolicy::LrsWeighted => "lrs-weighted",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionPolicy {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(SelectionPolicy::Uniform),
            "max-lrs" | "max" => Ok(SelectionPolicy::MaxLrs),
            "lrs-weighted" | "weight" => Ok(SelectionPolicy::LrsWeighted),
            other => Err(OracleError::config(format!(
                "unknown selection policy '{}' (expected uniform, max-lrs or lrs-weighted)",
                other
            ))),
        }
    }
}

impl NeighborSelector for SelectionPolicy {
    fn select(&self, lrs: &[usize], rng: &mut dyn RngCore) -> Option<usize> {
        if lrs.is_empty() {
            return None;
        }
        match self {
            SelectionPolicy::Uniform => Some(rng.gen_range(0..lrs.len())),
            SelectionPolicy::MaxLrs => earliest_max(lrs),
            SelectionPolicy::LrsWeighted => {
                let max = *lrs.iter().max()? as f64;
                let query = max - exponential(rng).floor();
                Some(nearest_to(lrs, query, rng))
            }
        }
    }
}

fn earliest_max(lrs: &[usize]) -> Option<usize> {
    let max = *lrs.iter().max()?;
    lrs.iter().position(|&l| l == max)
}

/// Sample from Exp(1).
fn exponential(rng: &mut dyn RngCore) -> f64 {
    let u: f64 = rng.gen();
    -(1.0 - u).ln()
}

/// Uniform among exact matches of `query`, otherwise the nearest candidate
/// (earliest on ties).
fn nearest_to(lrs: &[usize], query: f64, rng: &mut dyn RngCore) -> usize {
    let exact: Vec<usize> = lrs
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l as f64 == query)
        .map(|(i, _)| i)
        .collect();
    if !exact.is_empty() {
        return exact[rng.gen_range(0..exact.len())];
    }

    let mut best = 0;
    let mut best_gap = f64::INFINITY;
    for (i, &l) in lrs.iter().enumerate() {
        let gap = (l as f64 - query).abs();
        if gap < best_gap {
            best = i;
            best_gap = gap;
        }
    }
    best
}
