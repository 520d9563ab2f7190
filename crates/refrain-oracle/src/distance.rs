//! Feature-vector distances used while building oracles.
//!
//! Two built-in weighted metrics (cosine and euclidean) plus an injected
//! callable. Every distance goes through the fixed-dimension gate: when a
//! dimension marked fixed differs between the two vectors, the pair is
//! infinitely distant and can never be merged into one symbol class.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::OracleError;

/// Distance reported for pairs that differ in a fixed dimension.
pub const FIXED_DIMENSION_SENTINEL: f64 = f64::INFINITY;

/// Caller-supplied distance between two feature vectors.
pub type DistanceFn = Arc<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

/// Distance selector for oracle construction.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DistanceKind {
    /// Weighted cosine distance, `1 - cos(a, b)`.
    #[default]
    Cosine,
    /// Weighted euclidean distance.
    Euclidean,
    /// Injected callable. Weights are not applied to custom distances.
    Custom(DistanceFn),
    /// A custom distance read back from a serialized oracle. The callable is
    /// not stored, so this kind reports its name but cannot build.
    Detached,
}

impl DistanceKind {
    /// Wraps a closure as a custom distance.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        DistanceKind::Custom(Arc::new(f))
    }

    /// Selector name as used in corpus files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceKind::Cosine => "cosine",
            DistanceKind::Euclidean => "euclidean",
            DistanceKind::Custom(_) | DistanceKind::Detached => "custom",
        }
    }

    /// True when this kind can compare vectors.
    pub fn is_bound(&self) -> bool {
        !matches!(self, DistanceKind::Detached)
    }

    /// Raw (ungated) distance between `a` and `b`.
    ///
    /// A detached kind never matches anything.
    pub fn weighted(&self, a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
        match self {
            DistanceKind::Cosine => weighted_cosine(a, b, weights),
            DistanceKind::Euclidean => weighted_euclidean(a, b, weights),
            DistanceKind::Custom(f) => f(a, b),
            DistanceKind::Detached => f64::INFINITY,
        }
    }
}

impl fmt::Debug for DistanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DistanceKind({})", self.name())
    }
}

impl PartialEq for DistanceKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DistanceKind::Cosine, DistanceKind::Cosine) => true,
            (DistanceKind::Euclidean, DistanceKind::Euclidean) => true,
            (DistanceKind::Custom(a), DistanceKind::Custom(b)) => Arc::ptr_eq(a, b),
            (DistanceKind::Detached, DistanceKind::Detached) => true,
            _ => false,
        }
    }
}

impl FromStr for DistanceKind {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceKind::Cosine),
            "euclidean" => Ok(DistanceKind::Euclidean),
            "custom" => Err(OracleError::config(
                "custom distances must be supplied as a callable, not by name",
            )),
            other => Err(OracleError::config(format!(
                "unknown distance selector '{}' (expected cosine or euclidean)",
                other
            ))),
        }
    }
}

/// Serialized form. Unlike [`FromStr`], `"custom"` is accepted here and reads
/// back as [`DistanceKind::Detached`]; building with it is rejected by
/// [`crate::config::OracleParams::validate`].
impl TryFrom<String> for DistanceKind {
    type Error = OracleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("custom") {
            return Ok(DistanceKind::Detached);
        }
        value.parse()
    }
}

impl From<DistanceKind> for String {
    fn from(kind: DistanceKind) -> Self {
        kind.name().to_string()
    }
}

/// Weighted cosine distance.
///
/// Zero-norm vectors are treated as identical to each other and maximally
/// dissimilar (distance 1) to anything else.
pub fn weighted_cosine(a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for ((&x, &y), &w) in a.iter().zip(b).zip(weights) {
        dot += w * x * y;
        norm_a += w * x * x;
        norm_b += w * y * y;
    }

    match (norm_a > 0.0, norm_b > 0.0) {
        (false, false) => 0.0,
        (true, true) => (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 2.0),
        _ => 1.0,
    }
}

/// Weighted euclidean distance, `sqrt(sum(w * (a - b)^2))`.
pub fn weighted_euclidean(a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .zip(weights)
        .map(|((&x, &y), &w)| w * (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Unweighted euclidean distance, used when ranking generated trajectories.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// A distance kind bound to normalized weights and a fixed-dimension mask.
#[derive(Debug, Clone)]
pub struct FeatureMetric {
    kind: DistanceKind,
    weights: Vec<f64>,
    fixed: Vec<usize>,
}

impl FeatureMetric {
    /// Creates a metric. `fixed` is the per-dimension mask; `weights` are
    /// used as given.
    pub fn new(kind: DistanceKind, weights: Vec<f64>, fixed: &[bool]) -> Self {
        let fixed = fixed
            .iter()
            .enumerate()
            .filter_map(|(dim, &is_fixed)| is_fixed.then_some(dim))
            .collect();
        Self {
            kind,
            weights,
            fixed,
        }
    }

    /// The underlying distance kind.
    pub fn kind(&self) -> &DistanceKind {
        &self.kind
    }

    /// True when any fixed dimension differs between `a` and `b`.
    pub fn fixed_dimensions_differ(&self, a: &[f64], b: &[f64]) -> bool {
        self.fixed.iter().any(|&dim| a[dim] != b[dim])
    }

    /// Gated distance between two vectors of the configured dimensionality.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        if self.fixed_dimensions_differ(a, b) {
            return FIXED_DIMENSION_SENTINEL;
        }
        self.kind.weighted(a, b, &self.weights)
    }
}
