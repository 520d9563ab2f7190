//! Configuration types for oracle construction and corpus input.
//!
//! Generation requests live next to their generators
//! ([`crate::generate::SingleRequest`], [`crate::generate::SyncRequest`],
//! [`crate::generate::GenerationBudget`]); the threshold sweep lives in
//! [`crate::threshold`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::distance::{DistanceKind, FeatureMetric};
use crate::error::{OracleError, OracleResult};

/// Parameters an oracle is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleParams {
    /// Merge threshold; a target matches when `distance < threshold`.
    pub threshold: f64,
    /// Distance selector.
    #[serde(default)]
    pub distance: DistanceKind,
    /// Per-dimension weights (normalized before use).
    pub weights: Vec<f64>,
    /// Per-dimension fixed mask. Empty means no fixed dimensions.
    #[serde(default)]
    pub fixed: Vec<bool>,
    /// Feature dimensionality.
    pub dim: usize,
}

impl OracleParams {
    /// Uniform weights, no fixed dimensions, cosine distance, threshold 0.
    pub fn new(dim: usize) -> Self {
        Self {
            threshold: 0.0,
            distance: DistanceKind::default(),
            weights: vec![1.0; dim],
            fixed: vec![false; dim],
            dim,
        }
    }

    /// Sets the threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the distance selector.
    pub fn with_distance(mut self, distance: DistanceKind) -> Self {
        self.distance = distance;
        self
    }

    /// Sets the weights.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the fixed-dimension mask.
    pub fn with_fixed(mut self, fixed: Vec<bool>) -> Self {
        self.fixed = fixed;
        self
    }

    /// Validates dimensionality, weights, mask and threshold.
    pub fn validate(&self) -> OracleResult<()> {
        if self.dim == 0 {
            return Err(OracleError::config("feature dimensionality must be at least 1"));
        }
        if self.weights.len() != self.dim {
            return Err(OracleError::config(format!(
                "expected {} weights, got {}",
                self.dim,
                self.weights.len()
            )));
        }
        if let Some(w) = self.weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(OracleError::config(format!(
                "weights must be finite and non-negative, got {}",
                w
            )));
        }
        if !self.fixed.is_empty() && self.fixed.len() != self.dim {
            return Err(OracleError::config(format!(
                "expected {} fixed-mask entries, got {}",
                self.dim,
                self.fixed.len()
            )));
        }
        require_bound(&self.distance)?;
        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(OracleError::config(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Weights scaled to sum to 1. An all-zero vector becomes uniform.
    pub fn normalized_weights(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().sum();
        if total > 0.0 {
            self.weights.iter().map(|w| w / total).collect()
        } else {
            warn!(
                dim = self.dim,
                "all feature weights are zero, falling back to uniform weights"
            );
            vec![1.0 / self.dim as f64; self.dim]
        }
    }

    /// Fixed mask expanded to `dim` entries.
    pub fn fixed_mask(&self) -> Vec<bool> {
        if self.fixed.is_empty() {
            vec![false; self.dim]
        } else {
            self.fixed.clone()
        }
    }

    /// Validates and binds the parameters into a gated metric.
    pub fn metric(&self) -> OracleResult<FeatureMetric> {
        self.validate()?;
        Ok(FeatureMetric::new(
            self.distance.clone(),
            self.normalized_weights(),
            &self.fixed_mask(),
        ))
    }
}

/// Checks that every vector has `dim` finite components.
pub fn validate_features(features: &[Vec<f64>], dim: usize) -> OracleResult<()> {
    for (i, row) in features.iter().enumerate() {
        check_vector(row, dim).map_err(|e| match e {
            OracleError::Configuration { message } => {
                OracleError::config(format!("feature row {}: {}", i, message))
            }
            other => other,
        })?;
    }
    Ok(())
}

pub(crate) fn check_vector(vector: &[f64], dim: usize) -> OracleResult<()> {
    if vector.len() != dim {
        return Err(OracleError::config(format!(
            "expected {} dimensions, got {}",
            dim,
            vector.len()
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(OracleError::config("feature vector has non-finite components"));
    }
    Ok(())
}

/// A single-voice corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    /// Normalized feature vectors the oracle is built on.
    pub features: Vec<Vec<f64>>,
    /// Unnormalized vectors handed to the renderer. Defaults to `features`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Vec<Vec<f64>>>,
    /// Per-dimension weights. Defaults to uniform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Fixed-dimension mask. Defaults to none fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<Vec<bool>>,
    /// Distance selector.
    #[serde(default)]
    pub distance: DistanceKind,
    /// Merge threshold. When absent, one is selected by sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Corpus {
    /// Parses a corpus from JSON.
    pub fn from_json(json: &str) -> OracleResult<Self> {
        let corpus: Self = serde_json::from_str(json)
            .map_err(|e| OracleError::config(format!("invalid corpus JSON: {}", e)))?;
        require_bound(&corpus.distance)?;
        Ok(corpus)
    }

    /// Dimensionality of the corpus (length of the first vector).
    pub fn dim(&self) -> OracleResult<usize> {
        infer_dim(&self.features)
    }

    /// Oracle parameters described by this corpus. The threshold is 0 when
    /// the corpus leaves it to the sweep.
    pub fn params(&self) -> OracleResult<OracleParams> {
        params_from(
            self.dim()?,
            self.threshold,
            &self.distance,
            self.weights.as_ref(),
            self.fixed.as_ref(),
        )
    }

    /// Vectors handed to the renderer.
    pub fn render_features(&self) -> &[Vec<f64>] {
        self.original.as_deref().unwrap_or(&self.features)
    }
}

/// One voice of a multi-voice corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCorpus {
    /// Voice key.
    pub key: String,
    /// Normalized feature vectors.
    pub features: Vec<Vec<f64>>,
    /// Onset offset of every event, non-decreasing.
    pub offsets: Vec<f64>,
    /// Unnormalized vectors handed to the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Vec<Vec<f64>>>,
}

impl VoiceCorpus {
    /// Vectors handed to the renderer.
    pub fn render_features(&self) -> &[Vec<f64>] {
        self.original.as_deref().unwrap_or(&self.features)
    }
}

/// A multi-voice corpus file. Weights, mask and distance are shared by all
/// voices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiCorpus {
    /// Voices in registration order.
    pub voices: Vec<VoiceCorpus>,
    /// Per-dimension weights. Defaults to uniform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Fixed-dimension mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<Vec<bool>>,
    /// Distance selector.
    #[serde(default)]
    pub distance: DistanceKind,
    /// Merge threshold shared by every voice. When absent, each voice gets its
    /// own swept threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl MultiCorpus {
    /// Parses a multi-voice corpus from JSON.
    pub fn from_json(json: &str) -> OracleResult<Self> {
        let corpus: Self = serde_json::from_str(json).map_err(|e| {
            OracleError::config(format!("invalid multi-voice corpus JSON: {}", e))
        })?;
        require_bound(&corpus.distance)?;
        Ok(corpus)
    }

    /// Oracle parameters for one voice.
    pub fn params_for(&self, voice: &VoiceCorpus) -> OracleResult<OracleParams> {
        let dim = infer_dim(&voice.features)
            .map_err(|e| OracleError::alignment(&voice.key, e.to_string()))?;
        params_from(
            dim,
            self.threshold,
            &self.distance,
            self.weights.as_ref(),
            self.fixed.as_ref(),
        )
    }
}

fn require_bound(distance: &DistanceKind) -> OracleResult<()> {
    if distance.is_bound() {
        Ok(())
    } else {
        Err(OracleError::config(
            "custom distances must be supplied as a callable, not by name",
        ))
    }
}

fn infer_dim(features: &[Vec<f64>]) -> OracleResult<usize> {
    features
        .first()
        .map(Vec::len)
        .ok_or_else(|| OracleError::config("feature matrix is empty"))
}

fn params_from(
    dim: usize,
    threshold: Option<f64>,
    distance: &DistanceKind,
    weights: Option<&Vec<f64>>,
    fixed: Option<&Vec<bool>>,
) -> OracleResult<OracleParams> {
    let mut params = OracleParams::new(dim)
        .with_threshold(threshold.unwrap_or(0.0))
        .with_distance(distance.clone());
    if let Some(weights) = weights {
        params = params.with_weights(weights.clone());
    }
    if let Some(fixed) = fixed {
        params = params.with_fixed(fixed.clone());
    }
    params.validate()?;
    Ok(params)
}
