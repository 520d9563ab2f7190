//! Incremental oracle construction.
//!
//! [`OracleBuilder`] is the seam between the insertion routine and the
//! comparison it uses. [`ContinuousBuilder`] merges vectors closer than the
//! threshold (the builder callers normally want); [`SymbolicBuilder`] merges
//! only identical vectors.

use tracing::debug;

use crate::config::{check_vector, validate_features, OracleParams};
use crate::distance::{FeatureMetric, FIXED_DIMENSION_SENTINEL};
use crate::error::{OracleError, OracleResult};
use crate::oracle::{Oracle, OracleKind};

/// Incremental construction of an [`Oracle`].
pub trait OracleBuilder {
    /// Appends a state for `vector` and returns its index.
    fn add_state(&mut self, vector: &[f64]) -> OracleResult<usize>;

    /// Distance between two vectors as seen by this builder.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// The oracle built so far.
    fn oracle(&self) -> &Oracle;

    /// Consumes the builder and returns the oracle.
    fn finish(self) -> Oracle
    where
        Self: Sized;

    /// Appends a state for every vector in order.
    fn add_all(&mut self, vectors: &[Vec<f64>]) -> OracleResult<()> {
        for vector in vectors {
            self.add_state(vector)?;
        }
        Ok(())
    }
}

/// Builds a variable Markov oracle over continuous features.
#[derive(Debug, Clone)]
pub struct ContinuousBuilder {
    oracle: Oracle,
    metric: FeatureMetric,
    threshold: f64,
    dim: usize,
}

impl ContinuousBuilder {
    /// Validates `params` and starts an oracle holding only the root.
    pub fn new(params: OracleParams) -> OracleResult<Self> {
        let metric = params.metric()?;
        let threshold = params.threshold;
        let dim = params.dim;
        Ok(Self {
            oracle: Oracle::with_root(OracleKind::Continuous, params),
            metric,
            threshold,
            dim,
        })
    }
}

impl OracleBuilder for ContinuousBuilder {
    fn add_state(&mut self, vector: &[f64]) -> OracleResult<usize> {
        check_vector(vector, self.dim)?;
        let metric = &self.metric;
        let threshold = self.threshold;
        Ok(self.oracle.push_state(
            vector.to_vec(),
            |a, b| metric.distance(a, b),
            |d| d < threshold,
        ))
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.metric.distance(a, b)
    }

    fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    fn finish(self) -> Oracle {
        self.oracle
    }
}

/// Builds a plain factor oracle where only identical vectors share a symbol.
#[derive(Debug, Clone)]
pub struct SymbolicBuilder {
    oracle: Oracle,
    dim: usize,
}

impl SymbolicBuilder {
    /// Starts a symbolic oracle over vectors of `dim` components.
    pub fn new(dim: usize) -> OracleResult<Self> {
        let params = OracleParams::new(dim);
        params.validate()?;
        Ok(Self {
            oracle: Oracle::with_root(OracleKind::Symbolic, params),
            dim,
        })
    }
}

impl OracleBuilder for SymbolicBuilder {
    fn add_state(&mut self, vector: &[f64]) -> OracleResult<usize> {
        check_vector(vector, self.dim)?;
        Ok(self
            .oracle
            .push_state(vector.to_vec(), exact_distance, |d| d == 0.0))
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        exact_distance(a, b)
    }

    fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    fn finish(self) -> Oracle {
        self.oracle
    }
}

fn exact_distance(a: &[f64], b: &[f64]) -> f64 {
    if a == b {
        0.0
    } else {
        FIXED_DIMENSION_SENTINEL
    }
}

/// Builds a continuous oracle from a whole feature matrix.
pub fn build_oracle(features: &[Vec<f64>], params: &OracleParams) -> OracleResult<Oracle> {
    if features.is_empty() {
        return Err(OracleError::config("feature matrix is empty"));
    }
    validate_features(features, params.dim)?;

    let mut builder = ContinuousBuilder::new(params.clone())?;
    builder.add_all(features)?;
    let oracle = builder.finish();

    debug!(
        states = oracle.n_states(),
        symbols = oracle.num_symbols(),
        clusters = oracle.num_clusters(),
        threshold = params.threshold,
        distance = params.distance.name(),
        "built oracle"
    );
    Ok(oracle)
}

/// Builds a symbolic oracle from a whole feature matrix.
pub fn build_symbolic_oracle(features: &[Vec<f64>]) -> OracleResult<Oracle> {
    let dim = features
        .first()
        .map(Vec::len)
        .ok_or_else(|| OracleError::config("feature matrix is empty"))?;
    validate_features(features, dim)?;

    let mut builder = SymbolicBuilder::new(dim)?;
    builder.add_all(features)?;
    let oracle = builder.finish();

    debug!(
        states = oracle.n_states(),
        symbols = oracle.num_symbols(),
        "built symbolic oracle"
    );
    Ok(oracle)
}
