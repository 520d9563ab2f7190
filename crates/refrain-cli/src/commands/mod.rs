//! CLI command implementations

pub mod build;
pub mod generate;
pub mod json_output;
pub mod sync;
pub mod threshold;

use refrain_oracle::{
    build_oracle, build_with_best_threshold, Oracle, OracleParams, OracleResult,
    ThresholdSelection, ThresholdSweep,
};
use tracing::info;

/// Builds an oracle with `threshold` when one is given, otherwise with the
/// best threshold from `sweep`.
pub(crate) fn prepare_oracle(
    features: &[Vec<f64>],
    params: &OracleParams,
    threshold: Option<f64>,
    sweep: &ThresholdSweep,
) -> OracleResult<(Oracle, Option<ThresholdSelection>)> {
    match threshold {
        Some(threshold) => {
            let oracle = build_oracle(features, &params.clone().with_threshold(threshold))?;
            Ok((oracle, None))
        }
        None => {
            let (oracle, selection) = build_with_best_threshold(features, params, sweep)?;
            info!(
                threshold = oracle.params().threshold,
                candidates = selection.ranked.len(),
                "selected threshold by sweep"
            );
            Ok((oracle, Some(selection)))
        }
    }
}
