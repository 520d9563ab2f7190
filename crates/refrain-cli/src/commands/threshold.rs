//! Threshold command implementation
//!
//! Sweeps candidate thresholds over a corpus and prints the ranking.

use anyhow::{Context, Result};
use colored::Colorize;
use refrain_oracle::{select_threshold, DistanceKind, ThresholdScore, ThresholdSweep};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::ExitCode;

use super::json_output::{print_json, CommandOutput, JsonError};
use crate::input::load_corpus;

/// Options for the threshold command.
#[derive(Debug, Clone)]
pub struct ThresholdOptions {
    /// Path to the corpus file
    pub corpus: String,
    /// Distance override
    pub distance: Option<DistanceKind>,
    /// Candidate range and scoring
    pub sweep: ThresholdSweep,
    /// Rows to print in human output (all when `None`)
    pub top: Option<usize>,
}

/// Sweep ranking for one corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdResult {
    /// Corpus path
    pub corpus: String,
    /// BLAKE3 hash of the corpus file
    pub source_hash: String,
    /// Sweep that produced the ranking
    pub sweep: ThresholdSweep,
    /// Best candidate threshold
    pub best: f64,
    /// Every candidate, best first
    pub ranked: Vec<ThresholdScore>,
}

/// Run the threshold command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(options: &ThresholdOptions, json_output: bool) -> Result<ExitCode> {
    match execute(options) {
        Ok(result) => {
            if json_output {
                print_json(&CommandOutput::success(result))?;
            } else {
                print_human(&result, options.top);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if json_output => {
            let error = JsonError::from_error(&e).with_file(&options.corpus);
            print_json(&CommandOutput::<ThresholdResult>::failure(vec![error]))?;
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e),
    }
}

fn execute(options: &ThresholdOptions) -> Result<ThresholdResult> {
    let loaded = load_corpus(Path::new(&options.corpus))?;
    let mut params = loaded
        .corpus
        .params()
        .context("Invalid corpus parameters")?;
    if let Some(distance) = &options.distance {
        params = params.with_distance(distance.clone());
    }

    let selection = select_threshold(&loaded.corpus.features, &params, &options.sweep)
        .context("Threshold sweep failed")?;
    let best = selection
        .best_threshold()
        .context("Threshold sweep produced no candidates")?;

    Ok(ThresholdResult {
        corpus: options.corpus.clone(),
        source_hash: loaded.source_hash,
        sweep: options.sweep,
        best,
        ranked: selection.ranked,
    })
}

fn print_human(result: &ThresholdResult, top: Option<usize>) {
    println!(
        "{} {} ({} method, alpha {})",
        "Threshold sweep for".cyan().bold(),
        result.corpus,
        result.sweep.method,
        result.sweep.alpha
    );
    println!(
        "  {:>10}  {:>12}  {:>12}  {:>12}  {:>8}",
        "threshold", "score", "h0", "h1", "clusters"
    );
    let rows = top.unwrap_or(result.ranked.len());
    for (i, score) in result.ranked.iter().take(rows).enumerate() {
        let line = format!(
            "  {:>10.4}  {:>12.4}  {:>12.4}  {:>12.4}  {:>8}",
            score.threshold, score.score, score.h0, score.h1, score.clusters
        );
        if i == 0 {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    println!("{} {}", "Best threshold:".green().bold(), result.best);
}
