//! Build command implementation
//!
//! Builds an oracle from a single-voice corpus, reports its structure, and
//! optionally writes the serialized oracle to a file.

use anyhow::{Context, Result};
use colored::Colorize;
use refrain_oracle::{information_rate, DistanceKind, Oracle, ThresholdSelection, ThresholdSweep};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::ExitCode;

use super::json_output::{print_json, write_json, CommandOutput, JsonError};
use super::prepare_oracle;
use crate::input::load_corpus;

/// Options for the build command.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Path to the corpus file
    pub corpus: String,
    /// Threshold override; swept when neither this nor the corpus sets one
    pub threshold: Option<f64>,
    /// Distance override
    pub distance: Option<DistanceKind>,
    /// Sweep used when no threshold is set
    pub sweep: ThresholdSweep,
    /// Where to write the serialized oracle
    pub output: Option<String>,
}

/// Structure summary of a built oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    /// Corpus path
    pub corpus: String,
    /// BLAKE3 hash of the corpus file
    pub source_hash: String,
    /// Threshold the oracle was built with
    pub threshold: f64,
    /// Distance name
    pub distance: String,
    /// States including the root
    pub states: usize,
    /// Distinct symbols
    pub symbols: usize,
    /// States linked to the root
    pub clusters: usize,
    /// Longest repeated suffix anywhere in the oracle
    pub max_lrs: usize,
    /// Mean repeated-suffix length
    pub avg_lrs: f64,
    /// Total information rate under the sweep's method and alpha
    pub information_rate: f64,
    /// Sweep ranking, when the threshold was selected by sweep
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<ThresholdSelection>,
    /// Where the oracle was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Run the build command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(options: &BuildOptions, json_output: bool) -> Result<ExitCode> {
    match execute(options) {
        Ok(result) => {
            if json_output {
                print_json(&CommandOutput::success(result))?;
            } else {
                print_human(&result);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if json_output => {
            let error = JsonError::from_error(&e).with_file(&options.corpus);
            print_json(&CommandOutput::<BuildResult>::failure(vec![error]))?;
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e),
    }
}

fn execute(options: &BuildOptions) -> Result<BuildResult> {
    let loaded = load_corpus(Path::new(&options.corpus))?;
    let corpus = &loaded.corpus;

    let mut params = corpus.params().context("Invalid corpus parameters")?;
    if let Some(distance) = &options.distance {
        params = params.with_distance(distance.clone());
    }
    let threshold = options.threshold.or(corpus.threshold);
    let (oracle, selection) = prepare_oracle(&corpus.features, &params, threshold, &options.sweep)
        .context("Failed to build oracle")?;

    if let Some(output) = &options.output {
        write_json(&oracle, Path::new(output))?;
    }

    Ok(summarize(
        &oracle,
        &options.sweep,
        options.corpus.clone(),
        loaded.source_hash,
        selection,
        options.output.clone(),
    ))
}

fn summarize(
    oracle: &Oracle,
    sweep: &ThresholdSweep,
    corpus: String,
    source_hash: String,
    selection: Option<ThresholdSelection>,
    output: Option<String>,
) -> BuildResult {
    let last = oracle.last_state();
    BuildResult {
        corpus,
        source_hash,
        threshold: oracle.params().threshold,
        distance: oracle.params().distance.name().to_string(),
        states: oracle.n_states(),
        symbols: oracle.num_symbols(),
        clusters: oracle.num_clusters(),
        max_lrs: oracle.max_lrs(last),
        avg_lrs: oracle.avg_lrs(last),
        information_rate: information_rate(oracle, sweep.method, sweep.alpha).total(),
        selection,
        output,
    }
}

fn print_human(result: &BuildResult) {
    println!("{} {}", "Built oracle from".cyan().bold(), result.corpus);
    println!("  {:<18} {}", "threshold:", result.threshold);
    println!("  {:<18} {}", "distance:", result.distance);
    println!("  {:<18} {}", "states:", result.states);
    println!("  {:<18} {}", "symbols:", result.symbols);
    println!("  {:<18} {}", "clusters:", result.clusters);
    println!("  {:<18} {}", "max lrs:", result.max_lrs);
    println!("  {:<18} {:.3}", "avg lrs:", result.avg_lrs);
    println!("  {:<18} {:.3}", "information rate:", result.information_rate);
    if let Some(selection) = &result.selection {
        println!(
            "  {:<18} {} candidates swept",
            "selection:",
            selection.ranked.len()
        );
    }
    if let Some(output) = &result.output {
        println!("{} {}", "Wrote".green().bold(), output);
    }
}
