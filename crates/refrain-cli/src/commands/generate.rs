//! Generate command implementation
//!
//! Generates sequences from a single-voice corpus. With an explicit `--probability`
//! every sequence uses that continuation probability; otherwise the ranked
//! driver loop draws parameters per attempt and orders the results by how
//! often they jump.

use anyhow::{Context, Result};
use colored::Colorize;
use refrain_oracle::generate::{jump_fraction, windowed_distance};
use refrain_oracle::{
    create_attempt_rng, derive_attempt_seed, generate, generate_ranked_single, render_single,
    CancelToken, Generation, GenerationBudget, Oracle, SelectionPolicy, SingleRequest,
    StartPosition, ThresholdSweep,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;

use super::json_output::{print_json, write_json, CommandOutput, JsonError};
use super::prepare_oracle;
use crate::input::load_corpus;

/// Options for the generate command.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Path to the corpus file
    pub corpus: String,
    /// Threshold override
    pub threshold: Option<f64>,
    /// Events per sequence
    pub length: usize,
    /// Sequences to produce
    pub count: usize,
    /// Base seed
    pub seed: u64,
    /// Fixed continuation probability; ranked mode when `None`
    pub p: Option<f64>,
    /// Minimum lrs of jump targets (fixed mode only)
    pub min_lrs: usize,
    /// Start state
    pub start: StartPosition,
    /// Jump-target policy
    pub policy: SelectionPolicy,
    /// Attempt budget and deadline for ranked mode
    pub budget: GenerationBudget,
    /// Where to write the JSON result
    pub output: Option<String>,
}

/// One generated sequence with its scores and rendered vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSequence {
    /// Seed of the RNG stream that produced it
    pub seed: u64,
    /// Continuation probability used
    pub p: f64,
    /// Minimum jump lrs used
    pub min_lrs: usize,
    /// Emitted states
    pub states: Vec<usize>,
    /// Every visited state
    pub trace: Vec<usize>,
    /// Share of non-consecutive moves in the trace
    pub jump_fraction: f64,
    /// Windowed feature distance to the corpus
    pub feature_distance: f64,
    /// Render-ready vectors of the emitted states
    pub rendered: Vec<Vec<f64>>,
}

/// Result of the generate command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResult {
    /// Corpus path
    pub corpus: String,
    /// BLAKE3 hash of the corpus file
    pub source_hash: String,
    /// Threshold the oracle was built with
    pub threshold: f64,
    /// Generated sequences, in output order
    pub sequences: Vec<GeneratedSequence>,
}

/// Run the generate command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(options: &GenerateOptions, json_output: bool) -> Result<ExitCode> {
    match execute(options) {
        Ok(result) => {
            if let Some(output) = &options.output {
                write_json(&result, Path::new(output))?;
            }
            if json_output {
                print_json(&CommandOutput::success(result))?;
            } else {
                print_human(&result, options.output.as_deref());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if json_output => {
            let error = JsonError::from_error(&e).with_file(&options.corpus);
            print_json(&CommandOutput::<GenerateResult>::failure(vec![error]))?;
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e),
    }
}

fn execute(options: &GenerateOptions) -> Result<GenerateResult> {
    let loaded = load_corpus(Path::new(&options.corpus))?;
    let corpus = &loaded.corpus;
    let params = corpus.params().context("Invalid corpus parameters")?;
    let threshold = options.threshold.or(corpus.threshold);
    let (oracle, _) = prepare_oracle(
        &corpus.features,
        &params,
        threshold,
        &ThresholdSweep::default(),
    )
    .context("Failed to build oracle")?;

    let template = SingleRequest::new(options.length, options.p.unwrap_or(0.5))
        .with_min_lrs(options.min_lrs)
        .with_start(options.start)
        .with_policy(options.policy);

    let mut sequences = Vec::with_capacity(options.count);
    match options.p {
        Some(_) => {
            for i in 0..options.count as u64 {
                let mut rng = create_attempt_rng(options.seed, i);
                let generation =
                    generate(&oracle, &template, &mut rng).context("Generation failed")?;
                let seed = derive_attempt_seed(options.seed, i);
                sequences.push(describe(
                    &oracle,
                    corpus.render_features(),
                    generation,
                    seed,
                    template.p,
                    template.min_lrs,
                )?);
            }
        }
        None => {
            let ranked = generate_ranked_single(
                &oracle,
                &template,
                options.count,
                options.seed,
                options.budget,
                &CancelToken::new(),
            )
            .context("Ranked generation failed")?;
            for candidate in ranked {
                sequences.push(describe(
                    &oracle,
                    corpus.render_features(),
                    candidate.generation,
                    candidate.seed,
                    candidate.p,
                    candidate.min_lrs,
                )?);
            }
        }
    }
    debug!(count = sequences.len(), "generated sequences");

    Ok(GenerateResult {
        corpus: options.corpus.clone(),
        source_hash: loaded.source_hash,
        threshold: oracle.params().threshold,
        sequences,
    })
}

fn describe(
    oracle: &Oracle,
    render_features: &[Vec<f64>],
    generation: Generation,
    seed: u64,
    p: f64,
    min_lrs: usize,
) -> Result<GeneratedSequence> {
    let rows: Vec<&[f64]> = generation
        .sequence
        .iter()
        .map(|&s| oracle.features(s))
        .collect();
    let rendered = render_single(&generation.sequence, render_features)
        .context("Corpus render vectors do not cover the oracle")?;
    Ok(GeneratedSequence {
        seed,
        p,
        min_lrs,
        jump_fraction: jump_fraction(&generation.trace),
        feature_distance: windowed_distance(&rows, oracle.feature_rows()),
        states: generation.sequence,
        trace: generation.trace,
        rendered,
    })
}

fn print_human(result: &GenerateResult, output: Option<&str>) {
    println!(
        "{} {} (threshold {})",
        "Generated from".cyan().bold(),
        result.corpus,
        result.threshold
    );
    for (i, sequence) in result.sequences.iter().enumerate() {
        println!(
            "  {} p={:.3} min_lrs={} jumps={:.3} distance={:.3}",
            format!("#{}", i + 1).bold(),
            sequence.p,
            sequence.min_lrs,
            sequence.jump_fraction,
            sequence.feature_distance
        );
        println!("     {:?}", sequence.states);
    }
    if let Some(output) = output {
        println!("{} {}", "Wrote".green().bold(), output);
    }
}
