//! Sync command implementation
//!
//! Builds one oracle per voice of a multi-voice corpus, generates ranked
//! synchronized results, and renders every voice with gaps preserved.

use anyhow::{Context, Result};
use colored::Colorize;
use refrain_oracle::{
    generate_ranked_sync, render_voices, CancelToken, Ensemble, GenerationBudget, Oracle,
    RenderedEvent, SelectionPolicy, StartPosition, SyncEvent, SyncRequest, ThresholdSweep,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

use super::json_output::{print_json, write_json, CommandOutput, JsonError};
use super::prepare_oracle;
use crate::input::load_multi_corpus;

/// Options for the sync command.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Path to the multi-voice corpus file
    pub corpus: String,
    /// Threshold override shared by every voice
    pub threshold: Option<f64>,
    /// Steps per result
    pub length: usize,
    /// Results to produce
    pub count: usize,
    /// Base seed
    pub seed: u64,
    /// Start state of the principal voice
    pub start: StartPosition,
    /// Jump-target policy
    pub policy: SelectionPolicy,
    /// Suffix fallbacks before a copy step gives up
    pub max_fallbacks: usize,
    /// Attempt budget and deadline
    pub budget: GenerationBudget,
    /// Where to write the JSON result
    pub output: Option<String>,
}

/// Threshold a voice's oracle was built with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceThreshold {
    /// Voice key
    pub key: String,
    /// Threshold
    pub threshold: f64,
    /// States including the root
    pub states: usize,
}

/// One voice of one synchronized result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncVoiceOutput {
    /// Voice key
    pub key: String,
    /// Emitted states and gaps
    pub events: Vec<SyncEvent>,
    /// Render-ready vectors, `null` for gaps
    pub rendered: Vec<RenderedEvent>,
}

/// One ranked synchronized result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCandidate {
    /// Seed of the RNG stream that produced it
    pub seed: u64,
    /// Copy probability drawn for the attempt
    pub p: f64,
    /// Mean discontinuity across voices
    pub discontinuity: f64,
    /// Mean windowed feature distance across voices
    pub feature_distance: f64,
    /// Final principal state
    pub end_state: usize,
    /// Voices in registration order
    pub voices: Vec<SyncVoiceOutput>,
}

/// Result of the sync command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Corpus path
    pub corpus: String,
    /// BLAKE3 hash of the corpus file
    pub source_hash: String,
    /// Key of the principal voice
    pub principal: String,
    /// Per-voice oracle thresholds
    pub voices: Vec<VoiceThreshold>,
    /// Ranked results, most continuous first
    pub results: Vec<SyncCandidate>,
}

/// Run the sync command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(options: &SyncOptions, json_output: bool) -> Result<ExitCode> {
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
            print_json(&CommandOutput::<SyncResult>::failure(vec![error]))?;
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e),
    }
}

fn execute(options: &SyncOptions) -> Result<SyncResult> {
    let loaded = load_multi_corpus(Path::new(&options.corpus))?;
    let corpus = &loaded.corpus;
    let threshold = options.threshold.or(corpus.threshold);

    let mut oracles: Vec<Oracle> = Vec::with_capacity(corpus.voices.len());
    for voice in &corpus.voices {
        let params = corpus.params_for(voice)?;
        let (oracle, _) = prepare_oracle(
            &voice.features,
            &params,
            threshold,
            &ThresholdSweep::default(),
        )
        .with_context(|| format!("Failed to build oracle for voice '{}'", voice.key))?;
        info!(
            voice = %voice.key,
            states = oracle.n_states(),
            threshold = oracle.params().threshold,
            "built voice oracle"
        );
        oracles.push(oracle);
    }

    let ensemble = Ensemble::new(
        corpus
            .voices
            .iter()
            .zip(&oracles)
            .map(|(voice, oracle)| (voice.key.as_str(), oracle, voice.offsets.clone()))
            .collect(),
    )
    .context("Failed to align voices")?;

    let template = SyncRequest {
        max_fallbacks: options.max_fallbacks,
        ..SyncRequest::new(options.length, 0.4)
            .with_start(options.start)
            .with_policy(options.policy)
    };
    let ranked = generate_ranked_sync(
        &ensemble,
        &template,
        options.count,
        options.seed,
        options.budget,
        &CancelToken::new(),
    )
    .context("Synchronized generation failed")?;

    let features: HashMap<String, Vec<Vec<f64>>> = corpus
        .voices
        .iter()
        .map(|voice| (voice.key.clone(), voice.render_features().to_vec()))
        .collect();

    let mut results = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        let rendered = render_voices(&candidate.generation, &features)
            .context("Corpus render vectors do not cover the oracles")?;
        let voices = candidate
            .generation
            .voices
            .into_iter()
            .zip(rendered)
            .map(|(voice, rendered)| SyncVoiceOutput {
                key: voice.key,
                events: voice.events,
                rendered: rendered.events,
            })
            .collect();
        results.push(SyncCandidate {
            seed: candidate.seed,
            p: candidate.p,
            discontinuity: candidate.discontinuity,
            feature_distance: candidate.feature_distance,
            end_state: candidate.generation.end_state,
            voices,
        });
    }

    Ok(SyncResult {
        corpus: options.corpus.clone(),
        source_hash: loaded.source_hash,
        principal: ensemble.principal_key().to_string(),
        voices: ensemble
            .voices()
            .iter()
            .map(|voice| VoiceThreshold {
                key: voice.timeline.key().to_string(),
                threshold: voice.oracle.params().threshold,
                states: voice.oracle.n_states(),
            })
            .collect(),
        results,
    })
}

fn print_human(result: &SyncResult, output: Option<&str>) {
    println!(
        "{} {} (principal voice '{}')",
        "Synchronized generation from".cyan().bold(),
        result.corpus,
        result.principal
    );
    for voice in &result.voices {
        println!(
            "  {:<12} threshold {} ({} states)",
            voice.key, voice.threshold, voice.states
        );
    }
    for (i, candidate) in result.results.iter().enumerate() {
        println!(
            "  {} p={:.3} discontinuity={:.3} distance={:.3}",
            format!("#{}", i + 1).bold(),
            candidate.p,
            candidate.discontinuity,
            candidate.feature_distance
        );
        for voice in &candidate.voices {
            let events: Vec<String> = voice
                .events
                .iter()
                .map(|event| match event {
                    SyncEvent::State(s) => s.to_string(),
                    SyncEvent::Gap => "-".dimmed().to_string(),
                })
                .collect();
            println!("     {:<12} {}", voice.key, events.join(" "));
        }
    }
    if let Some(output) = output {
        println!("{} {}", "Wrote".green().bold(), output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VOICES: &str = r#"{
        "voices": [
            {"key": "melody",
             "features": [[0.0], [1.0], [0.0], [1.0], [0.0], [1.0]],
             "offsets": [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]},
            {"key": "bass",
             "features": [[0.0], [1.0], [0.0]],
             "offsets": [0.0, 2.0, 4.0],
             "original": [[36.0], [43.0], [36.0]]}
        ],
        "distance": "euclidean",
        "threshold": 0.1
    }"#;

    fn options(corpus: String) -> SyncOptions {
        SyncOptions {
            corpus,
            threshold: None,
            length: 8,
            count: 2,
            seed: 3,
            start: StartPosition::default(),
            policy: SelectionPolicy::MaxLrs,
            max_fallbacks: 5,
            budget: GenerationBudget::attempts(200),
            output: None,
        }
    }

    #[test]
    fn sync_renders_every_voice() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("voices.json");
        std::fs::write(&path, VOICES).unwrap();

        let result = execute(&options(path.to_string_lossy().into_owned())).unwrap();
        assert_eq!(result.principal, "melody");
        assert_eq!(result.voices.len(), 2);
        assert_eq!(result.results.len(), 2);

        for candidate in &result.results {
            let bass = &candidate.voices[1];
            assert_eq!(bass.key, "bass");
            assert_eq!(bass.events.len(), bass.rendered.len());
            for (event, rendered) in bass.events.iter().zip(&bass.rendered) {
                match (event, rendered) {
                    (SyncEvent::State(_), RenderedEvent::Event(v)) => {
                        assert!([36.0, 43.0].contains(&v[0]))
                    }
                    (SyncEvent::Gap, RenderedEvent::Gap) => {}
                    other => panic!("mismatched event {:?}", other),
                }
            }
        }
    }

    #[test]
    fn sync_rejects_misaligned_voice() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("voices.json");
        std::fs::write(
            &path,
            r#"{"voices": [{"key": "a", "features": [[0.0], [1.0]], "offsets": [0.0]}],
                "threshold": 0.1}"#,
        )
        .unwrap();

        let err = execute(&options(path.to_string_lossy().into_owned())).unwrap_err();
        assert_eq!(JsonError::from_error(&err).code, "ORACLE_002");
    }
}
