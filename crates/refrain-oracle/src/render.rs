//! Hand-off of generated states to a renderer.
//!
//! Generators emit 1-based state indices. Renderers want the vectors those
//! states stand for, usually the unnormalized ones the oracle was not built
//! on, so the caller supplies the matrix to look them up in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};
use crate::generate::{SyncEvent, SyncGeneration};

/// One rendered step of a voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderedEvent {
    /// Feature vector of the emitted state.
    Event(Vec<f64>),
    /// No event; the renderer should insert a rest.
    Gap,
}

/// Rendered output of one voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedVoice {
    /// Voice key.
    pub key: String,
    /// Rendered steps in order.
    pub events: Vec<RenderedEvent>,
}

/// Maps a single-oracle sequence onto `features` (state `i` is row `i - 1`).
pub fn render_single(sequence: &[usize], features: &[Vec<f64>]) -> OracleResult<Vec<Vec<f64>>> {
    sequence
        .iter()
        .map(|&state| lookup(state, features).cloned())
        .collect()
}

/// Maps every voice of a synchronized generation onto its feature matrix.
pub fn render_voices(
    result: &SyncGeneration,
    features: &HashMap<String, Vec<Vec<f64>>>,
) -> OracleResult<Vec<RenderedVoice>> {
    result
        .voices
        .iter()
        .map(|voice| {
            let rows = features.get(&voice.key).ok_or_else(|| {
                OracleError::alignment(&voice.key, "no feature matrix supplied for voice")
            })?;
            let events = voice
                .events
                .iter()
                .map(|event| match event {
                    SyncEvent::State(state) => lookup(*state, rows)
                        .map(|row| RenderedEvent::Event(row.clone()))
                        .map_err(|e| OracleError::alignment(&voice.key, e.to_string())),
                    SyncEvent::Gap => Ok(RenderedEvent::Gap),
                })
                .collect::<OracleResult<Vec<_>>>()?;
            Ok(RenderedVoice {
                key: voice.key.clone(),
                events,
            })
        })
        .collect()
}

fn lookup(state: usize, features: &[Vec<f64>]) -> OracleResult<&Vec<f64>> {
    state
        .checked_sub(1)
        .and_then(|row| features.get(row))
        .ok_or_else(|| {
            OracleError::config(format!(
                "state {} has no feature row (matrix has {} rows)",
                state,
                features.len()
            ))
        })
}
