//! Offset alignment between voices.
//!
//! Every voice carries the onset offset of each of its states. Offsets are
//! compared exactly: two voices are co-present at an offset only when both
//! have an event starting at that very value.

use crate::error::{OracleError, OracleResult};
use crate::oracle::Oracle;

/// Onset offsets of one voice's states.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTimeline {
    key: String,
    offsets: Vec<f64>,
}

impl VoiceTimeline {
    /// Validates `offsets` against a voice with `states` real states.
    pub fn new(key: impl Into<String>, offsets: Vec<f64>, states: usize) -> OracleResult<Self> {
        let key = key.into();
        if offsets.is_empty() {
            return Err(OracleError::alignment(key, "voice has no events"));
        }
        if offsets.len() != states {
            return Err(OracleError::alignment(
                key,
                format!("{} offsets for {} states", offsets.len(), states),
            ));
        }
        if offsets.iter().any(|o| !o.is_finite()) {
            return Err(OracleError::alignment(key, "offsets must be finite"));
        }
        if let Some(i) = offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(OracleError::alignment(
                key,
                format!(
                    "offsets must be non-decreasing ({} follows {} at event {})",
                    offsets[i + 1],
                    offsets[i],
                    i + 1
                ),
            ));
        }
        Ok(Self { key, offsets })
    }

    /// Voice key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always false; empty timelines are rejected.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset of 1-based `state`; the root has none.
    pub fn offset_of(&self, state: usize) -> Option<f64> {
        state.checked_sub(1).and_then(|i| self.offsets.get(i)).copied()
    }

    /// First state starting exactly at `offset`.
    pub fn state_at(&self, offset: f64) -> Option<usize> {
        let i = self.offsets.partition_point(|&o| o < offset);
        (self.offsets.get(i) == Some(&offset)).then_some(i + 1)
    }

    /// Last state starting at or before `offset` (0 when none has).
    pub fn sounding_at(&self, offset: f64) -> usize {
        self.offsets.partition_point(|&o| o <= offset)
    }

    /// First state starting at or after `offset`.
    pub fn next_at_or_after(&self, offset: f64) -> Option<usize> {
        let i = self.offsets.partition_point(|&o| o < offset);
        (i < self.offsets.len()).then_some(i + 1)
    }
}

/// One registered voice.
#[derive(Debug, Clone)]
pub struct EnsembleVoice<'a> {
    /// The voice's oracle.
    pub oracle: &'a Oracle,
    /// The voice's offsets.
    pub timeline: VoiceTimeline,
}

/// Voices generated together, with the principal voice resolved.
#[derive(Debug, Clone)]
pub struct Ensemble<'a> {
    voices: Vec<EnsembleVoice<'a>>,
    principal: usize,
}

impl<'a> Ensemble<'a> {
    /// Registers voices in order. The voice with the most states is the
    /// principal; the first registered wins ties.
    pub fn new<K>(voices: Vec<(K, &'a Oracle, Vec<f64>)>) -> OracleResult<Self>
    where
        K: Into<String>,
    {
        if voices.is_empty() {
            return Err(OracleError::config("at least one voice is required"));
        }

        let mut registered: Vec<EnsembleVoice<'a>> = Vec::with_capacity(voices.len());
        for (key, oracle, offsets) in voices {
            let key = key.into();
            if registered.iter().any(|v| v.timeline.key() == key) {
                return Err(OracleError::config(format!("duplicate voice key '{}'", key)));
            }
            let timeline = VoiceTimeline::new(key, offsets, oracle.last_state())?;
            registered.push(EnsembleVoice { oracle, timeline });
        }

        let mut principal = 0;
        for (i, voice) in registered.iter().enumerate() {
            if voice.oracle.n_states() > registered[principal].oracle.n_states() {
                principal = i;
            }
        }

        Ok(Self {
            voices: registered,
            principal,
        })
    }

    /// Registered voices in order.
    pub fn voices(&self) -> &[EnsembleVoice<'a>] {
        &self.voices
    }

    /// Number of voices.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Always false; empty ensembles are rejected.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Index of the principal voice.
    pub fn principal(&self) -> usize {
        self.principal
    }

    /// Key of the principal voice.
    pub fn principal_key(&self) -> &str {
        self.voices[self.principal].timeline.key()
    }

    /// Offset of `state` in voice `voice`.
    pub fn offset_of(&self, voice: usize, state: usize) -> Option<f64> {
        self.voices[voice].timeline.offset_of(state)
    }

    /// Each voice's first state at `offset`, `None` where the voice has no
    /// event there.
    pub fn states_at(&self, offset: f64) -> Vec<Option<usize>> {
        self.voices
            .iter()
            .map(|v| v.timeline.state_at(offset))
            .collect()
    }

    /// Co-present states for principal state `k`. At the root every voice is
    /// at its root.
    pub fn find_ks(&self, k: usize) -> Vec<Option<usize>> {
        match self.offset_of(self.principal, k) {
            Some(offset) => self.states_at(offset),
            None => vec![Some(0); self.voices.len()],
        }
    }

    /// True when every voice co-present in `present` has an event at
    /// `offset`.
    pub fn synchronized(&self, offset: f64, present: &[Option<usize>]) -> bool {
        self.voices
            .iter()
            .zip(present)
            .filter(|(_, state)| state.is_some())
            .all(|(voice, _)| voice.timeline.state_at(offset).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_oracle;
    use crate::config::OracleParams;
    use crate::distance::DistanceKind;
    use pretty_assertions::assert_eq;

    fn oracle_of(len: usize) -> Oracle {
        let features: Vec<Vec<f64>> = (0..len).map(|i| vec![i as f64]).collect();
        let params = OracleParams::new(1)
            .with_threshold(0.1)
            .with_distance(DistanceKind::Euclidean);
        build_oracle(&features, &params).unwrap()
    }

    #[test]
    fn test_timeline_lookups() {
        let timeline = VoiceTimeline::new("v", vec![0.0, 0.5, 0.5, 2.0], 4).unwrap();

        assert_eq!(timeline.offset_of(0), None);
        assert_eq!(timeline.offset_of(2), Some(0.5));
        assert_eq!(timeline.state_at(0.5), Some(2));
        assert_eq!(timeline.state_at(1.0), None);
        assert_eq!(timeline.sounding_at(0.5), 3);
        assert_eq!(timeline.sounding_at(-1.0), 0);
        assert_eq!(timeline.sounding_at(10.0), 4);
        assert_eq!(timeline.next_at_or_after(1.0), Some(4));
        assert_eq!(timeline.next_at_or_after(2.5), None);
    }

    #[test]
    fn test_timeline_rejects_bad_offsets() {
        let err = VoiceTimeline::new("v", vec![0.0, 1.0], 3).unwrap_err();
        assert_eq!(err.code(), "ORACLE_002");
        assert!(VoiceTimeline::new("v", vec![1.0, 0.0], 2).is_err());
        assert!(VoiceTimeline::new("v", vec![0.0, f64::NAN], 2).is_err());
        assert!(VoiceTimeline::new("v", vec![], 0).is_err());
    }

    #[test]
    fn test_principal_is_longest_first_on_ties() {
        let a = oracle_of(2);
        let b = oracle_of(4);
        let c = oracle_of(4);
        let ensemble = Ensemble::new(vec![
            ("a", &a, vec![0.0, 2.0]),
            ("b", &b, vec![0.0, 1.0, 2.0, 3.0]),
            ("c", &c, vec![0.0, 1.0, 2.0, 3.0]),
        ])
        .unwrap();
        assert_eq!(ensemble.principal(), 1);
        assert_eq!(ensemble.principal_key(), "b");
    }

    #[test]
    fn test_find_ks_co_presence() {
        let a = oracle_of(4);
        let b = oracle_of(2);
        let ensemble = Ensemble::new(vec![
            ("a", &a, vec![0.0, 1.0, 2.0, 3.0]),
            ("b", &b, vec![0.0, 2.0]),
        ])
        .unwrap();

        assert_eq!(ensemble.find_ks(0), vec![Some(0), Some(0)]);
        assert_eq!(ensemble.find_ks(1), vec![Some(1), Some(1)]);
        assert_eq!(ensemble.find_ks(2), vec![Some(2), None]);
        assert_eq!(ensemble.find_ks(3), vec![Some(3), Some(2)]);

        let present = ensemble.find_ks(1);
        assert!(ensemble.synchronized(2.0, &present));
        assert!(!ensemble.synchronized(1.0, &present));
        assert!(ensemble.synchronized(1.0, &ensemble.find_ks(2)));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let a = oracle_of(1);
        let err = Ensemble::new(vec![("a", &a, vec![0.0]), ("a", &a, vec![0.0])]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
