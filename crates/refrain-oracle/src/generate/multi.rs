//! Synchronized traversal of several voices.
//!
//! The principal voice (the one with the most states) drives time. Each step
//! resolves which voices have an event at the principal's current offset,
//! picks one move for one voice (copy a transition, jump through a suffix
//! link, or advance straight ahead), and then brings every voice to the
//! target offset. Voices that cannot follow a jump emit a gap marker.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{OracleError, OracleResult};

use super::align::Ensemble;
use super::policy::{NeighborSelector, SelectionPolicy};
use super::StartPosition;

/// Suffix fallbacks tried when no synchronized transition exists.
pub const DEFAULT_MAX_FALLBACKS: usize = 5;

fn default_policy() -> SelectionPolicy {
    SelectionPolicy::MaxLrs
}

fn default_max_fallbacks() -> usize {
    DEFAULT_MAX_FALLBACKS
}

/// Parameters for one synchronized generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Number of steps.
    pub seq_len: usize,
    /// Probability of copying transitions instead of jumping.
    pub p: f64,
    /// Where the principal voice starts.
    #[serde(default)]
    pub start: StartPosition,
    /// How jump targets are chosen across voices.
    #[serde(default = "default_policy")]
    pub policy: SelectionPolicy,
    /// Suffix fallbacks before giving up on copying.
    #[serde(default = "default_max_fallbacks")]
    pub max_fallbacks: usize,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            seq_len: 16,
            p: 0.5,
            start: StartPosition::default(),
            policy: default_policy(),
            max_fallbacks: DEFAULT_MAX_FALLBACKS,
        }
    }
}

impl SyncRequest {
    /// Creates a request for `seq_len` steps with copy probability `p`.
    pub fn new(seq_len: usize, p: f64) -> Self {
        Self {
            seq_len,
            p,
            ..Self::default()
        }
    }

    /// Sets the start position.
    pub fn with_start(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    /// Sets the selection policy.
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checks the probability.
    pub fn validate(&self) -> OracleResult<()> {
        if !(0.0..=1.0).contains(&self.p) {
            return Err(OracleError::config(format!(
                "copy probability must be within [0, 1], got {}",
                self.p
            )));
        }
        Ok(())
    }
}

/// One emitted step of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A 1-based state of the voice's oracle.
    State(usize),
    /// The voice has no event at the offset the ensemble jumped to.
    Gap,
}

/// Output of one voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceGeneration {
    /// Voice key.
    pub key: String,
    /// Emitted states and gap markers, in order.
    pub events: Vec<SyncEvent>,
    /// Every position the voice visited, starting with its start position.
    pub trace: Vec<usize>,
}

impl VoiceGeneration {
    /// Emitted states, skipping gaps.
    pub fn states(&self) -> impl Iterator<Item = usize> + '_ {
        self.events.iter().filter_map(|e| match e {
            SyncEvent::State(s) => Some(*s),
            SyncEvent::Gap => None,
        })
    }

    /// Number of gap markers.
    pub fn gap_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SyncEvent::Gap))
            .count()
    }
}

/// Output of a synchronized generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGeneration {
    /// Key of the principal voice.
    pub principal: String,
    /// Per-voice output in registration order.
    pub voices: Vec<VoiceGeneration>,
    /// Principal state the traversal stopped at (0 after a reset).
    pub end_state: usize,
}

impl SyncGeneration {
    /// Output of the voice named `key`.
    pub fn voice(&self, key: &str) -> Option<&VoiceGeneration> {
        self.voices.iter().find(|v| v.key == key)
    }
}

/// The move chosen for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Move {
    voice: usize,
    target: usize,
    /// The target is the moving voice's next state and not earlier than the
    /// step start.
    continuation: bool,
}

/// Generates synchronized voices using the request's selection policy.
pub fn sync_generate<R: Rng>(
    ensemble: &Ensemble<'_>,
    request: &SyncRequest,
    rng: &mut R,
) -> OracleResult<SyncGeneration> {
    sync_generate_with(ensemble, request, &request.policy, rng)
}

/// Generates synchronized voices with an injected selection strategy.
pub fn sync_generate_with<R: Rng>(
    ensemble: &Ensemble<'_>,
    request: &SyncRequest,
    selector: &dyn NeighborSelector,
    rng: &mut R,
) -> OracleResult<SyncGeneration> {
    request.validate()?;
    let mut walker = Walker::new(ensemble, request, selector)?;
    for step in 0..request.seq_len {
        walker.step(step, rng);
    }
    Ok(walker.finish())
}

struct Walker<'e, 'a> {
    ensemble: &'e Ensemble<'a>,
    request: &'e SyncRequest,
    selector: &'e dyn NeighborSelector,
    principal_last: usize,
    /// Current principal state.
    k: usize,
    /// Last state emitted (or skipped over) per voice.
    last: Vec<usize>,
    events: Vec<Vec<SyncEvent>>,
    traces: Vec<Vec<usize>>,
}

impl<'e, 'a> Walker<'e, 'a> {
    fn new(
        ensemble: &'e Ensemble<'a>,
        request: &'e SyncRequest,
        selector: &'e dyn NeighborSelector,
    ) -> OracleResult<Self> {
        let principal = ensemble.principal();
        let principal_last = ensemble.voices()[principal].oracle.last_state();
        let k = request.start.resolve(principal_last)?;

        let last: Vec<usize> = match ensemble.offset_of(principal, k) {
            Some(offset) => ensemble
                .voices()
                .iter()
                .map(|v| {
                    v.timeline
                        .state_at(offset)
                        .unwrap_or_else(|| v.timeline.sounding_at(offset))
                })
                .collect(),
            None => vec![0; ensemble.len()],
        };
        let traces = last.iter().map(|&s| vec![s]).collect();

        Ok(Self {
            ensemble,
            request,
            selector,
            principal_last,
            k,
            last,
            events: vec![Vec::new(); ensemble.len()],
            traces,
        })
    }

    fn step<R: Rng>(&mut self, step: usize, rng: &mut R) {
        let start_offset = self.ensemble.offset_of(self.ensemble.principal(), self.k);
        let ks = self.ensemble.find_ks(self.k);

        let has_suffix = self
            .ensemble
            .voices()
            .iter()
            .zip(&ks)
            .any(|(voice, state)| {
                state
                    .and_then(|s| voice.oracle.sfx(s))
                    .map_or(false, |sfx| sfx != 0)
            });

        let mv = if has_suffix {
            let copied = if rng.gen::<f64>() < self.request.p {
                self.copy_transitions(&ks, rng)
            } else {
                None
            };
            match copied {
                Some(mv) => mv,
                None => self.jump(&ks, rng).unwrap_or_else(|| self.straight()),
            }
        } else {
            self.straight()
        };

        trace!(
            step,
            k = self.k,
            voice = mv.voice,
            target = mv.target,
            continuation = mv.continuation,
            "sync step"
        );
        self.apply(mv, start_offset);
    }

    /// Moves a co-present voice along one of its forward transitions whose
    /// target offset every co-present voice shares, retrying from suffix
    /// links when none exists.
    fn copy_transitions<R: Rng>(&mut self, ks: &[Option<usize>], rng: &mut R) -> Option<Move> {
        let ensemble = self.ensemble;
        let mut ks = ks.to_vec();

        for attempt in 0..=self.request.max_fallbacks {
            let mut moves = Vec::new();
            for (v, voice) in ensemble.voices().iter().enumerate() {
                let Some(s) = ks[v] else { continue };
                for &t in voice.oracle.trn(s) {
                    let synced = voice
                        .timeline
                        .offset_of(t)
                        .map_or(false, |off| ensemble.synchronized(off, &ks));
                    if synced {
                        moves.push((v, s, t));
                    }
                }
            }

            if !moves.is_empty() {
                let (voice, from, target) = moves[rng.gen_range(0..moves.len())];
                return Some(Move {
                    voice,
                    target,
                    continuation: attempt == 0 && target == from + 1,
                });
            }
            if attempt == self.request.max_fallbacks {
                break;
            }

            let fallbacks: Vec<(usize, f64)> = ensemble
                .voices()
                .iter()
                .enumerate()
                .filter_map(|(v, voice)| {
                    let sfx = voice.oracle.sfx(ks[v]?)?;
                    if sfx == 0 {
                        return None;
                    }
                    let off = voice.timeline.offset_of(sfx)?;
                    ensemble.synchronized(off, &ks).then_some((v, off))
                })
                .collect();
            if fallbacks.is_empty() {
                break;
            }

            let (_, offset) = fallbacks[rng.gen_range(0..fallbacks.len())];
            ks = ensemble.states_at(offset);
            for (trace, state) in self.traces.iter_mut().zip(&ks) {
                if let Some(s) = state {
                    trace.push(*s);
                }
            }
        }
        None
    }

    /// Jumps one voice through its suffix closure, preferring landings that
    /// keep every co-present voice in sync.
    fn jump<R: Rng>(&mut self, ks: &[Option<usize>], rng: &mut R) -> Option<Move> {
        let ensemble = self.ensemble;
        let mut candidates: Vec<(usize, usize)> = Vec::new();

        for (v, voice) in ensemble.voices().iter().enumerate() {
            let Some(s) = ks[v] else { continue };
            if s == 0 {
                continue;
            }
            let voice_last = voice.oracle.last_state();
            let landable: Vec<usize> = voice
                .oracle
                .suffix_links(s)
                .into_iter()
                .filter(|&c| c < voice_last)
                .collect();
            let synced: Vec<usize> = landable
                .iter()
                .copied()
                .filter(|&c| {
                    voice
                        .timeline
                        .offset_of(c + 1)
                        .map_or(false, |off| ensemble.synchronized(off, ks))
                })
                .collect();
            let chosen = if synced.is_empty() { landable } else { synced };
            candidates.extend(chosen.into_iter().map(|c| (v, c)));
        }

        let lrs: Vec<usize> = candidates
            .iter()
            .map(|&(v, c)| ensemble.voices()[v].oracle.lrs(c))
            .collect();
        let idx = self.selector.select(&lrs, rng)?;
        let &(voice, chosen) = candidates.get(idx)?;

        for (trace, state) in self.traces.iter_mut().zip(ks) {
            if let Some(s) = state {
                trace.push(*s);
            }
        }

        Some(Move {
            voice,
            target: chosen + 1,
            continuation: false,
        })
    }

    /// Advances the principal by one state; from its last state, continues
    /// one past that state's suffix.
    fn straight(&self) -> Move {
        let principal = self.ensemble.principal();
        if self.k < self.principal_last {
            Move {
                voice: principal,
                target: self.k + 1,
                continuation: true,
            }
        } else {
            let oracle = self.ensemble.voices()[principal].oracle;
            Move {
                voice: principal,
                target: oracle.sfx(self.k).unwrap_or(0) + 1,
                continuation: false,
            }
        }
    }

    /// Brings every voice to the move's target offset.
    fn apply(&mut self, mv: Move, start_offset: Option<f64>) {
        let ensemble = self.ensemble;
        let principal = ensemble.principal();
        let Some(target_offset) = ensemble.offset_of(mv.voice, mv.target) else {
            return;
        };
        let continuation =
            mv.continuation && start_offset.map_or(true, |start| target_offset >= start);
        let arrived = ensemble.states_at(target_offset);

        for (v, voice) in ensemble.voices().iter().enumerate() {
            let timeline = &voice.timeline;
            if continuation {
                let upto = timeline.sounding_at(target_offset);
                for j in self.last[v] + 1..=upto {
                    let in_window = match (start_offset, timeline.offset_of(j)) {
                        (Some(start), Some(off)) => off >= start,
                        _ => true,
                    };
                    if in_window {
                        self.events[v].push(SyncEvent::State(j));
                        self.traces[v].push(j);
                    }
                }
                self.last[v] = self.last[v].max(upto);
            } else {
                match arrived[v] {
                    Some(j) => {
                        self.events[v].push(SyncEvent::State(j));
                        self.traces[v].push(j);
                        self.last[v] = j;
                    }
                    None => {
                        self.events[v].push(SyncEvent::Gap);
                        self.last[v] = timeline.sounding_at(target_offset);
                    }
                }
            }
        }

        let master = match arrived[principal] {
            Some(s) if continuation => self.last[principal].max(s),
            Some(s) => s,
            None => ensemble.voices()[principal]
                .timeline
                .next_at_or_after(target_offset)
                .unwrap_or(self.principal_last),
        };

        if master >= self.principal_last {
            self.k = 0;
            self.last = vec![0; ensemble.len()];
        } else {
            self.k = master;
        }
    }

    fn finish(self) -> SyncGeneration {
        let ensemble = self.ensemble;
        let voices = ensemble
            .voices()
            .iter()
            .zip(self.events)
            .zip(self.traces)
            .map(|((voice, events), trace)| VoiceGeneration {
                key: voice.timeline.key().to_string(),
                events,
                trace,
            })
            .collect();

        SyncGeneration {
            principal: ensemble.principal_key().to_string(),
            voices,
            end_state: self.k,
        }
    }
}
