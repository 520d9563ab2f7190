//! Tests for the single and synchronized generators.

use pretty_assertions::assert_eq;

use crate::builder::build_oracle;
use crate::config::OracleParams;
use crate::distance::DistanceKind;
use crate::oracle::Oracle;
use crate::rng::create_rng;

use super::*;

fn oracle_for(values: &[f64]) -> Oracle {
    let features: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();
    let params = OracleParams::new(1)
        .with_threshold(0.1)
        .with_distance(DistanceKind::Euclidean);
    build_oracle(&features, &params).unwrap()
}

fn repetitive() -> Oracle {
    oracle_for(&[0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0, 4.0])
}

// ============================================================================
// Single generator
// ============================================================================

#[test]
fn test_straight_walk_without_suffixes() {
    let oracle = oracle_for(&[0.0, 1.0, 2.0, 3.0]);
    let mut rng = create_rng(1);
    let generation = generate(&oracle, &SingleRequest::new(6, 0.5), &mut rng).unwrap();

    // 1 -> 2 -> 3 -> 4 (reset) -> 1 -> 2 -> 3
    assert_eq!(generation.sequence, vec![2, 3, 4, 1, 2, 3]);
    assert_eq!(generation.trace, vec![1, 2, 3, 4, 1, 2, 3]);
    assert_eq!(generation.end_state, 3);
}

#[test]
fn test_zero_p_reproduces_repeated_run() {
    let oracle = oracle_for(&[0.0, 1.0, 0.0, 1.0, 2.0]);
    let request = SingleRequest::new(8, 0.0).with_min_lrs(2);
    let mut rng = create_rng(7);
    let generation = generate(&oracle, &request, &mut rng).unwrap();

    assert_eq!(generation.sequence, vec![2, 3, 4, 5, 1, 2, 3, 4]);
    // States 3, 4 replay the features of states 1, 2.
    let run = generation
        .sequence
        .windows(2)
        .position(|w| w == [3, 4])
        .unwrap();
    let replayed: Vec<&[f64]> = generation.sequence[run..run + 2]
        .iter()
        .map(|&s| oracle.features(s))
        .collect();
    assert_eq!(replayed, vec![oracle.features(1), oracle.features(2)]);
}

#[test]
fn test_start_positions() {
    let oracle = oracle_for(&[0.0, 1.0, 2.0]);
    let mut rng = create_rng(3);

    let from_root = generate(
        &oracle,
        &SingleRequest::new(2, 0.5).with_start(StartPosition::Root),
        &mut rng,
    )
    .unwrap();
    assert_eq!(from_root.sequence, vec![1, 2]);
    assert_eq!(from_root.trace[0], 0);

    let from_end = generate(
        &oracle,
        &SingleRequest::new(2, 0.5).with_start(StartPosition::NearEnd),
        &mut rng,
    )
    .unwrap();
    // The last state has a root suffix, so it continues one past it.
    assert_eq!(from_end.sequence, vec![1, 2]);

    let err = generate(
        &oracle,
        &SingleRequest::new(2, 0.5).with_start(StartPosition::Index(9)),
        &mut rng,
    )
    .unwrap_err();
    assert_eq!(err.code(), "ORACLE_001");
}

#[test]
fn test_sequence_bounds_and_trace_length() {
    let oracle = repetitive();
    for seed in 0..20 {
        for policy in [
            SelectionPolicy::Uniform,
            SelectionPolicy::MaxLrs,
            SelectionPolicy::LrsWeighted,
        ] {
            let request = SingleRequest::new(40, 0.4).with_policy(policy);
            let mut rng = create_rng(seed);
            let generation = generate(&oracle, &request, &mut rng).unwrap();

            assert_eq!(generation.sequence.len(), 40);
            assert!(generation.trace.len() >= 40);
            assert!(generation
                .sequence
                .iter()
                .all(|&s| s >= 1 && s < oracle.n_states()));
        }
    }
}

#[test]
fn test_same_seed_same_sequence() {
    let oracle = repetitive();
    let request = SingleRequest::new(30, 0.3).with_policy(SelectionPolicy::LrsWeighted);
    let a = generate(&oracle, &request, &mut create_rng(99)).unwrap();
    let b = generate(&oracle, &request, &mut create_rng(99)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_injected_selector() {
    struct LastCandidate;
    impl NeighborSelector for LastCandidate {
        fn select(&self, lrs: &[usize], _rng: &mut dyn rand::RngCore) -> Option<usize> {
            lrs.len().checked_sub(1)
        }
    }

    let oracle = repetitive();
    let request = SingleRequest::new(25, 0.0);
    let mut rng = create_rng(5);
    let generation = generate_with(&oracle, &request, &LastCandidate, &mut rng).unwrap();
    assert_eq!(generation.sequence.len(), 25);
}

struct OutOfRange;
impl NeighborSelector for OutOfRange {
    fn select(&self, lrs: &[usize], _rng: &mut dyn rand::RngCore) -> Option<usize> {
        Some(lrs.len() + 3)
    }
}

#[test]
fn test_out_of_range_selector_advances() {
    let oracle = repetitive();
    // p = 0 jumps on every step; every pick is rejected, so the walk advances.
    let request = SingleRequest::new(8, 0.0);
    let generation = generate_with(&oracle, &request, &OutOfRange, &mut create_rng(5)).unwrap();

    assert_eq!(generation.sequence.len(), 8);
    let last = oracle.last_state();
    assert!(generation
        .sequence
        .windows(2)
        .all(|w| w[1] == w[0] + 1 || (w[0] == last && w[1] == 1)));
}

#[test]
fn test_empty_oracle_rejected() {
    let builder = crate::builder::ContinuousBuilder::new(OracleParams::new(1)).unwrap();
    let oracle = crate::builder::OracleBuilder::finish(builder);
    let mut rng = create_rng(1);
    assert!(generate(&oracle, &SingleRequest::new(3, 0.5), &mut rng).is_err());
}

#[test]
fn test_invalid_probability() {
    let oracle = repetitive();
    let mut rng = create_rng(1);
    assert!(generate(&oracle, &SingleRequest::new(3, 1.5), &mut rng).is_err());
    assert!(generate(&oracle, &SingleRequest::new(3, f64::NAN), &mut rng).is_err());
}

#[test]
fn test_start_position_parsing() {
    assert_eq!("root".parse::<StartPosition>().unwrap(), StartPosition::Root);
    assert_eq!("end".parse::<StartPosition>().unwrap(), StartPosition::NearEnd);
    assert_eq!("7".parse::<StartPosition>().unwrap(), StartPosition::Index(7));
    assert!("middle".parse::<StartPosition>().is_err());
    assert_eq!(StartPosition::default().to_string(), "1");
}

// ============================================================================
// Synchronized generator
// ============================================================================

fn two_voices() -> (Oracle, Oracle) {
    (
        oracle_for(&[0.0, 1.0, 2.0, 3.0]),
        oracle_for(&[10.0, 20.0]),
    )
}

#[test]
fn test_sparse_voice_follows_offsets() {
    let (a, b) = two_voices();
    let ensemble = Ensemble::new(vec![
        ("voiceA", &a, vec![0.0, 1.0, 2.0, 3.0]),
        ("voiceB", &b, vec![0.0, 2.0]),
    ])
    .unwrap();
    let request = SyncRequest::new(3, 0.5).with_start(StartPosition::Index(1));
    let result = sync_generate(&ensemble, &request, &mut create_rng(11)).unwrap();

    assert_eq!(result.principal, "voiceA");
    let voice_a = result.voice("voiceA").unwrap();
    let voice_b = result.voice("voiceB").unwrap();
    assert_eq!(
        voice_a.events,
        vec![SyncEvent::State(2), SyncEvent::State(3), SyncEvent::State(4)]
    );
    // Offset 2 is voiceB's second event; it sounds exactly once.
    assert_eq!(voice_b.events, vec![SyncEvent::State(2)]);
    assert_eq!(result.end_state, 0);
}

#[test]
fn test_two_step_walk_emits_sparse_voice_once() {
    let (a, b) = two_voices();
    let ensemble = Ensemble::new(vec![
        ("voiceA", &a, vec![0.0, 1.0, 2.0, 3.0]),
        ("voiceB", &b, vec![0.0, 2.0]),
    ])
    .unwrap();
    let request = SyncRequest::new(2, 0.5).with_start(StartPosition::Index(1));
    let result = sync_generate(&ensemble, &request, &mut create_rng(11)).unwrap();

    assert_eq!(
        result.voice("voiceA").unwrap().events,
        vec![SyncEvent::State(2), SyncEvent::State(3)]
    );
    assert_eq!(
        result.voice("voiceB").unwrap().events,
        vec![SyncEvent::State(2)]
    );
}

#[test]
fn test_sparse_voice_silent_between_events() {
    let (a, b) = two_voices();
    let ensemble = Ensemble::new(vec![
        ("voiceA", &a, vec![0.0, 1.0, 2.0, 3.0]),
        ("voiceB", &b, vec![0.0, 2.0]),
    ])
    .unwrap();
    let request = SyncRequest::new(1, 0.5).with_start(StartPosition::Index(1));
    let result = sync_generate(&ensemble, &request, &mut create_rng(11)).unwrap();

    assert_eq!(result.voices[0].events, vec![SyncEvent::State(2)]);
    assert!(result.voices[1].events.is_empty());
}

#[test]
fn test_root_start_emits_first_events() {
    let (a, b) = two_voices();
    let ensemble = Ensemble::new(vec![
        ("voiceA", &a, vec![0.0, 1.0, 2.0, 3.0]),
        ("voiceB", &b, vec![0.0, 2.0]),
    ])
    .unwrap();
    let request = SyncRequest::new(1, 0.5).with_start(StartPosition::Root);
    let result = sync_generate(&ensemble, &request, &mut create_rng(2)).unwrap();

    assert_eq!(result.voices[0].events, vec![SyncEvent::State(1)]);
    assert_eq!(result.voices[1].events, vec![SyncEvent::State(1)]);
}

#[test]
fn test_sync_states_stay_in_bounds() {
    let a = repetitive();
    let b = oracle_for(&[5.0, 6.0, 5.0, 6.0, 5.0, 6.0]);
    let a_offsets: Vec<f64> = (0..12).map(f64::from).collect();
    let b_offsets: Vec<f64> = (0..6).map(|i| f64::from(i * 2)).collect();
    let ensemble = Ensemble::new(vec![
        ("upper", &a, a_offsets),
        ("lower", &b, b_offsets),
    ])
    .unwrap();

    for seed in 0..25 {
        for policy in [SelectionPolicy::MaxLrs, SelectionPolicy::Uniform] {
            let request = SyncRequest::new(30, 0.4).with_policy(policy);
            let result = sync_generate(&ensemble, &request, &mut create_rng(seed)).unwrap();

            let upper = result.voice("upper").unwrap();
            let lower = result.voice("lower").unwrap();
            assert!(upper.states().all(|s| (1..=12).contains(&s)));
            assert!(lower.states().all(|s| (1..=6).contains(&s)));
            // Every lower offset is also an upper offset.
            assert_eq!(upper.gap_count(), 0);
        }
    }
}

#[test]
fn test_sync_deterministic() {
    let a = repetitive();
    let b = oracle_for(&[5.0, 6.0, 5.0, 6.0, 5.0, 6.0]);
    let ensemble = Ensemble::new(vec![
        ("upper", &a, (0..12).map(f64::from).collect()),
        ("lower", &b, (0..6).map(|i| f64::from(i * 2)).collect()),
    ])
    .unwrap();
    let request = SyncRequest::new(20, 0.4);

    let first = sync_generate(&ensemble, &request, &mut create_rng(77)).unwrap();
    let second = sync_generate(&ensemble, &request, &mut create_rng(77)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_single_voice_ensemble_matches_oracle_bounds() {
    let a = repetitive();
    let ensemble = Ensemble::new(vec![("solo", &a, (0..12).map(f64::from).collect())]).unwrap();
    let request = SyncRequest::new(40, 0.5).with_start(StartPosition::NearEnd);
    let result = sync_generate(&ensemble, &request, &mut create_rng(4)).unwrap();

    let solo = result.voice("solo").unwrap();
    assert_eq!(solo.gap_count(), 0);
    assert!(solo.states().count() >= 40);
}

#[test]
fn test_out_of_range_selector_walks_straight() {
    let a = repetitive();
    let ensemble = Ensemble::new(vec![("solo", &a, (0..12).map(f64::from).collect())]).unwrap();
    let request = SyncRequest::new(20, 0.0);
    let result = sync_generate_with(&ensemble, &request, &OutOfRange, &mut create_rng(6)).unwrap();

    let solo = result.voice("solo").unwrap();
    assert_eq!(solo.gap_count(), 0);
    assert!(solo.states().count() >= 20);
    assert!(solo.states().all(|s| (1..=a.last_state()).contains(&s)));
}

// ============================================================================
// Ranked driver loops
// ============================================================================

#[test]
fn test_ranked_single_sorted_and_reproducible() {
    let oracle = repetitive();
    let template = SingleRequest::new(20, 0.5);
    let cancel = CancelToken::new();

    let ranked =
        generate_ranked_single(&oracle, &template, 5, 42, GenerationBudget::default(), &cancel)
            .unwrap();
    assert_eq!(ranked.len(), 5);
    for pair in ranked.windows(2) {
        assert!(pair[0].jump_fraction <= pair[1].jump_fraction);
    }
    assert!(ranked.iter().all(|r| (0.0..1.0).contains(&r.p)));

    let again =
        generate_ranked_single(&oracle, &template, 5, 42, GenerationBudget::default(), &cancel)
            .unwrap();
    assert_eq!(ranked, again);
}

#[test]
fn test_ranked_single_cancelled() {
    let oracle = repetitive();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = generate_ranked_single(
        &oracle,
        &SingleRequest::new(10, 0.5),
        3,
        1,
        GenerationBudget::default(),
        &cancel,
    )
    .unwrap_err();
    match err {
        crate::error::OracleError::Exhaustion {
            produced, reason, ..
        } => {
            assert_eq!(produced, 0);
            assert_eq!(reason, "cancelled");
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[test]
fn test_ranked_sync_rejects_gappy_results() {
    let (a, b) = two_voices();
    let ensemble = Ensemble::new(vec![
        ("voiceA", &a, vec![0.0, 1.0, 2.0, 3.0]),
        ("voiceB", &b, vec![0.0, 2.0]),
    ])
    .unwrap();
    let template = SyncRequest::new(10, 0.4).with_start(StartPosition::Root);
    let cancel = CancelToken::new();

    let ranked =
        generate_ranked_sync(&ensemble, &template, 3, 8, GenerationBudget::attempts(50), &cancel)
            .unwrap();
    assert_eq!(ranked.len(), 3);
    for result in &ranked {
        assert!((SYNC_P_MIN..SYNC_P_MAX).contains(&result.p));
        for voice in &result.generation.voices {
            assert!(voice.gap_count() <= 2);
            assert!(voice.states().next().is_some());
        }
    }
    for pair in ranked.windows(2) {
        assert!(pair[0].discontinuity <= pair[1].discontinuity);
    }
}

#[test]
fn test_ranked_sync_exhausts_budget() {
    // The sparse voice never reaches its event at offset 2 in one step.
    let (a, b) = two_voices();
    let ensemble = Ensemble::new(vec![
        ("voiceA", &a, vec![0.0, 1.0, 2.0, 3.0]),
        ("voiceB", &b, vec![0.0, 2.0]),
    ])
    .unwrap();
    let template = SyncRequest::new(1, 0.4).with_start(StartPosition::Index(1));
    let cancel = CancelToken::new();

    let err =
        generate_ranked_sync(&ensemble, &template, 1, 8, GenerationBudget::attempts(4), &cancel)
            .unwrap_err();
    assert_eq!(err.code(), "ORACLE_003");
}
