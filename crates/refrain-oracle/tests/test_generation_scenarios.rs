//! End-to-end scenarios: corpus in, rendered sequences out.
//!
//! These tests drive the public API the way the command-line tool does:
//! parse a corpus, pick or apply a threshold, build oracles, generate, and
//! map the generated states back to feature vectors.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use refrain_oracle::{
    build_oracle, build_with_best_threshold, create_rng, generate, generate_ranked_single,
    generate_ranked_sync, render_single, render_voices, select_threshold, sync_generate,
    CancelToken, Corpus, DistanceKind, Ensemble, GenerationBudget, MultiCorpus, Oracle,
    OracleParams, RenderedEvent, SingleRequest, StartPosition, SyncRequest, ThresholdSweep,
};

// =============================================================================
// Helper Functions
// =============================================================================

const CORPUS_JSON: &str = r#"{
    "features": [[0.0], [1.0], [0.0], [1.0], [2.0], [0.0], [1.0], [2.0]],
    "original": [[60.0], [62.0], [60.0], [62.0], [64.0], [60.0], [62.0], [64.0]],
    "distance": "euclidean"
}"#;

const MULTI_JSON: &str = r#"{
    "voices": [
        {
            "key": "melody",
            "features": [[0.0], [1.0], [0.0], [1.0], [0.0], [1.0]],
            "offsets": [0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            "original": [[72.0], [74.0], [72.0], [74.0], [72.0], [74.0]]
        },
        {
            "key": "bass",
            "features": [[0.0], [1.0], [0.0]],
            "offsets": [0.0, 2.0, 4.0],
            "original": [[36.0], [43.0], [36.0]]
        }
    ],
    "distance": "euclidean",
    "threshold": 0.1
}"#;

/// Number of states merged into an earlier symbol class.
fn merges(oracle: &Oracle) -> usize {
    oracle.last_state() - oracle.num_symbols()
}

fn p7_oracle() -> Oracle {
    let features = vec![vec![0.0], vec![1.0], vec![0.0], vec![1.0], vec![2.0]];
    let params = OracleParams::new(1)
        .with_weights(vec![1.0])
        .with_threshold(0.1)
        .with_distance(DistanceKind::Euclidean);
    build_oracle(&features, &params).unwrap()
}

// =============================================================================
// Construction Scenarios
// =============================================================================

#[test]
fn test_repeated_pair_structure() {
    let oracle = p7_oracle();
    assert_eq!(oracle.n_states(), 6);
    assert_eq!(oracle.lrs_all(), &[0, 0, 0, 1, 2, 0]);
    assert_eq!(oracle.sfx(3), Some(1));
    assert_eq!(oracle.sfx(4), Some(2));
    assert_eq!(oracle.num_symbols(), 3);
}

#[test]
fn test_repeated_pair_generation_copies_run() {
    let oracle = p7_oracle();
    let request = SingleRequest::new(8, 0.0).with_min_lrs(2);
    let result = generate(&oracle, &request, &mut create_rng(5)).unwrap();

    // The only context with a repeated suffix of two is the pair [0, 1].
    let pairs = result
        .sequence
        .windows(2)
        .filter(|w| *w == [1, 2] || *w == [3, 4])
        .count();
    assert!(pairs >= 1, "sequence {:?} has no repeated pair", result.sequence);
    assert!(result.sequence.iter().all(|&s| (1..=5).contains(&s)));
}

#[test]
fn test_looser_threshold_never_merges_less() {
    let features = vec![vec![0.0], vec![1.0], vec![0.0], vec![1.0], vec![2.0]];
    let counts: Vec<usize> = [0.0, 0.1, 0.5, 1.5, 2.5]
        .iter()
        .map(|&t| {
            let params = OracleParams::new(1)
                .with_threshold(t)
                .with_distance(DistanceKind::Euclidean);
            merges(&build_oracle(&features, &params).unwrap())
        })
        .collect();

    assert_eq!(counts, vec![0, 2, 2, 4, 4]);
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_fixed_dimension_blocks_merge_at_any_threshold() {
    let features = vec![vec![0.0, 1.0], vec![0.0, 2.0]];
    for threshold in [0.5, 10.0, 1000.0] {
        let free = OracleParams::new(2)
            .with_threshold(threshold)
            .with_distance(DistanceKind::Euclidean);
        let fixed = free.clone().with_fixed(vec![false, true]);

        let oracle = build_oracle(&features, &fixed).unwrap();
        assert_eq!(oracle.num_symbols(), 2, "threshold {}", threshold);
        if threshold > 1.0 {
            assert_eq!(build_oracle(&features, &free).unwrap().num_symbols(), 1);
        }
    }
}

// =============================================================================
// Threshold Sweep Scenarios
// =============================================================================

#[test]
fn test_sweep_reproducible_on_increasing_input() {
    let features: Vec<Vec<f64>> = (0..20).map(|i| vec![f64::from(i) * 0.05]).collect();
    let params = OracleParams::new(1).with_distance(DistanceKind::Euclidean);
    let sweep = ThresholdSweep::default();

    let first = select_threshold(&features, &params, &sweep).unwrap();
    let second = select_threshold(&features, &params, &sweep).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.ranked.len(), 10);
    assert!(first
        .ranked
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_corpus_without_threshold_uses_sweep() {
    let corpus = Corpus::from_json(CORPUS_JSON).unwrap();
    assert_eq!(corpus.threshold, None);

    let params = corpus.params().unwrap();
    let (oracle, selection) =
        build_with_best_threshold(&corpus.features, &params, &ThresholdSweep::default()).unwrap();

    assert_eq!(oracle.n_states(), corpus.features.len() + 1);
    assert_eq!(
        oracle.params().threshold,
        selection.best_threshold().unwrap()
    );
}

// =============================================================================
// Rendering Scenarios
// =============================================================================

#[test]
fn test_single_corpus_renders_original_vectors() {
    let corpus = Corpus::from_json(CORPUS_JSON).unwrap();
    let params = corpus.params().unwrap().with_threshold(0.1);
    let oracle = build_oracle(&corpus.features, &params).unwrap();

    let ranked = generate_ranked_single(
        &oracle,
        &SingleRequest::new(12, 0.5),
        3,
        2024,
        GenerationBudget::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(ranked.len(), 3);

    for candidate in &ranked {
        let rendered =
            render_single(&candidate.generation.sequence, corpus.render_features()).unwrap();
        assert_eq!(rendered.len(), 12);
        assert!(rendered
            .iter()
            .all(|v| [60.0, 62.0, 64.0].contains(&v[0])));
    }
}

#[test]
fn test_multi_corpus_renders_aligned_voices() {
    let corpus = MultiCorpus::from_json(MULTI_JSON).unwrap();
    let oracles: Vec<Oracle> = corpus
        .voices
        .iter()
        .map(|voice| build_oracle(&voice.features, &corpus.params_for(voice).unwrap()).unwrap())
        .collect();
    let ensemble = Ensemble::new(
        corpus
            .voices
            .iter()
            .zip(&oracles)
            .map(|(voice, oracle)| (voice.key.clone(), oracle, voice.offsets.clone()))
            .collect(),
    )
    .unwrap();
    assert_eq!(ensemble.principal_key(), "melody");

    let request = SyncRequest::new(6, 0.4).with_start(StartPosition::Root);
    let result = sync_generate(&ensemble, &request, &mut create_rng(9)).unwrap();

    let features: HashMap<String, Vec<Vec<f64>>> = corpus
        .voices
        .iter()
        .map(|voice| (voice.key.clone(), voice.render_features().to_vec()))
        .collect();
    let rendered = render_voices(&result, &features).unwrap();

    assert_eq!(rendered.len(), 2);
    assert_eq!(rendered[0].key, "melody");
    for event in &rendered[1].events {
        if let RenderedEvent::Event(v) = event {
            assert!([36.0, 43.0].contains(&v[0]));
        }
    }
}

#[test]
fn test_ranked_sync_on_corpus() {
    let corpus = MultiCorpus::from_json(MULTI_JSON).unwrap();
    let oracles: Vec<Oracle> = corpus
        .voices
        .iter()
        .map(|voice| build_oracle(&voice.features, &corpus.params_for(voice).unwrap()).unwrap())
        .collect();
    let ensemble = Ensemble::new(
        corpus
            .voices
            .iter()
            .zip(&oracles)
            .map(|(voice, oracle)| (voice.key.as_str(), oracle, voice.offsets.clone()))
            .collect(),
    )
    .unwrap();

    let ranked = generate_ranked_sync(
        &ensemble,
        &SyncRequest::new(10, 0.4),
        2,
        7,
        GenerationBudget::attempts(200),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].discontinuity <= ranked[1].discontinuity);
    for candidate in &ranked {
        for voice in &candidate.generation.voices {
            assert!(voice.states().count() >= 1);
            assert!(voice.gap_count() <= 10 / 5);
        }
    }
}
