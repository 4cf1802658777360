use seamloop_core::{
    AudioSamples, BeatTuning, FinderTuning, LoopFinder, LoopScorer, QualityBand, ScanProgress,
    TempoEstimate, detect_beats,
    fixtures::{FIXTURE_SAMPLE_RATE, looping_pad},
    finder::scan_starts,
};

#[test]
fn ten_second_recording_probes_159_starts() {
    assert_eq!(scan_starts(10.0, 2.0, 0.1, 0.05).len(), 159);

    let recording = looping_pad(120, 10.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let mut updates: Vec<ScanProgress> = Vec::new();
    let _ = LoopFinder::default().find_perfect_loops_with_progress(
        &recording,
        &TempoEstimate::none(),
        2.0,
        0.1,
        |progress| updates.push(progress),
    );

    let last = updates.last().expect("scan should report progress");
    assert_eq!(last.evaluated, 159);
    assert_eq!(last.total, 159);
    assert!((last.fraction() - 1.0).abs() < f32::EPSILON);
    assert!(updates.windows(2).all(|pair| pair[0].evaluated < pair[1].evaluated));
}

#[test]
fn candidates_are_ranked_and_bounded() {
    let recording = looping_pad(120, 10.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let tempo = detect_beats(&recording, &BeatTuning::default());
    let candidates = LoopFinder::default().find_perfect_loops(&recording, &tempo, 2.0, 0.1);

    assert!(!candidates.is_empty());
    assert!(candidates.len() <= 10);
    for (index, candidate) in candidates.iter().enumerate() {
        assert_eq!(candidate.rank, index + 1);
        assert!(candidate.quality_score > 0.3);
        assert!((candidate.duration - 2.0).abs() < f64::EPSILON);
        assert!(candidate.end_time() <= recording.duration_seconds());
        assert_eq!(candidate.band, QualityBand::from_score(candidate.quality_score));
    }
    assert!(
        candidates
            .windows(2)
            .all(|pair| pair[0].quality_score >= pair[1].quality_score)
    );
}

#[test]
fn recording_shorter_than_target_yields_nothing() {
    let recording = looping_pad(120, 1.5, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let candidates =
        LoopFinder::default().find_perfect_loops(&recording, &TempoEstimate::none(), 2.0, 0.1);
    assert!(candidates.is_empty());

    let empty = AudioSamples::mono(FIXTURE_SAMPLE_RATE, Vec::new()).expect("valid");
    assert!(
        LoopFinder::default()
            .find_perfect_loops(&empty, &TempoEstimate::none(), 2.0, 0.1)
            .is_empty()
    );
}

#[test]
fn quality_floor_and_limit_are_configurable() {
    let recording = looping_pad(120, 6.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let strict = LoopFinder::new(
        LoopScorer::default(),
        FinderTuning {
            quality_floor: 1.0,
            ..FinderTuning::default()
        },
    );
    assert!(
        strict
            .find_perfect_loops(&recording, &TempoEstimate::none(), 1.0, 0.1)
            .is_empty()
    );

    let top_three = LoopFinder::new(
        LoopScorer::default(),
        FinderTuning {
            max_candidates: 3,
            quality_floor: 0.0,
            ..FinderTuning::default()
        },
    );
    let candidates = top_three.find_perfect_loops(&recording, &TempoEstimate::none(), 1.0, 0.1);
    assert_eq!(candidates.len(), 3);
    assert_eq!(
        candidates.iter().map(|candidate| candidate.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}
