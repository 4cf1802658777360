use seamloop_core::{
    AudioSamples, CrossfadeCurve, LoopSynthesizer, SynthRequest, SynthTuning,
    fixtures::{FIXTURE_SAMPLE_RATE, looping_pad},
};

fn request(start_time: f64, duration: f64, crossfade_ms: f64) -> SynthRequest {
    SynthRequest {
        start_time,
        duration,
        crossfade_ms,
        curve: CrossfadeCurve::Linear,
        click_reduction: false,
    }
}

#[test]
fn twenty_milliseconds_at_44_1_khz_is_882_samples() {
    let synthesizer = LoopSynthesizer::default();
    assert_eq!(synthesizer.crossfade_samples(20.0, 44_100, 88_200), 882);
}

#[test]
fn crossfade_is_capped_at_a_quarter_of_the_loop() {
    let synthesizer = LoopSynthesizer::default();
    assert_eq!(synthesizer.crossfade_samples(1_000.0, 44_100, 4_001), 1_000);
    assert_eq!(synthesizer.crossfade_samples(5.0, 8_000, 3), 0);

    let custom = LoopSynthesizer::new(SynthTuning {
        crossfade_ceiling_ratio: 0.1,
        ..SynthTuning::default()
    });
    assert_eq!(custom.crossfade_samples(1_000.0, 44_100, 4_000), 400);
}

#[test]
fn output_keeps_layout_and_rate() {
    let recording = looping_pad(120, 4.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let buffer = LoopSynthesizer::default().synthesize(&recording, &request(0.5, 2.0, 20.0));

    assert_eq!(buffer.sample_rate, FIXTURE_SAMPLE_RATE);
    assert_eq!(buffer.channel_count(), 2);
    assert_eq!(buffer.frames(), 44_100);
    assert_eq!(buffer.crossfade_samples, 441);
    assert!(!buffer.click_reduction_applied);
    assert!((buffer.duration_seconds() - 2.0).abs() < 1e-9);
}

#[test]
fn zero_crossfade_copies_the_region_verbatim() {
    let recording = looping_pad(120, 2.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let mut no_fade = request(0.2, 1.0, 0.0);
    no_fade.click_reduction = true;
    let buffer = LoopSynthesizer::default().synthesize(&recording, &no_fade);

    assert_eq!(buffer.crossfade_samples, 0);
    assert!(!buffer.click_reduction_applied);
    let start = 4_410;
    for (channel, output) in buffer.channels.iter().enumerate() {
        assert_eq!(output.as_slice(), &recording.channel(channel)[start..start + 22_050]);
    }
}

#[test]
fn region_past_the_end_is_zero_padded() {
    let recording = AudioSamples::mono(1_000, vec![0.5; 1_000]).expect("valid");
    let buffer = LoopSynthesizer::default().synthesize(&recording, &request(0.9, 0.2, 0.0));

    assert_eq!(buffer.frames(), 200);
    assert!(buffer.channels[0][..100].iter().all(|sample| (sample - 0.5).abs() < f32::EPSILON));
    assert!(buffer.channels[0][100..].iter().all(|sample| sample.abs() < f32::EPSILON));
}

#[test]
fn linear_blend_moves_tail_into_head() {
    // Head is 0.0, tail is 1.0; a 4-sample linear fade on a 16-sample loop.
    let mut source = vec![0.0_f32; 16];
    source[12..].fill(1.0);
    let recording = AudioSamples::mono(1_000, source).expect("valid");
    let buffer = LoopSynthesizer::default().synthesize(&recording, &request(0.0, 0.016, 4.0));

    assert_eq!(buffer.crossfade_samples, 4);
    let output = &buffer.channels[0];
    let expected_head = [1.0, 0.75, 0.5, 0.25];
    let expected_tail = [1.0, 0.75, 0.5, 0.25];
    for index in 0..4 {
        assert!((output[index] - expected_head[index]).abs() < 1e-6, "{output:?}");
        assert!((output[12 + index] - expected_tail[index]).abs() < 1e-6, "{output:?}");
    }
    assert!(output[4..12].iter().all(|sample| sample.abs() < f32::EPSILON));
}

#[test]
fn click_reduction_only_runs_with_a_crossfade() {
    let recording = looping_pad(120, 2.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    let mut with_fade = request(0.0, 1.0, 20.0);
    with_fade.click_reduction = true;
    with_fade.curve = CrossfadeCurve::Cosine;

    let buffer = LoopSynthesizer::default().synthesize(&recording, &with_fade);
    assert!(buffer.click_reduction_applied);
    assert_eq!(buffer.crossfade_samples, 441);
    assert!(
        buffer
            .channels
            .iter()
            .flatten()
            .all(|sample| sample.is_finite())
    );
}
