use std::{
    sync::{Arc, Barrier},
    thread,
};

use seamloop_core::{
    AppConfig, AudioSamples, CancelToken, CrossfadeCurve, ExportCoordinator, ExportError,
    ExportPhase, ExportProgress, ExportRequest, LoopSink, MemorySink, SinkError, ValidationError,
    encode::WAV_HEADER_LEN,
    fixtures::{FIXTURE_SAMPLE_RATE, click_track, looping_pad},
    report::fingerprint,
};

fn loaded_coordinator() -> ExportCoordinator {
    let coordinator = ExportCoordinator::default();
    let recording = looping_pad(120, 6.0, FIXTURE_SAMPLE_RATE).expect("fixture should build");
    coordinator.set_recording(Arc::new(recording));
    coordinator
}

fn two_second_request() -> ExportRequest {
    ExportRequest {
        start_time: 0.5,
        duration: 2.0,
        crossfade_ms: 20.0,
        crossfade_curve: CrossfadeCurve::Cosine,
        click_reduction_enabled: false,
    }
}

/// Parks inside `offer` until the test releases it.
struct BlockingSink {
    entered: Barrier,
    release: Barrier,
    inner: MemorySink,
}

impl LoopSink for BlockingSink {
    fn offer(&self, bytes: &[u8], suggested_filename: &str) -> Result<(), SinkError> {
        self.entered.wait();
        self.release.wait();
        self.inner.offer(bytes, suggested_filename)
    }
}

struct DismissingSink;

impl LoopSink for DismissingSink {
    fn offer(&self, _: &[u8], _: &str) -> Result<(), SinkError> {
        Err(SinkError::Cancelled)
    }
}

#[test]
fn export_delivers_named_wav_with_receipt() {
    let coordinator = loaded_coordinator();
    let sink = MemorySink::new();
    let receipt = coordinator
        .run(&two_second_request(), &sink, |_| {})
        .expect("export should succeed");

    let (filename, bytes) = sink.take_last().expect("sink should receive the loop");
    assert_eq!(filename, receipt.filename);
    assert!(
        filename.starts_with("loop_unk_120bpm_1bar_2.00s_cos_"),
        "unexpected filename {filename}"
    );
    assert!(filename.ends_with(".wav"));
    assert_eq!(bytes.len(), WAV_HEADER_LEN + 44_100 * 2 * 2);
    assert_eq!(receipt.byte_len, bytes.len());
    assert_eq!(receipt.sha256, fingerprint(&bytes));
    assert_eq!(receipt.crossfade_samples, 441);
    assert_eq!(receipt.bpm, Some(120));
    assert_eq!(coordinator.phase(), ExportPhase::Idle);
    assert!(!coordinator.is_export_in_progress());
}

#[test]
fn progress_reports_every_milestone_in_order() {
    let coordinator = loaded_coordinator();
    let mut seen = Vec::new();
    coordinator
        .run(&two_second_request(), &MemorySink::new(), |progress| {
            seen.push(progress.percent());
        })
        .expect("export should succeed");
    assert_eq!(seen, vec![0, 15, 30, 70, 90, 100]);
}

#[test]
fn overlapping_export_is_rejected() {
    let coordinator = loaded_coordinator();
    let blocking = BlockingSink {
        entered: Barrier::new(2),
        release: Barrier::new(2),
        inner: MemorySink::new(),
    };
    let request = two_second_request();

    thread::scope(|scope| {
        let first = scope.spawn(|| coordinator.run(&request, &blocking, |_| {}));

        blocking.entered.wait();
        assert!(coordinator.is_export_in_progress());
        assert_eq!(coordinator.phase(), ExportPhase::Handoff);
        let second = coordinator.run(&request, &MemorySink::new(), |_| {});
        assert!(matches!(second, Err(ExportError::Concurrency)));

        blocking.release.wait();
        first
            .join()
            .expect("export thread should not panic")
            .expect("first export should succeed");
    });

    assert!(!coordinator.is_export_in_progress());
    assert_eq!(blocking.inner.delivered().len(), 1);
    coordinator
        .run(&request, &MemorySink::new(), |_| {})
        .expect("slot should be free again");
}

#[test]
fn dismissed_save_is_a_cancellation() {
    let coordinator = loaded_coordinator();
    let error = coordinator
        .run(&two_second_request(), &DismissingSink, |_| {})
        .expect_err("dismissed sink should fail the export");

    assert!(error.is_cancelled());
    assert!(!coordinator.is_export_in_progress());
    assert_eq!(coordinator.phase(), ExportPhase::Idle);
}

#[test]
fn cancel_token_stops_between_phases() {
    let coordinator = loaded_coordinator();
    let sink = MemorySink::new();
    let cancel = CancelToken::new();
    let mut seen = Vec::new();

    let error = coordinator
        .run_with_cancel(&two_second_request(), &sink, &cancel, |progress| {
            seen.push(progress);
            if matches!(
                progress,
                ExportProgress::Phase {
                    phase: ExportPhase::Synthesizing,
                    ..
                }
            ) {
                cancel.cancel();
            }
        })
        .expect_err("cancelled export should not complete");

    assert!(matches!(error, ExportError::Cancelled));
    assert!(error.is_cancelled());
    assert_eq!(
        seen.iter().map(ExportProgress::percent).collect::<Vec<_>>(),
        vec![0, 15, 30]
    );
    assert!(sink.delivered().is_empty());
    assert!(!coordinator.is_export_in_progress());
}

#[test]
fn invalid_requests_fail_validation() {
    let empty = ExportCoordinator::default();
    assert!(matches!(
        empty.run(&two_second_request(), &MemorySink::new(), |_| {}),
        Err(ExportError::Validation(ValidationError::NoRecording))
    ));

    let coordinator = loaded_coordinator();
    let cases = [
        (
            ExportRequest {
                start_time: -0.1,
                ..two_second_request()
            },
            ValidationError::InvalidStart(-0.1),
        ),
        (
            ExportRequest {
                duration: 0.0,
                ..two_second_request()
            },
            ValidationError::InvalidDuration(0.0),
        ),
        (
            ExportRequest {
                crossfade_ms: -5.0,
                ..two_second_request()
            },
            ValidationError::InvalidCrossfade(-5.0),
        ),
        (
            ExportRequest {
                start_time: 5.0,
                ..two_second_request()
            },
            ValidationError::RegionOutOfBounds {
                start_time: 5.0,
                duration: 2.0,
                recording_duration: 6.0,
            },
        ),
    ];

    for (request, expected) in cases {
        match coordinator.run(&request, &MemorySink::new(), |_| {}) {
            Err(ExportError::Validation(actual)) => assert_eq!(actual, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
        assert!(!coordinator.is_export_in_progress());
    }

    let silent = ExportCoordinator::default();
    silent.set_recording(Arc::new(
        AudioSamples::mono(FIXTURE_SAMPLE_RATE, Vec::new()).expect("valid"),
    ));
    assert!(matches!(
        silent.run(&two_second_request(), &MemorySink::new(), |_| {}),
        Err(ExportError::Validation(ValidationError::EmptyRecording))
    ));
}

#[test]
fn replacing_the_recording_refreshes_tempo() {
    let coordinator = loaded_coordinator();
    assert_eq!(coordinator.tempo().and_then(|tempo| tempo.bpm), Some(120));

    let slower = click_track(100, 6.0, FIXTURE_SAMPLE_RATE, 0).expect("fixture should build");
    coordinator.set_recording(Arc::new(slower));
    assert_eq!(coordinator.tempo().and_then(|tempo| tempo.bpm), Some(100));

    coordinator.clear_recording();
    assert!(coordinator.tempo().is_none());
    assert!(coordinator.find_loops(2.0, 0.1).is_empty());
}

#[test]
fn found_candidates_can_be_exported() {
    let coordinator = loaded_coordinator();
    let candidates = coordinator.find_loops(2.0, 0.1);
    let best = candidates.first().expect("fixture should produce candidates");

    let mut config = AppConfig::default();
    config.export.default_crossfade_ms = 10.0;
    let request = config.export_request(best.start_time, best.duration);
    let receipt = coordinator
        .run(&request, &MemorySink::new(), |_| {})
        .expect("best candidate should export");
    assert_eq!(receipt.crossfade_samples, 220);
}
