use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    beat::{BeatTracker, TempoEstimate},
    encode::encode_pcm16,
    finder::{LoopCandidate, LoopFinder},
    naming::{LoopNameParts, loop_filename},
    pitch::{NoPitch, PitchEstimator, PitchReading},
    report::fingerprint,
    samples::AudioSamples,
    sink::{LoopSink, SinkError},
    synth::{CrossfadeCurve, LoopSynthesizer, SynthRequest},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub start_time: f64,
    pub duration: f64,
    pub crossfade_ms: f64,
    pub crossfade_curve: CrossfadeCurve,
    pub click_reduction_enabled: bool,
}

impl ExportRequest {
    fn synth_request(&self) -> SynthRequest {
        SynthRequest {
            start_time: self.start_time,
            duration: self.duration,
            crossfade_ms: self.crossfade_ms,
            curve: self.crossfade_curve,
            click_reduction: self.click_reduction_enabled,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("no recording loaded")]
    NoRecording,
    #[error("recording is empty")]
    EmptyRecording,
    #[error("start time {0} must be a finite, non-negative number of seconds")]
    InvalidStart(f64),
    #[error("duration {0} must be a finite, positive number of seconds")]
    InvalidDuration(f64),
    #[error("crossfade {0} ms must be finite and non-negative")]
    InvalidCrossfade(f64),
    #[error(
        "region {start_time}s + {duration}s exceeds recording length {recording_duration}s"
    )]
    RegionOutOfBounds {
        start_time: f64,
        duration: f64,
        recording_duration: f64,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid export request: {0}")]
    Validation(#[from] ValidationError),
    #[error("another export is already in progress")]
    Concurrency,
    #[error("export cancelled")]
    Cancelled,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ExportError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Sink(error) => error.is_cancelled(),
            Self::Validation(_) | Self::Concurrency => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Idle,
    Validating,
    Analyzing,
    Synthesizing,
    Encoding,
    Handoff,
    Failed,
}

impl ExportPhase {
    #[must_use]
    pub fn percent(self) -> u8 {
        match self {
            Self::Validating | Self::Idle | Self::Failed => 0,
            Self::Analyzing => 15,
            Self::Synthesizing => 30,
            Self::Encoding => 70,
            Self::Handoff => 90,
        }
    }
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Analyzing => "analyzing",
            Self::Synthesizing => "synthesizing",
            Self::Encoding => "encoding",
            Self::Handoff => "handoff",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportProgress {
    Phase { phase: ExportPhase, percent: u8 },
    Completed,
}

impl ExportProgress {
    #[must_use]
    pub fn percent(&self) -> u8 {
        match self {
            Self::Phase { percent, .. } => *percent,
            Self::Completed => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub filename: String,
    pub byte_len: usize,
    pub crossfade_samples: usize,
    pub click_reduction_applied: bool,
    pub bpm: Option<u32>,
    pub pitch: Option<PitchReading>,
    pub sha256: String,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingSettings {
    pub filename_prefix: String,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            filename_prefix: "loop".to_string(),
        }
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a AtomicBool,
    phase: &'a Mutex<ExportPhase>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = ExportPhase::Idle;
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

pub struct ExportCoordinator {
    recording: Mutex<Option<Arc<AudioSamples>>>,
    tracker: Mutex<BeatTracker>,
    finder: LoopFinder,
    synthesizer: LoopSynthesizer,
    pitch: Box<dyn PitchEstimator>,
    naming: NamingSettings,
    in_flight: AtomicBool,
    phase: Mutex<ExportPhase>,
}

impl Default for ExportCoordinator {
    fn default() -> Self {
        Self::new(
            BeatTracker::default(),
            LoopFinder::default(),
            LoopSynthesizer::default(),
            Box::new(NoPitch),
            NamingSettings::default(),
        )
    }
}

impl fmt::Debug for ExportCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportCoordinator")
            .field("recording", &self.recording.lock().as_ref().map(|samples| samples.id()))
            .field("phase", &self.phase())
            .field("in_flight", &self.is_export_in_progress())
            .finish_non_exhaustive()
    }
}

impl ExportCoordinator {
    #[must_use]
    pub fn new(
        tracker: BeatTracker,
        finder: LoopFinder,
        synthesizer: LoopSynthesizer,
        pitch: Box<dyn PitchEstimator>,
        naming: NamingSettings,
    ) -> Self {
        Self {
            recording: Mutex::new(None),
            tracker: Mutex::new(tracker),
            finder,
            synthesizer,
            pitch,
            naming,
            in_flight: AtomicBool::new(false),
            phase: Mutex::new(ExportPhase::Idle),
        }
    }

    #[instrument(
        skip(self, samples),
        fields(recording_id = %samples.id(), frames = samples.frames())
    )]
    pub fn set_recording(&self, samples: Arc<AudioSamples>) {
        *self.recording.lock() = Some(samples);
        self.tracker.lock().invalidate();
        info!("recording replaced");
    }

    pub fn clear_recording(&self) {
        *self.recording.lock() = None;
        self.tracker.lock().invalidate();
        info!("recording cleared");
    }

    #[must_use]
    pub fn recording(&self) -> Option<Arc<AudioSamples>> {
        self.recording.lock().clone()
    }

    #[must_use]
    pub fn phase(&self) -> ExportPhase {
        *self.phase.lock()
    }

    #[must_use]
    pub fn is_export_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tempo(&self) -> Option<TempoEstimate> {
        let recording = self.recording()?;
        Some(self.tracker.lock().tempo(&recording).clone())
    }

    #[instrument(skip(self))]
    pub fn find_loops(&self, target_duration: f64, tolerance: f64) -> Vec<LoopCandidate> {
        let Some(recording) = self.recording() else {
            debug!("no recording loaded, nothing to scan");
            return Vec::new();
        };
        let tempo = self.tracker.lock().tempo(&recording).clone();
        self.finder
            .find_perfect_loops(&recording, &tempo, target_duration, tolerance)
    }

    pub fn run<F>(
        &self,
        request: &ExportRequest,
        sink: &dyn LoopSink,
        on_progress: F,
    ) -> Result<ExportReceipt, ExportError>
    where
        F: FnMut(ExportProgress),
    {
        self.run_with_cancel(request, sink, &CancelToken::new(), on_progress)
    }

    #[instrument(
        skip(self, sink, cancel, on_progress),
        fields(start_time = request.start_time, duration = request.duration)
    )]
    pub fn run_with_cancel<F>(
        &self,
        request: &ExportRequest,
        sink: &dyn LoopSink,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<ExportReceipt, ExportError>
    where
        F: FnMut(ExportProgress),
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("export rejected, another export is in flight");
            return Err(ExportError::Concurrency);
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            phase: &self.phase,
        };

        let result = self.run_phases(request, sink, cancel, &mut on_progress);
        match &result {
            Ok(receipt) => {
                on_progress(ExportProgress::Completed);
                info!(
                    filename = %receipt.filename,
                    bytes = receipt.byte_len,
                    sha256 = %receipt.sha256,
                    "export completed"
                );
            }
            Err(error) if error.is_cancelled() => {
                *self.phase.lock() = ExportPhase::Failed;
                info!(%error, "export cancelled");
            }
            Err(error) => {
                *self.phase.lock() = ExportPhase::Failed;
                warn!(%error, "export failed");
            }
        }
        result
    }

    fn enter<F>(
        &self,
        phase: ExportPhase,
        cancel: &CancelToken,
        on_progress: &mut F,
    ) -> Result<(), ExportError>
    where
        F: FnMut(ExportProgress),
    {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        *self.phase.lock() = phase;
        debug!(%phase, "export phase entered");
        on_progress(ExportProgress::Phase {
            phase,
            percent: phase.percent(),
        });
        Ok(())
    }

    fn run_phases<F>(
        &self,
        request: &ExportRequest,
        sink: &dyn LoopSink,
        cancel: &CancelToken,
        on_progress: &mut F,
    ) -> Result<ExportReceipt, ExportError>
    where
        F: FnMut(ExportProgress),
    {
        self.enter(ExportPhase::Validating, cancel, on_progress)?;
        let recording = self.validate(request)?;

        self.enter(ExportPhase::Analyzing, cancel, on_progress)?;
        let bpm = self.tracker.lock().tempo(&recording).bpm;
        let pitch = self
            .pitch
            .estimate(&recording, request.start_time, request.duration);
        let filename = loop_filename(&LoopNameParts {
            prefix: &self.naming.filename_prefix,
            pitch: pitch.as_ref(),
            bpm,
            duration: request.duration,
            curve: request.crossfade_curve,
            click_reduction: request.click_reduction_enabled,
            timestamp: Utc::now(),
        });

        self.enter(ExportPhase::Synthesizing, cancel, on_progress)?;
        let buffer = self
            .synthesizer
            .synthesize(&recording, &request.synth_request());

        self.enter(ExportPhase::Encoding, cancel, on_progress)?;
        let bytes = encode_pcm16(&buffer);

        self.enter(ExportPhase::Handoff, cancel, on_progress)?;
        sink.offer(&bytes, &filename)?;

        Ok(ExportReceipt {
            filename,
            byte_len: bytes.len(),
            crossfade_samples: buffer.crossfade_samples,
            click_reduction_applied: buffer.click_reduction_applied,
            bpm,
            pitch,
            sha256: fingerprint(&bytes),
        })
    }

    fn validate(&self, request: &ExportRequest) -> Result<Arc<AudioSamples>, ValidationError> {
        let recording = self.recording().ok_or(ValidationError::NoRecording)?;
        if recording.is_empty() || recording.channel_count() == 0 {
            return Err(ValidationError::EmptyRecording);
        }
        if !request.start_time.is_finite() || request.start_time < 0.0 {
            return Err(ValidationError::InvalidStart(request.start_time));
        }
        if !request.duration.is_finite() || request.duration <= 0.0 {
            return Err(ValidationError::InvalidDuration(request.duration));
        }
        if !request.crossfade_ms.is_finite() || request.crossfade_ms < 0.0 {
            return Err(ValidationError::InvalidCrossfade(request.crossfade_ms));
        }

        let recording_duration = recording.duration_seconds();
        if request.duration > recording_duration - request.start_time {
            return Err(ValidationError::RegionOutOfBounds {
                start_time: request.start_time,
                duration: request.duration,
                recording_duration,
            });
        }

        Ok(recording)
    }
}
