pub mod beat;
pub mod config;
pub mod diagnostics;
pub mod encode;
pub mod export;
pub mod finder;
pub mod fixtures;
pub mod naming;
pub mod pitch;
pub mod report;
pub mod samples;
pub mod scoring;
pub mod sink;
pub mod synth;
pub mod time;

pub use beat::{BeatMark, BeatTracker, BeatTuning, TempoEstimate, detect_beats};
pub use config::{AppConfig, DiagnosticsConfig, ExportConfig};
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use encode::{encode_pcm16, encode_pcm16_with_rng, pcm16_to_f32, quantize_pcm16};
pub use export::{
    CancelToken, ExportCoordinator, ExportError, ExportPhase, ExportProgress, ExportReceipt,
    ExportRequest, NamingSettings, ValidationError,
};
pub use finder::{FinderTuning, LoopCandidate, LoopFinder, QualityBand, ScanProgress};
pub use pitch::{AutocorrelationPitch, NoPitch, PitchEstimator, PitchReading};
pub use report::{LoopReport, build_loop_report, read_loop_report, write_loop_report};
pub use samples::{AudioSamples, SampleError, load_wav, write_wav};
pub use scoring::{LoopScorer, ScoreBreakdown, ScoreTuning, ScoreWeights};
pub use sink::{DirectorySink, LoopSink, MemorySink, SinkError};
pub use synth::{CrossfadeCurve, LoopBuffer, LoopSynthesizer, SynthRequest, SynthTuning};
