use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::samples::AudioSamples;

pub const DEFAULT_ENERGY_WINDOW_SECONDS: f64 = 0.040;
pub const DEFAULT_THRESHOLD_RATIO: f32 = 0.3;
pub const DEFAULT_EDGE_DIVISOR: usize = 15;
pub const DEFAULT_MIN_BPM: u32 = 60;
pub const DEFAULT_MAX_BPM: u32 = 200;
pub const DEFAULT_STRONG_BEAT_FACTOR: f32 = 1.5;
pub const DEFAULT_INTERVAL_BUCKET_SECONDS: f64 = 0.020;

const MIN_LOCAL_AVERAGE: f32 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatTuning {
    pub energy_window_seconds: f64,
    pub threshold_ratio: f32,
    pub edge_divisor: usize,
    pub min_bpm: u32,
    pub max_bpm: u32,
    pub strong_beat_factor: f32,
    pub interval_bucket_seconds: f64,
}

impl Default for BeatTuning {
    fn default() -> Self {
        Self {
            energy_window_seconds: DEFAULT_ENERGY_WINDOW_SECONDS,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            edge_divisor: DEFAULT_EDGE_DIVISOR,
            min_bpm: DEFAULT_MIN_BPM,
            max_bpm: DEFAULT_MAX_BPM,
            strong_beat_factor: DEFAULT_STRONG_BEAT_FACTOR,
            interval_bucket_seconds: DEFAULT_INTERVAL_BUCKET_SECONDS,
        }
    }
}

impl BeatTuning {
    #[must_use]
    pub fn min_beat_spacing(&self) -> f64 {
        60.0 / f64::from(self.max_bpm.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMark {
    pub time: f64,
    pub strength: f32,
    pub is_strong: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    pub bpm: Option<u32>,
    pub beats: Vec<BeatMark>,
}

impl TempoEstimate {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strong_beat_count(&self) -> usize {
        self.beats.iter().filter(|beat| beat.is_strong).count()
    }

    #[must_use]
    pub fn nearest_beat_distance(&self, time: f64) -> Option<f64> {
        self.beats
            .iter()
            .map(|beat| (beat.time - time).abs())
            .min_by(f64::total_cmp)
    }
}

#[instrument(
    skip(samples, tuning),
    fields(frames = samples.frames(), sample_rate = samples.sample_rate())
)]
pub fn detect_beats(samples: &AudioSamples, tuning: &BeatTuning) -> TempoEstimate {
    let mono = samples.mono_mix();
    let sample_rate = samples.sample_rate();
    let window = (tuning.energy_window_seconds * f64::from(sample_rate)).round() as usize;
    let hop = window / 2;
    if mono.is_empty() || hop == 0 {
        debug!("no audio to track, returning neutral tempo");
        return TempoEstimate::none();
    }

    let energy = windowed_rms(&mono, window, hop);
    let flux = energy_flux(&energy);
    let hop_seconds = hop as f64 / f64::from(sample_rate);
    let mut beats = pick_beats(&flux, hop_seconds, tuning);
    mark_strong_beats(&mut beats, tuning.strong_beat_factor);
    let bpm = estimate_bpm(&beats, tuning);

    debug!(
        energy_frames = energy.len(),
        beats = beats.len(),
        bpm = ?bpm,
        "beat tracking completed"
    );
    TempoEstimate { bpm, beats }
}

fn windowed_rms(samples: &[f32], window: usize, hop: usize) -> Vec<f32> {
    if samples.len() < window {
        return Vec::new();
    }

    let frames = (samples.len() - window) / hop + 1;
    (0..frames)
        .map(|frame| {
            let start = frame * hop;
            let slice = &samples[start..start + window];
            let sum_sq: f32 = slice.iter().map(|sample| sample * sample).sum();
            (sum_sq / window as f32).sqrt()
        })
        .collect()
}

fn energy_flux(energy: &[f32]) -> Vec<f32> {
    let mut flux = Vec::with_capacity(energy.len());
    flux.extend(energy.first().map(|_| 0.0_f32));
    flux.extend(
        energy
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).max(0.0)),
    );
    flux
}

struct Candidate {
    time: f64,
    flux: f32,
    strength: f32,
}

fn pick_beats(flux: &[f32], hop_seconds: f64, tuning: &BeatTuning) -> Vec<BeatMark> {
    let edge = flux.len() / tuning.edge_divisor.max(1);
    if edge == 0 || flux.len() <= edge * 2 {
        trace!(frames = flux.len(), "flux series too short for adaptive peak picking");
        return Vec::new();
    }

    let min_spacing = tuning.min_beat_spacing();
    let mut accepted: Vec<Candidate> = Vec::new();

    for index in edge..flux.len() - edge {
        let value = flux[index];
        let is_local_peak = value > flux[index - 1] && value >= flux[index + 1];
        if !is_local_peak {
            continue;
        }

        let neighbourhood = &flux[index - edge..=index + edge];
        let local_mean = neighbourhood.iter().sum::<f32>() / neighbourhood.len() as f32;
        let local_max = neighbourhood.iter().copied().fold(0.0_f32, f32::max);
        let threshold = local_mean + tuning.threshold_ratio * (local_max - local_mean);
        if value <= threshold {
            continue;
        }

        let candidate = Candidate {
            time: index as f64 * hop_seconds,
            flux: value,
            strength: value / local_mean.max(MIN_LOCAL_AVERAGE),
        };

        match accepted.last_mut() {
            Some(previous) if candidate.time - previous.time < min_spacing => {
                if candidate.flux > previous.flux {
                    *previous = candidate;
                }
            }
            _ => accepted.push(candidate),
        }
    }

    accepted
        .into_iter()
        .map(|candidate| BeatMark {
            time: candidate.time,
            strength: candidate.strength,
            is_strong: false,
        })
        .collect()
}

fn mark_strong_beats(beats: &mut [BeatMark], factor: f32) {
    if beats.is_empty() {
        return;
    }

    let mean_strength = beats.iter().map(|beat| beat.strength).sum::<f32>() / beats.len() as f32;
    for beat in beats {
        beat.is_strong = beat.strength > factor * mean_strength;
    }
}

fn estimate_bpm(beats: &[BeatMark], tuning: &BeatTuning) -> Option<u32> {
    if beats.len() < 2 || tuning.interval_bucket_seconds <= 0.0 {
        return None;
    }

    let mut histogram: BTreeMap<u64, usize> = BTreeMap::new();
    for pair in beats.windows(2) {
        let interval = pair[1].time - pair[0].time;
        let bucket = (interval / tuning.interval_bucket_seconds).round() as u64;
        *histogram.entry(bucket).or_default() += 1;
    }

    // Ties resolve to the shortest interval because BTreeMap iterates ascending.
    let mut modal_bucket = 0_u64;
    let mut modal_count = 0_usize;
    for (&bucket, &count) in &histogram {
        if count > modal_count {
            modal_bucket = bucket;
            modal_count = count;
        }
    }

    if modal_bucket == 0 {
        return None;
    }

    let modal_interval = modal_bucket as f64 * tuning.interval_bucket_seconds;
    let bpm = (60.0 / modal_interval).round() as u32;
    Some(bpm.clamp(tuning.min_bpm, tuning.max_bpm))
}

#[derive(Debug, Clone)]
struct CachedTempo {
    recording_id: Uuid,
    estimate: TempoEstimate,
}

#[derive(Debug, Clone, Default)]
pub struct BeatTracker {
    tuning: BeatTuning,
    cached: Option<CachedTempo>,
}

impl BeatTracker {
    #[must_use]
    pub fn new(tuning: BeatTuning) -> Self {
        Self {
            tuning,
            cached: None,
        }
    }

    #[must_use]
    pub fn tuning(&self) -> &BeatTuning {
        &self.tuning
    }

    pub fn tempo(&mut self, samples: &AudioSamples) -> &TempoEstimate {
        let stale = self
            .cached
            .as_ref()
            .is_none_or(|cached| cached.recording_id != samples.id());
        if stale {
            self.cached = None;
        } else {
            trace!(recording_id = %samples.id(), "tempo cache hit");
        }

        let tuning = &self.tuning;
        let cached = self.cached.get_or_insert_with(|| CachedTempo {
            recording_id: samples.id(),
            estimate: detect_beats(samples, tuning),
        });
        &cached.estimate
    }

    #[must_use]
    pub fn cached(&self) -> Option<&TempoEstimate> {
        self.cached.as_ref().map(|cached| &cached.estimate)
    }

    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            debug!("tempo cache invalidated");
        }
    }
}
