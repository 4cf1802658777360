use serde::{Deserialize, Serialize};

use crate::{
    beat::TempoEstimate,
    samples::AudioSamples,
    time::{beat_duration, seconds_to_samples},
};

const NEUTRAL: f32 = 0.5;
const MIN_DENOMINATOR: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub seamlessness: f32,
    pub energy_consistency: f32,
    pub spectral_match: f32,
    pub rhythmic_fit: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            seamlessness: 0.4,
            energy_consistency: 0.25,
            spectral_match: 0.2,
            rhythmic_fit: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTuning {
    pub seam_window_max: usize,
    pub seam_window_divisor: usize,
    pub seam_correlation_weight: f32,
    pub energy_windows: usize,
    pub spectral_min_quarter: usize,
    pub spectral_zcr_weight: f32,
    pub duration_tolerance_beats: f64,
    pub alignment_tolerance_beats: f64,
    pub rhythm_fit_weight: f32,
    pub subdivisions: Vec<f64>,
    pub weights: ScoreWeights,
}

impl Default for ScoreTuning {
    fn default() -> Self {
        Self {
            seam_window_max: 1_000,
            seam_window_divisor: 8,
            seam_correlation_weight: 0.7,
            energy_windows: 10,
            spectral_min_quarter: 256,
            spectral_zcr_weight: 0.6,
            duration_tolerance_beats: 0.1,
            alignment_tolerance_beats: 0.05,
            rhythm_fit_weight: 0.7,
            subdivisions: vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0],
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub quality_score: f32,
    pub seamlessness: f32,
    pub energy_consistency: f32,
    pub spectral_match: f32,
    pub rhythmic_fit: f32,
}

#[derive(Debug, Clone, Default)]
pub struct LoopScorer {
    tuning: ScoreTuning,
}

impl LoopScorer {
    #[must_use]
    pub fn new(tuning: ScoreTuning) -> Self {
        Self { tuning }
    }

    #[must_use]
    pub fn tuning(&self) -> &ScoreTuning {
        &self.tuning
    }

    #[must_use]
    pub fn score(
        &self,
        samples: &AudioSamples,
        tempo: &TempoEstimate,
        start_time: f64,
        duration: f64,
    ) -> ScoreBreakdown {
        let mono = samples.mono_mix();
        self.score_mono(&mono, samples.sample_rate(), tempo, start_time, duration)
    }

    #[must_use]
    pub fn score_mono(
        &self,
        mono: &[f32],
        sample_rate: u32,
        tempo: &TempoEstimate,
        start_time: f64,
        duration: f64,
    ) -> ScoreBreakdown {
        let start = seconds_to_samples(start_time, sample_rate).min(mono.len());
        let end = start
            .saturating_add(seconds_to_samples(duration, sample_rate))
            .min(mono.len());
        let region = &mono[start..end];

        let seamlessness = self.seamlessness(region);
        let energy_consistency = self.energy_consistency(region);
        let spectral_match = self.spectral_match(region);
        let rhythmic_fit = self.rhythmic_fit(tempo, start_time, duration);

        let weights = &self.tuning.weights;
        let quality_score = (weights.seamlessness * seamlessness
            + weights.energy_consistency * energy_consistency
            + weights.spectral_match * spectral_match
            + weights.rhythmic_fit * rhythmic_fit)
            .clamp(0.0, 1.0);

        ScoreBreakdown {
            quality_score,
            seamlessness,
            energy_consistency,
            spectral_match,
            rhythmic_fit,
        }
    }

    fn seamlessness(&self, region: &[f32]) -> f32 {
        let window = self
            .tuning
            .seam_window_max
            .min(region.len() / self.tuning.seam_window_divisor.max(1));
        if window == 0 || region.len() < window * 2 {
            return 0.0;
        }

        let head = &region[..window];
        let tail = &region[region.len() - window..];
        let correlation = normalized_cross_correlation(head, tail);
        let head_rms = rms(head);
        let tail_rms = rms(tail);
        let amplitude_similarity = similarity(head_rms, tail_rms);

        let weight = self.tuning.seam_correlation_weight;
        sanitize(weight * correlation + (1.0 - weight) * amplitude_similarity)
    }

    fn energy_consistency(&self, region: &[f32]) -> f32 {
        let windows = self.tuning.energy_windows;
        let window_len = region.len() / windows.max(1);
        if windows < 2 || window_len == 0 {
            return NEUTRAL;
        }

        let energies: Vec<f32> = region
            .chunks_exact(window_len)
            .take(windows)
            .map(rms)
            .collect();
        let mean = energies.iter().sum::<f32>() / energies.len() as f32;
        if mean <= f32::EPSILON {
            return NEUTRAL;
        }

        let variance = energies
            .iter()
            .map(|energy| (energy - mean).powi(2))
            .sum::<f32>()
            / energies.len() as f32;
        let coefficient_of_variation = variance.sqrt() / mean;
        sanitize(1.0 - coefficient_of_variation)
    }

    fn spectral_match(&self, region: &[f32]) -> f32 {
        let quarter = region.len() / 4;
        if quarter < self.tuning.spectral_min_quarter.max(2) {
            return NEUTRAL;
        }

        let first = &region[..quarter];
        let last = &region[region.len() - quarter..];
        let zcr = similarity(zero_crossing_rate(first), zero_crossing_rate(last));
        let hf = similarity(high_frequency_content(first), high_frequency_content(last));

        let weight = self.tuning.spectral_zcr_weight;
        sanitize(weight * zcr + (1.0 - weight) * hf)
    }

    fn rhythmic_fit(&self, tempo: &TempoEstimate, start_time: f64, duration: f64) -> f32 {
        let Some(bpm) = tempo.bpm else {
            return NEUTRAL;
        };
        let beat = beat_duration(bpm);
        if beat <= 0.0 {
            return NEUTRAL;
        }

        let duration_error = self
            .tuning
            .subdivisions
            .iter()
            .map(|beats| (duration - beats * beat).abs())
            .min_by(f64::total_cmp)
            .unwrap_or(f64::INFINITY);
        let fit = tolerance_falloff(
            duration_error,
            self.tuning.duration_tolerance_beats * beat,
            beat,
        );

        let alignment = tempo
            .nearest_beat_distance(start_time)
            .map_or(NEUTRAL, |distance| {
                tolerance_falloff(distance, self.tuning.alignment_tolerance_beats * beat, beat)
            });

        let weight = self.tuning.rhythm_fit_weight;
        sanitize(weight * fit + (1.0 - weight) * alignment)
    }
}

fn tolerance_falloff(error: f64, tolerance: f64, span: f64) -> f32 {
    if !error.is_finite() {
        return 0.0;
    }
    if error <= tolerance {
        return 1.0;
    }

    (1.0 - (error - tolerance) / span).clamp(0.0, 1.0) as f32
}

fn sanitize(score: f32) -> f32 {
    if score.is_nan() {
        return 0.0;
    }

    score.clamp(0.0, 1.0)
}

fn similarity(left: f32, right: f32) -> f32 {
    1.0 - (left - right).abs() / left.max(right).max(MIN_DENOMINATOR)
}

pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn normalized_cross_correlation(left: &[f32], right: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut left_energy = 0.0_f64;
    let mut right_energy = 0.0_f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_energy += a * a;
        right_energy += b * b;
    }

    let denominator = (left_energy * right_energy).sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }

    (dot / denominator) as f32
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

fn high_frequency_content(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let total: f32 = samples
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .sum();
    total / (samples.len() - 1) as f32
}
