use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{samples::AudioSamples, time::seconds_to_samples};

const PEAK_FRACTION: f64 = 0.9;
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchReading {
    pub note: String,
    pub octave: i32,
    pub frequency_hz: f64,
    pub confidence: f32,
}

impl PitchReading {
    #[must_use]
    pub fn from_frequency(frequency_hz: f64, confidence: f32) -> Self {
        let midi = (69.0 + 12.0 * (frequency_hz / 440.0).log2()).round() as i32;
        Self {
            note: NOTE_NAMES[midi.rem_euclid(12) as usize].to_string(),
            octave: midi.div_euclid(12) - 1,
            frequency_hz,
            confidence,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}", self.note, self.octave)
    }
}

pub trait PitchEstimator: Send + Sync {
    fn estimate(&self, samples: &AudioSamples, start_time: f64, duration: f64)
    -> Option<PitchReading>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPitch;

impl PitchEstimator for NoPitch {
    fn estimate(&self, _: &AudioSamples, _: f64, _: f64) -> Option<PitchReading> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AutocorrelationPitch {
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    pub max_window: usize,
}

impl Default for AutocorrelationPitch {
    fn default() -> Self {
        Self {
            min_frequency_hz: 50.0,
            max_frequency_hz: 2_000.0,
            max_window: 4_096,
        }
    }
}

impl PitchEstimator for AutocorrelationPitch {
    fn estimate(
        &self,
        samples: &AudioSamples,
        start_time: f64,
        duration: f64,
    ) -> Option<PitchReading> {
        let sample_rate = samples.sample_rate();
        let mono = samples.mono_mix();
        let start = seconds_to_samples(start_time, sample_rate).min(mono.len());
        let end = start
            .saturating_add(seconds_to_samples(duration, sample_rate))
            .min(mono.len());
        let region = &mono[start..end];

        let min_lag = (f64::from(sample_rate) / self.max_frequency_hz).floor().max(1.0) as usize;
        let max_lag = (f64::from(sample_rate) / self.min_frequency_hz).ceil() as usize;
        if min_lag > max_lag {
            trace!(min_lag, max_lag, "empty lag range");
            return None;
        }
        let window = region.len().min(self.max_window);
        if window < max_lag.saturating_mul(2) {
            trace!(window, max_lag, "region too short for pitch estimate");
            return None;
        }
        let frame = &region[..window];

        // Skip the lobe around lag zero, then take the first peak that comes
        // close to the strongest one so octave multiples do not win.
        let mut correlations = Vec::with_capacity(max_lag - min_lag + 1);
        let mut previous = f64::INFINITY;
        let mut descending = true;
        for lag in min_lag..=max_lag {
            let correlation = lagged_correlation(frame, lag);
            if descending {
                descending = correlation < previous;
                previous = correlation;
                if descending {
                    continue;
                }
            }
            correlations.push((lag, correlation));
        }

        let strongest = correlations
            .iter()
            .map(|(_, correlation)| *correlation)
            .fold(0.0_f64, f64::max);
        if strongest <= 0.0 {
            return None;
        }

        let (best_lag, best_correlation) = correlations
            .iter()
            .zip(correlations.iter().skip(1).map(Some).chain([None]))
            .find(|&(&(_, correlation), next)| {
                correlation >= strongest * PEAK_FRACTION
                    && next.is_none_or(|&(_, following)| correlation >= following)
            })
            .map(|(peak, _)| *peak)?;

        let frequency_hz = f64::from(sample_rate) / best_lag as f64;
        let reading = PitchReading::from_frequency(frequency_hz, best_correlation as f32);
        trace!(frequency_hz, confidence = reading.confidence, "pitch estimated");
        Some(reading)
    }
}

fn lagged_correlation(frame: &[f32], lag: usize) -> f64 {
    let mut dot = 0.0_f64;
    let mut head_energy = 0.0_f64;
    let mut tail_energy = 0.0_f64;
    for (a, b) in frame.iter().zip(&frame[lag..]) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        head_energy += a * a;
        tail_energy += b * b;
    }

    let denominator = (head_energy * tail_energy).sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }

    dot / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concert_a_maps_to_a4() {
        let reading = PitchReading::from_frequency(440.0, 0.9);
        assert_eq!(reading.label(), "A4");
        assert_eq!(PitchReading::from_frequency(261.63, 0.9).label(), "C4");
    }

    #[test]
    fn sine_tone_is_detected_near_its_frequency() {
        let sample_rate = 44_100_u32;
        let tone: Vec<f32> = (0..sample_rate as usize / 2)
            .map(|index| {
                let phase = index as f32 / sample_rate as f32 * 220.0 * std::f32::consts::TAU;
                phase.sin() * 0.5
            })
            .collect();
        let samples = AudioSamples::mono(sample_rate, tone).expect("tone should be valid");
        let reading = AutocorrelationPitch::default()
            .estimate(&samples, 0.0, 0.5)
            .expect("sine tone should have a pitch");
        assert!((reading.frequency_hz - 220.0).abs() < 3.0, "{reading:?}");
        assert_eq!(reading.label(), "A3");
        assert!(reading.confidence > 0.9);
    }

    #[test]
    fn silence_has_no_pitch() {
        let samples = AudioSamples::mono(44_100, vec![0.0; 22_050]).expect("valid");
        assert!(AutocorrelationPitch::default().estimate(&samples, 0.0, 0.5).is_none());
    }

    #[test]
    fn inverted_frequency_bounds_give_no_pitch() {
        let tone: Vec<f32> = (0..44_100)
            .map(|index| (std::f32::consts::TAU * 441.0 * index as f32 / 44_100.0).sin())
            .collect();
        let samples = AudioSamples::mono(44_100, tone).expect("valid");
        let estimator = AutocorrelationPitch {
            min_frequency_hz: 2_000.0,
            max_frequency_hz: 50.0,
            ..AutocorrelationPitch::default()
        };
        assert!(estimator.estimate(&samples, 0.0, 1.0).is_none());
    }
}
