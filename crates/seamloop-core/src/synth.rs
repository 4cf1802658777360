use std::{f64::consts::E, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    samples::AudioSamples,
    time::{millis_to_samples_floor, seconds_to_samples},
};

pub const DEFAULT_CROSSFADE_CEILING_RATIO: f64 = 0.25;
pub const DEFAULT_DECLICK_CUTOFF_HZ: f64 = 8_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeCurve {
    Linear,
    #[default]
    Cosine,
    Logarithmic,
    Exponential,
}

impl CrossfadeCurve {
    pub const ALL: [Self; 4] = [
        Self::Linear,
        Self::Cosine,
        Self::Logarithmic,
        Self::Exponential,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Cosine => "cosine",
            Self::Logarithmic => "logarithmic",
            Self::Exponential => "exponential",
        }
    }

    // Logarithmic tops out at 1/e, not 1.
    #[must_use]
    pub fn ratio(self, t: f64) -> f64 {
        match self {
            Self::Linear => t,
            Self::Cosine => 0.5 * (1.0 - (std::f64::consts::PI * t).cos()),
            Self::Logarithmic => (1.0 + t * (E - 1.0)).ln() / E,
            Self::Exponential => (t.exp() - 1.0) / (E - 1.0),
        }
    }
}

impl fmt::Display for CrossfadeCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CrossfadeCurve {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|curve| curve.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown crossfade curve: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthTuning {
    pub crossfade_ceiling_ratio: f64,
    pub declick_cutoff_hz: f64,
}

impl Default for SynthTuning {
    fn default() -> Self {
        Self {
            crossfade_ceiling_ratio: DEFAULT_CROSSFADE_CEILING_RATIO,
            declick_cutoff_hz: DEFAULT_DECLICK_CUTOFF_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
    pub crossfade_samples: usize,
    pub click_reduction_applied: bool,
}

impl LoopBuffer {
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }

        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthRequest {
    pub start_time: f64,
    pub duration: f64,
    pub crossfade_ms: f64,
    pub curve: CrossfadeCurve,
    pub click_reduction: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoopSynthesizer {
    tuning: SynthTuning,
}

impl LoopSynthesizer {
    #[must_use]
    pub fn new(tuning: SynthTuning) -> Self {
        Self { tuning }
    }

    #[must_use]
    pub fn crossfade_samples(&self, crossfade_ms: f64, sample_rate: u32, length: usize) -> usize {
        let ceiling = (length as f64 * self.tuning.crossfade_ceiling_ratio).floor() as usize;
        millis_to_samples_floor(crossfade_ms, sample_rate).min(ceiling)
    }

    #[instrument(
        skip(self, samples),
        fields(frames = samples.frames(), channels = samples.channel_count())
    )]
    pub fn synthesize(&self, samples: &AudioSamples, request: &SynthRequest) -> LoopBuffer {
        let sample_rate = samples.sample_rate();
        let start = seconds_to_samples(request.start_time, sample_rate);
        let length = seconds_to_samples(request.duration, sample_rate);
        let crossfade = self.crossfade_samples(request.crossfade_ms, sample_rate, length);
        let blend = crossfade > 0 && crossfade * 2 < length;
        let declick = blend && request.click_reduction;
        let alpha = lowpass_alpha(self.tuning.declick_cutoff_hz, sample_rate);

        let channels: Vec<Vec<f32>> = samples
            .channels()
            .map(|source| {
                let mut region = slice_padded(source, start, length);
                if declick {
                    let tail_start = length - crossfade;
                    one_pole_lowpass(&mut region[..crossfade], alpha);
                    one_pole_lowpass(&mut region[tail_start..], alpha);
                }
                if blend {
                    crossfade_in_place(&mut region, crossfade, request.curve);
                }
                region
            })
            .collect();

        debug!(
            length,
            crossfade_samples = if blend { crossfade } else { 0 },
            curve = %request.curve,
            declick,
            "loop synthesized"
        );
        LoopBuffer {
            sample_rate,
            channels,
            crossfade_samples: if blend { crossfade } else { 0 },
            click_reduction_applied: declick,
        }
    }
}

fn slice_padded(source: &[f32], start: usize, length: usize) -> Vec<f32> {
    let mut region = vec![0.0_f32; length];
    if start < source.len() {
        let available = (source.len() - start).min(length);
        region[..available].copy_from_slice(&source[start..start + available]);
    }
    region
}

fn lowpass_alpha(cutoff_hz: f64, sample_rate: u32) -> f32 {
    let nyquist = f64::from(sample_rate) / 2.0;
    if nyquist <= 0.0 {
        return 0.0;
    }

    (-2.0 * std::f64::consts::PI * (cutoff_hz / nyquist)).exp() as f32
}

fn one_pole_lowpass(segment: &mut [f32], alpha: f32) {
    let Some(&first) = segment.first() else {
        return;
    };

    let mut previous = first;
    for sample in segment {
        previous = alpha * previous + (1.0 - alpha) * *sample;
        *sample = previous;
    }
}

fn crossfade_in_place(region: &mut [f32], crossfade: usize, curve: CrossfadeCurve) {
    let tail_start = region.len() - crossfade;
    for index in 0..crossfade {
        let t = index as f64 / crossfade as f64;
        let ratio = curve.ratio(t) as f32;
        let tail = region[tail_start + index];
        region[index] = region[index] * ratio + tail * (1.0 - ratio);
        region[tail_start + index] = tail * (1.0 - ratio);
    }
}
