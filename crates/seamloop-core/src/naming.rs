use chrono::{DateTime, Utc};

use crate::{
    pitch::PitchReading,
    synth::CrossfadeCurve,
    time::{beats_to_bars, seconds_to_beats},
};

pub const MIN_PITCH_CONFIDENCE: f32 = 0.3;
const WHOLE_TOLERANCE: f64 = 0.1;
const UNKNOWN: &str = "unk";

#[derive(Debug, Clone, PartialEq)]
pub struct LoopNameParts<'a> {
    pub prefix: &'a str,
    pub pitch: Option<&'a PitchReading>,
    pub bpm: Option<u32>,
    pub duration: f64,
    pub curve: CrossfadeCurve,
    pub click_reduction: bool,
    pub timestamp: DateTime<Utc>,
}

#[must_use]
pub fn loop_filename(parts: &LoopNameParts<'_>) -> String {
    let pitch_label = parts
        .pitch
        .filter(|reading| reading.confidence > MIN_PITCH_CONFIDENCE)
        .map_or_else(|| UNKNOWN.to_string(), PitchReading::label);
    let bpm_label = parts
        .bpm
        .map_or_else(|| UNKNOWN.to_string(), |bpm| bpm.to_string());
    let length_label = parts
        .bpm
        .map_or_else(|| "free".to_string(), |bpm| loop_length_label(parts.duration, bpm));
    let crossfade_tag: String = parts.curve.name().chars().take(3).collect();
    let click_tag = if parts.click_reduction { "_CR" } else { "" };
    let frequency_tag = parts
        .pitch
        .filter(|reading| reading.frequency_hz.is_finite() && reading.frequency_hz > 0.0)
        .map(|reading| format!("_{}hz", reading.frequency_hz.round() as u64))
        .unwrap_or_default();

    format!(
        "{prefix}_{pitch_label}_{bpm_label}bpm_{length_label}_{duration:.2}s_{crossfade_tag}{click_tag}{frequency_tag}_{timestamp}.wav",
        prefix = sanitize_prefix(parts.prefix),
        duration = parts.duration,
        timestamp = parts.timestamp.format("%Y%m%d-%H%M%S"),
    )
}

#[must_use]
pub fn loop_length_label(duration: f64, bpm: u32) -> String {
    let beats = seconds_to_beats(duration, bpm);
    let bars = beats_to_bars(beats);

    if let Some(bars) = whole(bars).filter(|bars| *bars > 0) {
        let unit = if bars == 1 { "bar" } else { "bars" };
        return format!("{bars}{unit}");
    }
    if let Some(beats) = whole(beats).filter(|beats| *beats > 0) {
        let unit = if beats == 1 { "beat" } else { "beats" };
        return format!("{beats}{unit}");
    }
    format!("{beats:.1}beats")
}

fn whole(value: f64) -> Option<u64> {
    let rounded = value.round();
    ((value - rounded).abs() <= WHOLE_TOLERANCE && rounded >= 0.0).then_some(rounded as u64)
}

fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .trim()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '-' {
                character
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "loop".to_string()
    } else {
        cleaned
    }
}
