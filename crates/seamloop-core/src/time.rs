pub const BEATS_PER_BAR: f64 = 4.0;

#[must_use]
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }

    (seconds * f64::from(sample_rate)).round() as usize
}

#[must_use]
pub fn samples_to_seconds(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    samples as f64 / f64::from(sample_rate)
}

#[must_use]
pub fn millis_to_samples_floor(millis: f64, sample_rate: u32) -> usize {
    if millis <= 0.0 || !millis.is_finite() {
        return 0;
    }

    (millis * f64::from(sample_rate) / 1000.0).floor() as usize
}

#[must_use]
pub fn beat_duration(bpm: u32) -> f64 {
    if bpm == 0 {
        return 0.0;
    }

    60.0 / f64::from(bpm)
}

#[must_use]
pub fn seconds_to_beats(seconds: f64, bpm: u32) -> f64 {
    let beat = beat_duration(bpm);
    if beat <= 0.0 {
        return 0.0;
    }

    seconds / beat
}

#[must_use]
pub fn beats_to_bars(beats: f64) -> f64 {
    beats / BEATS_PER_BAR
}
