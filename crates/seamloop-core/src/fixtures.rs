use std::f32::consts::TAU;

use crate::samples::{AudioSamples, SampleError};

pub const FIXTURE_SAMPLE_RATE: u32 = 22_050;
pub const CLICK_FREQUENCY_HZ: f32 = 1_000.0;
pub const CLICK_SECONDS: f64 = 0.030;

const CLICK_AMPLITUDE: f32 = 0.5;
const ACCENT_AMPLITUDE: f32 = 0.9;

fn frame_count(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * f64::from(sample_rate)).round() as usize
}

fn click_samples(bpm: u32, seconds: f64, sample_rate: u32, accent_every: usize) -> Vec<f32> {
    let total = frame_count(seconds, sample_rate);
    let mut samples = vec![0.0_f32; total];
    if bpm == 0 || sample_rate == 0 {
        return samples;
    }

    let beat_seconds = 60.0 / f64::from(bpm);
    let burst = frame_count(CLICK_SECONDS, sample_rate);
    let rate = sample_rate as f32;
    let mut beat = 0_usize;
    loop {
        let onset = frame_count(beat as f64 * beat_seconds, sample_rate);
        if onset >= total {
            break;
        }

        let amplitude = if accent_every > 0 && beat % accent_every == 0 {
            ACCENT_AMPLITUDE
        } else {
            CLICK_AMPLITUDE
        };
        let end = (onset + burst).min(total);
        for (offset, sample) in samples[onset..end].iter_mut().enumerate() {
            *sample = amplitude * (TAU * CLICK_FREQUENCY_HZ * offset as f32 / rate).sin();
        }
        beat += 1;
    }
    samples
}

fn sine_samples(frequency_hz: f32, seconds: f64, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let rate = sample_rate.max(1) as f32;
    (0..frame_count(seconds, sample_rate))
        .map(|index| amplitude * (TAU * frequency_hz * index as f32 / rate).sin())
        .collect()
}

pub fn click_track(
    bpm: u32,
    seconds: f64,
    sample_rate: u32,
    accent_every: usize,
) -> Result<AudioSamples, SampleError> {
    AudioSamples::mono(
        sample_rate,
        click_samples(bpm, seconds, sample_rate, accent_every),
    )
}

pub fn sine_tone(
    frequency_hz: f32,
    seconds: f64,
    sample_rate: u32,
    amplitude: f32,
) -> Result<AudioSamples, SampleError> {
    AudioSamples::mono(
        sample_rate,
        sine_samples(frequency_hz, seconds, sample_rate, amplitude),
    )
}

pub fn looping_pad(bpm: u32, seconds: f64, sample_rate: u32) -> Result<AudioSamples, SampleError> {
    let clicks = click_samples(bpm, seconds, sample_rate, 4);
    let left = sine_samples(220.0, seconds, sample_rate, 0.2);
    let right = sine_samples(329.63, seconds, sample_rate, 0.2);

    let mix = |pad: Vec<f32>| -> Vec<f32> {
        pad.into_iter()
            .zip(&clicks)
            .map(|(tone, click)| tone + click)
            .collect()
    };
    AudioSamples::new(sample_rate, vec![mix(left), mix(right)])
}

pub fn demo_recording() -> Result<AudioSamples, SampleError> {
    looping_pad(120, 8.0, FIXTURE_SAMPLE_RATE)
}
