use std::{borrow::Cow, path::Path};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
    #[error("channel {channel} has {actual} frames, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    #[error("interleaved buffer of {len} samples is not divisible by {channels} channels")]
    RaggedInterleaved { len: usize, channels: usize },
}

// Analysis caches key on `id`, so equal content loaded twice is two recordings.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    id: Uuid,
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioSamples {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, SampleError> {
        if sample_rate == 0 {
            return Err(SampleError::ZeroSampleRate);
        }

        let expected = channels.first().map_or(0, Vec::len);
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != expected)
        {
            return Err(SampleError::ChannelLengthMismatch {
                channel,
                expected,
                actual: samples.len(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sample_rate,
            channels,
        })
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self, SampleError> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        interleaved: &[f32],
    ) -> Result<Self, SampleError> {
        if channel_count == 0 {
            return Self::new(sample_rate, Vec::new());
        }
        if interleaved.len() % channel_count != 0 {
            return Err(SampleError::RaggedInterleaved {
                len: interleaved.len(),
                channels: channel_count,
            });
        }

        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map_or(&[][..], Vec::as_slice)
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    #[must_use]
    pub fn mono_mix(&self) -> Cow<'_, [f32]> {
        match self.channels.as_slice() {
            [] => Cow::Borrowed(&[]),
            [only] => Cow::Borrowed(only.as_slice()),
            many => {
                let scale = 1.0 / many.len() as f32;
                let mut mixed = vec![0.0_f32; self.frames()];
                for channel in many {
                    for (out, sample) in mixed.iter_mut().zip(channel) {
                        *out += *sample;
                    }
                }
                for sample in &mut mixed {
                    *sample *= scale;
                }
                Cow::Owned(mixed)
            }
        }
    }
}

#[instrument(fields(path = %path.display()))]
pub fn load_wav(path: &Path) -> Result<AudioSamples> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open wav file: {}", path.display()))?;
    let spec = reader.spec();
    let channel_count = usize::from(spec.channels);

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to read float samples from {}", path.display()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| (value as f32 * scale).clamp(-1.0, 1.0)))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("failed to read pcm samples from {}", path.display()))?
        }
    };

    let samples = AudioSamples::from_interleaved(spec.sample_rate, channel_count, &interleaved)
        .with_context(|| format!("malformed wav data in {}", path.display()))?;
    debug!(
        sample_rate = samples.sample_rate(),
        channels = samples.channel_count(),
        frames = samples.frames(),
        "wav decode complete"
    );
    Ok(samples)
}

#[instrument(skip(samples), fields(path = %path.display(), frames = samples.frames()))]
pub fn write_wav(path: &Path, samples: &AudioSamples) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let channels = u16::try_from(samples.channel_count())
        .context("too many channels for a wav file")?;
    let spec = hound::WavSpec {
        channels,
        sample_rate: samples.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file: {}", path.display()))?;
    for frame in 0..samples.frames() {
        for channel in samples.channels() {
            writer
                .write_sample(channel[frame])
                .with_context(|| format!("failed to write sample to {}", path.display()))?;
        }
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize wav file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_input_is_split_per_channel() {
        let samples = AudioSamples::from_interleaved(8_000, 2, &[0.1, -0.1, 0.2, -0.2])
            .expect("interleaved buffer should be accepted");
        assert_eq!(samples.channel_count(), 2);
        assert_eq!(samples.channel(0), &[0.1, 0.2]);
        assert_eq!(samples.channel(1), &[-0.1, -0.2]);
    }

    #[test]
    fn mismatched_channels_are_rejected() {
        let error = AudioSamples::new(44_100, vec![vec![0.0; 4], vec![0.0; 3]])
            .expect_err("ragged channels must fail");
        assert_eq!(
            error,
            SampleError::ChannelLengthMismatch {
                channel: 1,
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn mono_mix_averages_channels() {
        let samples = AudioSamples::new(8_000, vec![vec![1.0, 0.0], vec![0.0, -1.0]])
            .expect("buffer should be valid");
        assert_eq!(samples.mono_mix().as_ref(), &[0.5, -0.5]);
    }

    #[test]
    fn float_wav_survives_disk_round_trip() {
        let samples = AudioSamples::new(22_050, vec![vec![0.5, -0.25, 0.0], vec![0.1, 0.2, 0.3]])
            .expect("buffer should be valid");
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("nested/take.wav");

        write_wav(&path, &samples).expect("wav write should succeed");
        let restored = load_wav(&path).expect("wav read should succeed");
        assert_eq!(restored.sample_rate(), 22_050);
        assert_eq!(restored.channel(0), samples.channel(0));
        assert_eq!(restored.channel(1), samples.channel(1));
        assert_ne!(restored.id(), samples.id());
    }

    #[test]
    fn identical_content_gets_distinct_identity() {
        let left = AudioSamples::mono(8_000, vec![0.0; 16]).expect("valid");
        let right = AudioSamples::mono(8_000, vec![0.0; 16]).expect("valid");
        assert_ne!(left.id(), right.id());
    }
}
