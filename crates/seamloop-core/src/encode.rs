use rand::Rng;
use tracing::{debug, instrument};

use crate::synth::LoopBuffer;

pub const WAV_HEADER_LEN: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const PCM_FORMAT_TAG: u16 = 1;
const FULL_SCALE: f64 = 32_767.0;

#[must_use]
pub fn encode_pcm16(buffer: &LoopBuffer) -> Vec<u8> {
    encode_pcm16_with_rng(buffer, &mut rand::thread_rng())
}

#[instrument(
    skip(buffer, rng),
    fields(frames = buffer.frames(), channels = buffer.channel_count())
)]
pub fn encode_pcm16_with_rng<R: Rng + ?Sized>(buffer: &LoopBuffer, rng: &mut R) -> Vec<u8> {
    let frames = buffer.frames();
    let channel_count = buffer.channel_count();
    if frames == 0 || channel_count == 0 {
        debug!("nothing to encode");
        return Vec::new();
    }
    if buffer.channels.iter().any(|channel| channel.len() != frames) {
        debug!("channel lengths differ, nothing to encode");
        return Vec::new();
    }

    let channels = u16::try_from(channel_count).unwrap_or(u16::MAX);
    let block_align = channels.saturating_mul(BYTES_PER_SAMPLE);
    let data_len = frames.saturating_mul(usize::from(block_align));
    let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + data_len);

    write_header(&mut bytes, channels, buffer.sample_rate, frames);
    for frame in 0..frames {
        for channel in buffer.channels.iter().take(usize::from(channels)) {
            let dither = rng.gen_range(0.0_f64..1.0) - 0.5;
            let quantized = quantize(channel[frame], dither);
            bytes.extend_from_slice(&quantized.to_le_bytes());
        }
    }

    debug!(bytes = bytes.len(), "pcm encode complete");
    bytes
}

fn write_header(bytes: &mut Vec<u8>, channels: u16, sample_rate: u32, frames: usize) {
    let block_align = channels.saturating_mul(BYTES_PER_SAMPLE);
    let byte_rate = sample_rate.saturating_mul(u32::from(block_align));
    let data_size = u32::try_from(frames)
        .unwrap_or(u32::MAX)
        .saturating_mul(u32::from(block_align));
    let chunk_size = data_size.saturating_add(36);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&chunk_size.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
}

#[must_use]
pub fn quantize_pcm16(sample: f32) -> i16 {
    quantize(sample, 0.0)
}

#[must_use]
pub fn pcm16_to_f32(value: i16) -> f32 {
    (f64::from(value) / FULL_SCALE) as f32
}

// `dither` is in LSBs, within [-0.5, 0.5). Non-finite input encodes as silence.
fn quantize(sample: f32, dither: f64) -> i16 {
    let clean = if sample.is_finite() {
        f64::from(sample).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let scaled = (clean * FULL_SCALE + dither).round();
    scaled.clamp(-FULL_SCALE, FULL_SCALE) as i16
}
