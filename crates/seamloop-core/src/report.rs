use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::{beat::TempoEstimate, finder::LoopCandidate, samples::AudioSamples};

const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    pub schema_version: u32,
    pub recording_id: String,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_seconds: f64,
    pub bpm: Option<u32>,
    pub beat_count: usize,
    pub strong_beat_count: usize,
    pub target_duration: f64,
    pub tolerance: f64,
    pub candidates: Vec<LoopCandidate>,
}

#[must_use]
pub fn build_loop_report(
    samples: &AudioSamples,
    tempo: &TempoEstimate,
    target_duration: f64,
    tolerance: f64,
    candidates: Vec<LoopCandidate>,
) -> LoopReport {
    LoopReport {
        schema_version: REPORT_SCHEMA_VERSION,
        recording_id: samples.id().to_string(),
        sample_rate: samples.sample_rate(),
        channels: samples.channel_count(),
        duration_seconds: samples.duration_seconds(),
        bpm: tempo.bpm,
        beat_count: tempo.beats.len(),
        strong_beat_count: tempo.strong_beat_count(),
        target_duration,
        tolerance,
        candidates,
    }
}

pub fn read_loop_report(path: &Path) -> Result<LoopReport> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read loop report: {}", path.display()))?;
    let report: LoopReport =
        serde_json::from_slice(&bytes).context("failed to parse loop report json")?;
    Ok(report)
}

#[instrument(skip(report), fields(path = %path.display(), candidates = report.candidates.len()))]
pub fn write_loop_report(path: &Path, report: &LoopReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(report).context("failed to encode loop report json")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write loop report: {}", path.display()))?;
    Ok(())
}

#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
