use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    beat::TempoEstimate,
    samples::AudioSamples,
    scoring::{LoopScorer, ScoreBreakdown},
};

pub const DEFAULT_SCAN_STEP_SECONDS: f64 = 0.05;
pub const DEFAULT_QUALITY_FLOOR: f32 = 0.3;
pub const DEFAULT_MAX_CANDIDATES: usize = 10;
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderTuning {
    pub scan_step_seconds: f64,
    pub quality_floor: f32,
    pub max_candidates: usize,
    pub default_tolerance_seconds: f64,
    pub progress_interval: usize,
}

impl Default for FinderTuning {
    fn default() -> Self {
        Self {
            scan_step_seconds: DEFAULT_SCAN_STEP_SECONDS,
            quality_floor: DEFAULT_QUALITY_FLOOR,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            default_tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            progress_interval: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Excellent,
    Good,
    Fair,
    Marginal,
    Poor,
}

impl QualityBand {
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        match score {
            s if s >= 0.9 => Self::Excellent,
            s if s >= 0.75 => Self::Good,
            s if s >= 0.6 => Self::Fair,
            s if s >= 0.4 => Self::Marginal,
            _ => Self::Poor,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Marginal => "Marginal",
            Self::Poor => "Poor",
        }
    }
}

impl fmt::Display for QualityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCandidate {
    pub start_time: f64,
    pub duration: f64,
    pub quality_score: f32,
    pub seamlessness: f32,
    pub energy_consistency: f32,
    pub spectral_match: f32,
    pub rhythmic_fit: f32,
    pub rank: usize,
    pub band: QualityBand,
}

impl LoopCandidate {
    fn from_breakdown(start_time: f64, duration: f64, breakdown: ScoreBreakdown) -> Self {
        Self {
            start_time,
            duration,
            quality_score: breakdown.quality_score,
            seamlessness: breakdown.seamlessness,
            energy_consistency: breakdown.energy_consistency,
            spectral_match: breakdown.spectral_match,
            rhythmic_fit: breakdown.rhythmic_fit,
            rank: 0,
            band: QualityBand::from_score(breakdown.quality_score),
        }
    }

    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanProgress {
    pub evaluated: usize,
    pub total: usize,
}

impl ScanProgress {
    #[must_use]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }

        self.evaluated as f32 / self.total as f32
    }
}

#[must_use]
pub fn scan_starts(
    recording_duration: f64,
    target_duration: f64,
    margin: f64,
    step: f64,
) -> Vec<f64> {
    let last_start = recording_duration - target_duration - margin;
    if last_start <= 0.0 || step <= 0.0 || !last_start.is_finite() {
        return Vec::new();
    }

    // Index arithmetic instead of accumulation keeps 7.9 / 0.05 on 158, not 157.
    let steps = (last_start / step + 1e-9).floor() as usize;
    (0..=steps).map(|index| index as f64 * step).collect()
}

#[derive(Debug, Clone, Default)]
pub struct LoopFinder {
    scorer: LoopScorer,
    tuning: FinderTuning,
}

impl LoopFinder {
    #[must_use]
    pub fn new(scorer: LoopScorer, tuning: FinderTuning) -> Self {
        Self { scorer, tuning }
    }

    #[must_use]
    pub fn tuning(&self) -> &FinderTuning {
        &self.tuning
    }

    #[must_use]
    pub fn scorer(&self) -> &LoopScorer {
        &self.scorer
    }

    pub fn find_perfect_loops(
        &self,
        samples: &AudioSamples,
        tempo: &TempoEstimate,
        target_duration: f64,
        tolerance: f64,
    ) -> Vec<LoopCandidate> {
        self.find_perfect_loops_with_progress(samples, tempo, target_duration, tolerance, |_| {})
    }

    #[instrument(
        skip(self, samples, tempo, on_progress),
        fields(frames = samples.frames(), bpm = ?tempo.bpm)
    )]
    pub fn find_perfect_loops_with_progress<F>(
        &self,
        samples: &AudioSamples,
        tempo: &TempoEstimate,
        target_duration: f64,
        tolerance: f64,
        mut on_progress: F,
    ) -> Vec<LoopCandidate>
    where
        F: FnMut(ScanProgress),
    {
        let starts = scan_starts(
            samples.duration_seconds(),
            target_duration,
            tolerance,
            self.tuning.scan_step_seconds,
        );
        if starts.is_empty() {
            debug!("recording too short for requested loop duration");
            return Vec::new();
        }

        let mono = samples.mono_mix();
        let total = starts.len();
        let interval = self.tuning.progress_interval.max(1);
        let mut candidates = Vec::new();

        for (index, start_time) in starts.into_iter().enumerate() {
            let breakdown = self.scorer.score_mono(
                &mono,
                samples.sample_rate(),
                tempo,
                start_time,
                target_duration,
            );
            if breakdown.quality_score > self.tuning.quality_floor {
                candidates.push(LoopCandidate::from_breakdown(
                    start_time,
                    target_duration,
                    breakdown,
                ));
            }

            let evaluated = index + 1;
            if evaluated % interval == 0 || evaluated == total {
                on_progress(ScanProgress { evaluated, total });
            }
        }

        let survivors = candidates.len();
        let ranked = rank_candidates(candidates, self.tuning.max_candidates);
        debug!(
            evaluated = total,
            survivors,
            returned = ranked.len(),
            best = ?ranked.first().map(|candidate| candidate.quality_score),
            "loop scan completed"
        );
        ranked
    }
}

fn rank_candidates(mut candidates: Vec<LoopCandidate>, limit: usize) -> Vec<LoopCandidate> {
    candidates.sort_by(|left, right| right.quality_score.total_cmp(&left.quality_score));
    candidates.truncate(limit);
    for (position, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = position + 1;
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(start_time: f64, quality_score: f32) -> LoopCandidate {
        LoopCandidate::from_breakdown(
            start_time,
            1.0,
            ScoreBreakdown {
                quality_score,
                seamlessness: quality_score,
                energy_consistency: quality_score,
                spectral_match: quality_score,
                rhythmic_fit: quality_score,
            },
        )
    }

    #[test]
    fn ten_second_recording_yields_159_starts_for_two_second_loops() {
        let starts = scan_starts(10.0, 2.0, 0.1, 0.05);
        assert_eq!(starts.len(), 159);
        assert!(starts[0].abs() < f64::EPSILON);
        assert!((starts[158] - 7.9).abs() < 1e-9);
    }

    #[test]
    fn non_positive_range_yields_no_starts() {
        assert!(scan_starts(2.0, 2.0, 0.1, 0.05).is_empty());
        assert!(scan_starts(1.5, 2.0, 0.1, 0.05).is_empty());
    }

    #[test]
    fn ranking_breaks_ties_by_scan_order() {
        let ranked = rank_candidates(
            vec![candidate(0.0, 0.5), candidate(0.05, 0.8), candidate(0.1, 0.8)],
            10,
        );
        let starts: Vec<f64> = ranked.iter().map(|candidate| candidate.start_time).collect();
        assert_eq!(starts, vec![0.05, 0.1, 0.0]);
        let ranks: Vec<usize> = ranked.iter().map(|candidate| candidate.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn bands_follow_score_thresholds() {
        assert_eq!(QualityBand::from_score(0.95), QualityBand::Excellent);
        assert_eq!(QualityBand::from_score(0.9), QualityBand::Excellent);
        assert_eq!(QualityBand::from_score(0.5), QualityBand::Marginal);
        assert_eq!(QualityBand::from_score(0.39), QualityBand::Poor);
        assert_eq!(QualityBand::Good.to_string(), "Good");
    }
}
