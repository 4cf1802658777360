use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    beat::{BeatTracker, BeatTuning},
    diagnostics::{DEFAULT_LOG_FILE_PREFIX, DEFAULT_LOG_FILTER},
    export::{ExportCoordinator, ExportRequest, NamingSettings},
    finder::{FinderTuning, LoopFinder},
    pitch::{AutocorrelationPitch, NoPitch, PitchEstimator},
    scoring::{LoopScorer, ScoreTuning},
    synth::{CrossfadeCurve, LoopSynthesizer, SynthTuning},
};

pub const CONFIG_FILE_NAME: &str = "seamloop.config.toml";
pub const CONFIG_PATH_ENV: &str = "SEAMLOOP_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub beat: BeatTuning,
    pub scoring: ScoreTuning,
    pub finder: FinderTuning,
    pub synth: SynthTuning,
    pub export: ExportConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub default_crossfade_ms: f64,
    pub default_curve: CrossfadeCurve,
    pub click_reduction: bool,
    pub pitch_detection: bool,
    pub output_dir: PathBuf,
    pub filename_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub log_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_crossfade_ms: 20.0,
            default_curve: CrossfadeCurve::Cosine,
            click_reduction: false,
            pitch_detection: true,
            output_dir: PathBuf::from("data/loops"),
            filename_prefix: NamingSettings::default().filename_prefix,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        match discover_config_path()? {
            Some(path) => Self::from_path(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    #[must_use]
    pub fn loop_finder(&self) -> LoopFinder {
        LoopFinder::new(LoopScorer::new(self.scoring.clone()), self.finder.clone())
    }

    #[must_use]
    pub fn coordinator(&self) -> ExportCoordinator {
        let pitch: Box<dyn PitchEstimator> = if self.export.pitch_detection {
            Box::new(AutocorrelationPitch::default())
        } else {
            Box::new(NoPitch)
        };

        ExportCoordinator::new(
            BeatTracker::new(self.beat.clone()),
            self.loop_finder(),
            LoopSynthesizer::new(self.synth.clone()),
            pitch,
            NamingSettings {
                filename_prefix: self.export.filename_prefix.clone(),
            },
        )
    }

    #[must_use]
    pub fn export_request(&self, start_time: f64, duration: f64) -> ExportRequest {
        ExportRequest {
            start_time,
            duration,
            crossfade_ms: self.export.default_crossfade_ms,
            crossfade_curve: self.export.default_curve,
            click_reduction_enabled: self.export.click_reduction,
        }
    }
}

fn discover_config_path() -> Result<Option<PathBuf>> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];
    Ok(candidates.into_iter().find(|path| path.is_file()))
}
