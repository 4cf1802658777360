use std::{fs, path::Path};

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::DiagnosticsConfig;

pub const DEFAULT_LOG_FILTER: &str = "info,seamloop_core=debug";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "seamloop";

pub struct TelemetryGuard {
    pub session_id: Uuid,
    pub log_file: String,
    _file_guard: WorkerGuard,
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("session_id", &self.session_id)
            .field("log_file", &self.log_file)
            .finish_non_exhaustive()
    }
}

pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(log_dir, DEFAULT_LOG_FILE_PREFIX, DEFAULT_LOG_FILTER)
}

pub fn init_tracing_from_config(
    config: &DiagnosticsConfig,
    log_dir: Option<&Path>,
) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(
        log_dir.unwrap_or(config.log_dir.as_path()),
        &config.trace_file_prefix,
        &config.rust_log_filter,
    )
}

pub fn init_tracing_with_options(
    log_dir: impl AsRef<Path>,
    file_prefix: &str,
    default_filter: &str,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let session_id = Uuid::new_v4();
    let log_file = format!(
        "{file_prefix}-{}.log",
        Utc::now().format("%Y%m%d-%H%M%S")
    );
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, &log_file));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let json_file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_writer(file_writer);

    match tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(json_file)
        .try_init()
    {
        Ok(()) => info!(%session_id, log_file = %log_file, "logging ready"),
        Err(error) => warn!(?error, "tracing subscriber was already installed"),
    }

    Ok(TelemetryGuard {
        session_id,
        log_file,
        _file_guard: file_guard,
    })
}
