use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("export cancelled by user")]
    Cancelled,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sink rejected export: {0}")]
    Rejected(String),
}

impl SinkError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub trait LoopSink: Send + Sync {
    fn offer(&self, bytes: &[u8], suggested_filename: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl LoopSink for DirectorySink {
    #[instrument(
        skip(self, bytes),
        fields(directory = %self.directory.display(), bytes = bytes.len())
    )]
    fn offer(&self, bytes: &[u8], suggested_filename: &str) -> Result<(), SinkError> {
        let file_name = Path::new(suggested_filename)
            .file_name()
            .ok_or_else(|| SinkError::Rejected(format!("invalid filename: {suggested_filename}")))?;
        let path = self.directory.join(file_name);
        let io_error = |source: io::Error| SinkError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.directory).map_err(io_error)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(&self.directory).map_err(io_error)?;
        temp_file.write_all(bytes).map_err(io_error)?;
        temp_file
            .persist(&path)
            .map_err(|error| io_error(error.error))?;

        info!(path = %path.display(), "loop written");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().clone()
    }

    #[must_use]
    pub fn take_last(&self) -> Option<(String, Vec<u8>)> {
        self.delivered.lock().pop()
    }
}

impl LoopSink for MemorySink {
    fn offer(&self, bytes: &[u8], suggested_filename: &str) -> Result<(), SinkError> {
        self.delivered
            .lock()
            .push((suggested_filename.to_string(), bytes.to_vec()));
        Ok(())
    }
}
