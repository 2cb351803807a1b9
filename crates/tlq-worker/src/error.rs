//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job file {path}: {message}")]
    InvalidJobFile { path: PathBuf, message: String },

    #[error("Output file {0} already exists")]
    OutputExists(PathBuf),

    #[error("Failed to move {from} to {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] tlq_models::ConfigError),

    #[error("Media error: {0}")]
    Media(#[from] tlq_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] tlq_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_job_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidJobFile {
            path: path.into(),
            message: message.into(),
        }
    }
}
