//! Per-job log file.
//!
//! Lifecycle events go to both `tracing` (with the job id attached) and the
//! job's own plain-text log next to its output. Encoder chatter goes to the
//! file only.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tlq_models::JobId;
use tracing::{debug, error, info, warn, Span};

use crate::error::MediaResult;

/// Job logger writing to tracing and, optionally, a log file.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
    file: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl JobLogger {
    /// A logger that only emits tracing events.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
            file: None,
            path: None,
        }
    }

    /// Also append to the file at `path`, creating it if needed.
    pub fn with_file(job_id: &JobId, operation: &str, path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
            path: Some(path),
            ..Self::new(job_id, operation)
        })
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
        self.write_line("INFO", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
        self.write_line("INFO", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
        self.write_line("WARN", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
        self.write_line("ERROR", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
        self.write_line("INFO", message);
    }

    /// Subprocess output: file only, debug-level tracing.
    pub fn log_output(&self, line: &str) {
        debug!(job_id = %self.job_id, "{}", line);
        self.write_line("INFO", line);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Path of the log file, if one is attached.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }

    fn write_line(&self, level: &str, message: &str) {
        let Some(file) = &self.file else {
            return;
        };
        let Ok(mut file) = file.lock() else {
            return;
        };
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        if let Err(e) = writeln!(file, "{} {:<5} {}", ts, level, message) {
            warn!(job_id = %self.job_id, error = %e, "Failed to write job log");
        }
    }
}
