//! Job files: JSON documents naming the first image of a sequence and the
//! conversion settings for it.
//!
//! ```json
//! {
//!   "first_image": "DSC_0001.jpg",
//!   "config": { "output_name": "sunset", "region": {...}, ... }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tlq_media::{discover_sequence, size_after_rotate, FrameDecoder};
use tlq_models::{ImageSequence, JobConfig};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    /// Relative paths are resolved against the job file's directory
    pub first_image: PathBuf,
    pub config: JobConfig,
}

/// A job that passed validation and is ready to submit.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub config: JobConfig,
    pub sequence: ImageSequence,
}

impl JobFile {
    pub fn parse(path: &Path, text: &str) -> WorkerResult<Self> {
        let mut job: JobFile = serde_json::from_str(text)
            .map_err(|e| WorkerError::invalid_job_file(path, e.to_string()))?;
        if job.first_image.is_relative() {
            if let Some(dir) = path.parent() {
                job.first_image = dir.join(&job.first_image);
            }
        }
        Ok(job)
    }

    /// Discover the sequence and validate the configuration against it.
    ///
    /// Conversions decode the first selected image to learn the source size
    /// after rotation.
    pub fn prepare(self) -> WorkerResult<PreparedJob> {
        let sequence = discover_sequence(&self.first_image)?;
        let (width, height) = if self.config.rename_only {
            (0, 0)
        } else {
            let sample = sequence.decode(self.config.start_frame)?;
            size_after_rotate(sample.width(), sample.height(), self.config.rotation())
        };
        debug!(
            sequence = %sequence.name,
            count = sequence.count,
            width,
            height,
            "Validating job"
        );
        self.config.validate(&sequence, width, height)?;
        Ok(PreparedJob {
            config: self.config,
            sequence,
        })
    }
}

/// Read, parse and validate the job file at `path`.
pub fn load_job(path: &Path) -> WorkerResult<PreparedJob> {
    let text = std::fs::read_to_string(path)?;
    JobFile::parse(path, &text)?.prepare()
}
