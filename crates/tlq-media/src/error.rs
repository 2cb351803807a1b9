//! Error types for media operations.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Why the encoder subprocess was stopped before it finished on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Cancellation requested from outside the driver
    Cancelled,
    /// No upstream frame arrived within the per-frame deadline
    FrameDeadline(Duration),
    /// The encoder stopped reporting progress
    Watchdog(Duration),
    /// Decode or transform failure after the encoder started
    Upstream(String),
    /// Writing to the encoder's input failed
    WriteFailed(String),
}

impl AbortReason {
    /// Liveness failures: the pipeline or the encoder hung.
    pub fn is_liveness(&self) -> bool {
        matches!(self, AbortReason::FrameDeadline(_) | AbortReason::Watchdog(_))
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::FrameDeadline(d) => {
                write!(f, "no frame received within {}s", d.as_secs())
            }
            AbortReason::Watchdog(d) => {
                write!(f, "encoder non-responsive for {}s", d.as_secs())
            }
            AbortReason::Upstream(e) => write!(f, "pipeline error: {}", e),
            AbortReason::WriteFailed(e) => write!(f, "failed to write frame: {}", e),
        }
    }
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found (set FFMPEG or add it to PATH)")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Failed to start encoder: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Frame index {0} outside the image sequence")]
    IndexOutOfRange(u64),

    #[error("Not an image sequence: {0}")]
    NotASequence(PathBuf),

    #[error("Crop region {region} outside {width}x{height} frame")]
    CropOutOfBounds {
        region: String,
        width: u32,
        height: u32,
    },

    #[error("Frame buffer of {actual} bytes does not match {width}x{height}")]
    BadFrameBuffer { width: u32, height: u32, actual: usize },

    #[error("Cannot blend {0} frame with {1} frame")]
    SizeMismatch(String, String),

    #[error("Deadline of {}s exceeded fetching sample frame", .0.as_secs())]
    SampleDeadline(Duration),

    #[error("Frame stream ended before the first frame")]
    EmptyStream,

    #[error("Encoder aborted: {reason}{}", forced_suffix(.forced))]
    Aborted { reason: AbortReason, forced: bool },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn forced_suffix(forced: &bool) -> &'static str {
    if *forced {
        " (killed)"
    } else {
        ""
    }
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the job ended because someone asked it to.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            MediaError::Cancelled
                | MediaError::Aborted {
                    reason: AbortReason::Cancelled,
                    ..
                }
        )
    }

    /// The abort reason, if the encoder was stopped by the driver.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            MediaError::Aborted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
