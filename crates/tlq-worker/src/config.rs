//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use tlq_media::DriverSettings;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Explicit ffmpeg binary; `PATH` is searched when unset
    pub ffmpeg: Option<PathBuf>,
    /// Longest silence from the encoder before it is aborted
    pub watchdog: Duration,
    /// Longest wait for each frame after the first
    pub frame_deadline: Duration,
    /// Longest wait for the first frame
    pub sample_deadline: Duration,
    /// Time between SIGINT and SIGKILL when aborting
    pub kill_grace: Duration,
    /// Write a diagnostic snapshot to the job log on a frame deadline
    pub capture_diagnostics: bool,
    /// How often the CLI prints the queue
    pub status_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            watchdog: Duration::from_secs(300), // 5 minutes
            frame_deadline: Duration::from_secs(240),
            sample_deadline: Duration::from_secs(240),
            kill_grace: Duration::from_secs(120),
            capture_diagnostics: false,
            status_interval: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            ffmpeg: lookup("FFMPEG")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            watchdog: secs("TLQ_WATCHDOG_SECS", defaults.watchdog),
            frame_deadline: secs("TLQ_FRAME_DEADLINE_SECS", defaults.frame_deadline),
            sample_deadline: secs("TLQ_SAMPLE_DEADLINE_SECS", defaults.sample_deadline),
            kill_grace: secs("TLQ_KILL_GRACE_SECS", defaults.kill_grace),
            capture_diagnostics: lookup("TLQ_CAPTURE_DIAGNOSTICS")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.capture_diagnostics),
            status_interval: secs("TLQ_STATUS_INTERVAL_SECS", defaults.status_interval),
        }
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            watchdog: self.watchdog,
            frame_deadline: self.frame_deadline,
            sample_deadline: self.sample_deadline,
            kill_grace: self.kill_grace,
            capture_diagnostics: self.capture_diagnostics,
        }
    }
}
