//! Job identity, lifecycle states and queue snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
///
/// `Pending -> Active -> {Done | Failed | Canceled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the active job to finish
    #[default]
    Pending,
    /// Currently encoding
    Active,
    /// Encoder exited cleanly
    Done,
    /// Pipeline or encoder error
    Failed,
    /// Canceled by request while active
    Canceled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Canceled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Display view of a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    /// Output video file name
    pub output: String,
    pub state: JobState,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Elapsed run time, empty if the job never started
    pub elapsed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
}

/// Display view of the whole queue, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub jobs: Vec<JobSnapshot>,
    /// Job whose runner has not returned yet. A canceled job stays here
    /// while its encoder shuts down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<JobId>,
}

impl QueueSnapshot {
    pub fn get(&self, id: &JobId) -> Option<&JobSnapshot> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    /// True when no job is pending or active and no runner is still
    /// winding down.
    pub fn is_idle(&self) -> bool {
        self.running.is_none() && self.jobs.iter().all(|j| j.state.is_terminal())
    }
}

/// Format the time between `start` and `stop` (or `now`) as e.g. `1h2m3s`.
pub fn format_elapsed(
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let Some(start) = start else {
        return String::new();
    };
    let elapsed = stop.unwrap_or(now) - start;
    let secs = elapsed.max(Duration::zero()).num_seconds();

    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}
