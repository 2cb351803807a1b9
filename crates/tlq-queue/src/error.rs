//! Queue error types.

use thiserror::Error;
use tlq_models::JobId;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} is not active and cannot be canceled")]
    NotActive(JobId),

    #[error("Job {0} is active and cannot be removed")]
    StillActive(JobId),

    #[error("Scheduler is not running")]
    SchedulerStopped,
}

impl QueueError {
    /// True for errors caused by the request rather than the scheduler.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueueError::SchedulerStopped)
    }
}
