//! The seam between the scheduler and whatever actually runs a job.

use std::path::PathBuf;

use async_trait::async_trait;
use tlq_models::{ImageSequence, JobConfig, JobId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::scheduler::Command;

/// Runs one job to completion.
///
/// The scheduler calls `run` for at most one job at a time and starts the
/// next job only after it returns, so implementations may assume exclusive
/// use of the encoder. Returning `Err` fails the job unless it was already
/// canceled.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, ctx: RunContext) -> anyhow::Result<()>;
}

/// Everything a runner gets for one job.
#[derive(Debug)]
pub struct RunContext {
    pub job_id: JobId,
    pub config: JobConfig,
    pub sequence: ImageSequence,
    /// Fires when the job is canceled or the scheduler shuts down
    pub cancel: CancellationToken,
    pub progress: ProgressReporter,
    /// Where the job's log file should go
    pub log_path: PathBuf,
}

/// Reports percentage progress for one job back to the scheduler.
///
/// Reports are lossy: if the scheduler is busy the update is dropped and
/// the next one supersedes it.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    tx: mpsc::Sender<Command>,
}

impl ProgressReporter {
    pub(crate) fn new(job_id: JobId, tx: mpsc::Sender<Command>) -> Self {
        Self { job_id, tx }
    }

    pub fn report(&self, percent: u8) {
        let cmd = Command::Progress {
            id: self.job_id.clone(),
            percent: percent.min(100),
        };
        if self.tx.try_send(cmd).is_err() {
            trace!(job_id = %self.job_id, percent, "Dropped progress update");
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}
