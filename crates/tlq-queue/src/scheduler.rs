//! Single-flight job scheduler.
//!
//! One task owns every job record. Callers talk to it through a
//! [`SchedulerHandle`], each request carrying a oneshot for the reply; the
//! running job reports progress and completion over the same channel, so
//! state is only ever touched from one place.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tlq_models::{format_elapsed, ImageSequence, JobConfig, JobId, JobSnapshot, JobState, QueueSnapshot};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::runner::{JobRunner, ProgressReporter, RunContext};

/// Capacity of the scheduler's command channel.
const COMMAND_CAPACITY: usize = 64;

#[derive(Debug)]
pub(crate) enum Command {
    Submit {
        config: JobConfig,
        sequence: ImageSequence,
        reply: oneshot::Sender<JobId>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<QueueResult<()>>,
    },
    Remove {
        id: JobId,
        reply: oneshot::Sender<QueueResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Progress {
        id: JobId,
        percent: u8,
    },
    Finished {
        id: JobId,
        result: Result<(), String>,
    },
}

struct Job {
    id: JobId,
    state: JobState,
    config: JobConfig,
    sequence: ImageSequence,
    progress: u8,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    /// Present only while active
    cancel: Option<CancellationToken>,
    error: Option<String>,
    log_path: Option<PathBuf>,
}

impl Job {
    fn snapshot(&self, now: DateTime<Utc>) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            output: self.config.filename(),
            state: self.state,
            progress: self.progress,
            elapsed: format_elapsed(self.started_at, self.stopped_at, now),
            error: self.error.clone(),
            log_path: self.log_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Cloneable handle for talking to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Queue a job; it starts once every earlier job has finished.
    pub async fn submit(&self, config: JobConfig, sequence: ImageSequence) -> QueueResult<JobId> {
        self.request(|reply| Command::Submit {
            config,
            sequence,
            reply,
        })
        .await
    }

    /// Cancel the active job `id`.
    pub async fn cancel(&self, id: &JobId) -> QueueResult<()> {
        let id = id.clone();
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    /// Forget a job that is not active.
    pub async fn remove(&self, id: &JobId) -> QueueResult<()> {
        let id = id.clone();
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    pub async fn snapshot(&self) -> QueueResult<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> QueueResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| QueueError::SchedulerStopped)?;
        rx.await.map_err(|_| QueueError::SchedulerStopped)
    }
}

/// The scheduler actor.
pub struct JobScheduler {
    runner: Arc<dyn JobRunner>,
    jobs: Vec<Job>,
    /// Job whose runner has not returned yet, possibly already canceled
    running: Option<JobId>,
    tx: mpsc::WeakSender<Command>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    /// Start the scheduler task.
    ///
    /// It stops when `shutdown` fires (canceling the active job) or once
    /// every handle is dropped and no job is running.
    pub fn spawn(
        runner: Arc<dyn JobRunner>,
        shutdown: CancellationToken,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let scheduler = JobScheduler {
            runner,
            jobs: Vec::new(),
            running: None,
            tx: tx.downgrade(),
            shutdown,
        };
        let task = tokio::spawn(scheduler.run(rx));
        (SchedulerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("Starting job scheduler");
        loop {
            let cmd = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            self.handle(cmd);
        }

        for job in self.jobs.iter_mut() {
            if let Some(token) = job.cancel.take() {
                token.cancel();
            }
        }
        info!("Job scheduler stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit {
                config,
                sequence,
                reply,
            } => {
                let id = JobId::new();
                info!(job_id = %id, output = %config.filename(), "Job added to queue");
                self.jobs.push(Job {
                    id: id.clone(),
                    state: JobState::Pending,
                    config,
                    sequence,
                    progress: 0,
                    started_at: None,
                    stopped_at: None,
                    cancel: None,
                    error: None,
                    log_path: None,
                });
                let _ = reply.send(id);
                self.maybe_start_next();
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel_job(&id));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove_job(&id));
            }
            Command::Snapshot { reply } => {
                let now = Utc::now();
                let _ = reply.send(QueueSnapshot {
                    jobs: self.jobs.iter().map(|j| j.snapshot(now)).collect(),
                    running: self.running.clone(),
                });
            }
            Command::Progress { id, percent } => {
                if let Some(job) = self.job_mut(&id) {
                    if job.state == JobState::Active {
                        job.progress = percent;
                    }
                }
            }
            Command::Finished { id, result } => {
                self.mark_finished(&id, result);
                self.maybe_start_next();
            }
        }
    }

    fn job_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| &j.id == id)
    }

    fn cancel_job(&mut self, id: &JobId) -> QueueResult<()> {
        let job = self
            .job_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        if job.state != JobState::Active {
            return Err(QueueError::NotActive(id.clone()));
        }
        let token = job
            .cancel
            .take()
            .ok_or_else(|| QueueError::NotActive(id.clone()))?;

        token.cancel();
        job.state = JobState::Canceled;
        job.stopped_at = Some(Utc::now());
        info!(job_id = %id, "Job canceled");
        Ok(())
    }

    fn remove_job(&mut self, id: &JobId) -> QueueResult<()> {
        let pos = self
            .jobs
            .iter()
            .position(|j| &j.id == id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        if self.jobs[pos].state == JobState::Active {
            return Err(QueueError::StillActive(id.clone()));
        }
        self.jobs.remove(pos);
        info!(job_id = %id, "Job removed from queue");
        Ok(())
    }

    fn mark_finished(&mut self, id: &JobId, result: Result<(), String>) {
        if self.running.as_ref() == Some(id) {
            self.running = None;
        }
        let Some(job) = self.job_mut(id) else {
            debug!(job_id = %id, "Finished job was already removed");
            return;
        };

        job.cancel = None;
        if job.stopped_at.is_none() {
            job.stopped_at = Some(Utc::now());
        }
        if job.state != JobState::Active {
            // canceled while running; keep that outcome
            debug!(job_id = %id, state = %job.state, "Runner returned for inactive job");
            return;
        }

        match result {
            Ok(()) => {
                job.state = JobState::Done;
                job.progress = 100;
                info!(job_id = %id, "Job completed");
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Job failed");
                job.state = JobState::Failed;
                job.error = Some(e);
            }
        }
    }

    fn maybe_start_next(&mut self) {
        if self.running.is_some() {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let Some(job) = self.jobs.iter_mut().find(|j| j.state == JobState::Pending) else {
            return;
        };

        let cancel = self.shutdown.child_token();
        let log_path = job.sequence.output_path(job.config.log_filename());
        job.state = JobState::Active;
        job.started_at = Some(Utc::now());
        job.cancel = Some(cancel.clone());
        job.log_path = Some(log_path.clone());

        let ctx = RunContext {
            job_id: job.id.clone(),
            config: job.config.clone(),
            sequence: job.sequence.clone(),
            cancel,
            progress: ProgressReporter::new(job.id.clone(), tx.clone()),
            log_path,
        };
        let id = job.id.clone();
        self.running = Some(id.clone());
        info!(job_id = %id, "Job started");

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let result = runner.run(ctx).await.map_err(|e| format!("{:#}", e));
            if tx.send(Command::Finished { id, result }).await.is_err() {
                debug!("Scheduler gone before job finished");
            }
        });
    }
}
