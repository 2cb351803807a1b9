//! Timelapse worker binary.
//!
//! Usage: `tlq-worker <job.json>...`
//!
//! Queues every valid job file, runs them one at a time and prints the
//! queue periodically. Ctrl-C cancels the running job and drops the rest.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tlq_models::{JobState, QueueSnapshot};
use tlq_queue::{JobScheduler, SchedulerHandle};
use tlq_worker::{load_job, ConvertRunner, WorkerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("tlq=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let job_files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if job_files.is_empty() {
        eprintln!("usage: tlq-worker <job.json>...");
        return ExitCode::from(2);
    }

    info!("Starting tlq-worker");
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let shutdown = CancellationToken::new();
    let runner = Arc::new(ConvertRunner::new(config.clone()));
    let (handle, scheduler) = JobScheduler::spawn(runner, shutdown.clone());

    let mut queued = 0;
    for path in &job_files {
        let job = match load_job(path) {
            Ok(job) => job,
            Err(e) => {
                error!(path = %path.display(), "Rejected job: {}", e);
                continue;
            }
        };
        match handle.submit(job.config, job.sequence).await {
            Ok(id) => {
                info!(job_id = %id, path = %path.display(), "Job queued");
                queued += 1;
            }
            Err(e) => error!(path = %path.display(), "Failed to queue job: {}", e),
        }
    }
    if queued == 0 {
        error!("No valid jobs to run");
        shutdown.cancel();
        scheduler.await.ok();
        return ExitCode::FAILURE;
    }

    let result = supervise(&handle, config.status_interval).await;

    shutdown.cancel();
    scheduler.await.ok();
    info!("Worker shutdown complete");

    match result {
        Some(snapshot) if snapshot.jobs.iter().all(|j| j.state == JobState::Done) => {
            ExitCode::SUCCESS
        }
        _ => ExitCode::FAILURE,
    }
}

/// Print the queue until it is idle; the first Ctrl-C stops everything.
async fn supervise(
    handle: &SchedulerHandle,
    interval: std::time::Duration,
) -> Option<QueueSnapshot> {
    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !stopping => {
                info!("Received shutdown signal");
                stopping = true;
                stop_all(handle).await;
            }
            _ = ticker.tick() => {
                let snapshot = match handle.snapshot().await {
                    Ok(s) => s,
                    Err(e) => {
                        error!("Scheduler unavailable: {}", e);
                        return None;
                    }
                };
                print_snapshot(&snapshot);
                if snapshot.is_idle() {
                    return Some(snapshot);
                }
            }
        }
    }
}

/// Cancel the active job and drop the pending ones.
async fn stop_all(handle: &SchedulerHandle) {
    let Ok(snapshot) = handle.snapshot().await else {
        return;
    };
    for job in &snapshot.jobs {
        let result = match job.state {
            JobState::Active => handle.cancel(&job.id).await,
            JobState::Pending => handle.remove(&job.id).await,
            _ => continue,
        };
        if let Err(e) = result {
            warn!(job_id = %job.id, "Failed to stop job: {}", e);
        }
    }
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    for job in &snapshot.jobs {
        match &job.error {
            Some(e) => info!(
                job_id = %job.id,
                state = job.state.as_str(),
                "{} {}% {} ({})",
                job.output, job.progress, job.elapsed, e
            ),
            None => info!(
                job_id = %job.id,
                state = job.state.as_str(),
                "{} {}% {}",
                job.output, job.progress, job.elapsed
            ),
        }
    }
}
