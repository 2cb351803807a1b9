//! Scheduler integration tests with a runner the test controls.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tlq_models::{ImageSequence, JobConfig, JobId, JobState, QueueSnapshot, Rect};
use tlq_queue::{JobRunner, JobScheduler, QueueError, RunContext, SchedulerHandle};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

/// Runs until the test releases a permit or the job is canceled.
///
/// Jobs named `fail-*` return an error when released.
struct GatedRunner {
    started: mpsc::UnboundedSender<String>,
    release: Arc<Semaphore>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl JobRunner for GatedRunner {
    async fn run(&self, ctx: RunContext) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _ = self.started.send(ctx.config.output_name.clone());
        ctx.progress.report(40);

        let result = tokio::select! {
            permit = self.release.acquire() => {
                permit?.forget();
                if ctx.config.output_name.starts_with("fail") {
                    Err(anyhow::anyhow!("encoder exploded"))
                } else {
                    Ok(())
                }
            }
            _ = ctx.cancel.cancelled() => {
                // encoder takes a moment to wind down
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(anyhow::anyhow!("aborted"))
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct Fixture {
    handle: SchedulerHandle,
    runner: Arc<GatedRunner>,
    started: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Fixture {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = Arc::new(GatedRunner {
            started: tx,
            release: Arc::new(Semaphore::new(0)),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let (handle, _task) = JobScheduler::spawn(runner.clone(), CancellationToken::new());
        Self {
            handle,
            runner,
            started: Mutex::new(rx),
        }
    }

    async fn submit(&self, name: &str) -> JobId {
        self.handle
            .submit(config(name), sequence())
            .await
            .expect("Failed to submit job")
    }

    async fn next_started(&self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.started.lock().await.recv())
            .await
            .expect("No job started")
            .expect("Runner gone")
    }

    fn release(&self) {
        self.runner.release.add_permits(1);
    }

    async fn wait_for(&self, pred: impl Fn(&QueueSnapshot) -> bool) -> QueueSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snap = self.handle.snapshot().await.expect("Failed to snapshot");
                if pred(&snap) {
                    return snap;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Condition not reached")
    }
}

fn config(name: &str) -> JobConfig {
    JobConfig {
        output_name: name.to_string(),
        region: Rect::new(0, 0, 1920, 1080),
        start_frame: 0,
        end_frame: 9,
        skip: 0,
        frame_rate: 30,
        profile: "1080p".to_string(),
        rotate: 0,
        stack: None,
        rename_only: false,
    }
}

fn sequence() -> ImageSequence {
    ImageSequence {
        dir: PathBuf::from("/photos"),
        name: "IMG_0001.jpg".to_string(),
        prefix: "IMG_".to_string(),
        ext: "jpg".to_string(),
        num_len: 4,
        start: 1,
        count: 10,
    }
}

fn state(snap: &QueueSnapshot, id: &JobId) -> JobState {
    snap.get(id).expect("Job missing from snapshot").state
}

/// Jobs run one at a time in submission order.
#[tokio::test]
async fn test_fifo_single_flight() {
    let f = Fixture::new();
    let a = f.submit("a").await;
    let b = f.submit("b").await;
    let c = f.submit("c").await;

    assert_eq!(f.next_started().await, "a");
    let snap = f.handle.snapshot().await.unwrap();
    assert_eq!(state(&snap, &a), JobState::Active);
    assert_eq!(state(&snap, &b), JobState::Pending);
    assert_eq!(state(&snap, &c), JobState::Pending);
    assert_eq!(snap.get(&b).unwrap().elapsed, "");

    f.release();
    assert_eq!(f.next_started().await, "b");
    f.release();
    assert_eq!(f.next_started().await, "c");
    f.release();

    let snap = f.wait_for(QueueSnapshot::is_idle).await;
    for id in [&a, &b, &c] {
        let job = snap.get(id).unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.progress, 100);
    }
    let order: Vec<&str> = snap.jobs.iter().map(|j| j.output.as_str()).collect();
    assert_eq!(order, vec!["a.mp4", "b.mp4", "c.mp4"]);
    assert_eq!(f.runner.max_active.load(Ordering::SeqCst), 1);
}

/// Cancel is immediate, a second cancel fails, and the canceled job can be
/// removed while the next one waits for its runner to return.
#[tokio::test]
async fn test_cancel_then_remove() {
    let f = Fixture::new();
    let a = f.submit("a").await;
    let b = f.submit("b").await;
    assert_eq!(f.next_started().await, "a");

    assert_ok!(f.handle.cancel(&a).await);
    let snap = f.handle.snapshot().await.unwrap();
    assert_eq!(state(&snap, &a), JobState::Canceled);

    assert_eq!(
        f.handle.cancel(&a).await,
        Err(QueueError::NotActive(a.clone()))
    );
    assert_ok!(f.handle.remove(&a).await);
    assert!(f.handle.snapshot().await.unwrap().get(&a).is_none());

    assert_eq!(f.next_started().await, "b");
    assert_eq!(f.runner.max_active.load(Ordering::SeqCst), 1);
    f.release();
    let snap = f.wait_for(QueueSnapshot::is_idle).await;
    assert_eq!(state(&snap, &b), JobState::Done);
}

/// A canceled job stays canceled after its runner reports an error.
#[tokio::test]
async fn test_canceled_state_survives_runner_error() {
    let f = Fixture::new();
    let a = f.submit("a").await;
    f.next_started().await;
    assert_ok!(f.handle.cancel(&a).await);

    // give the runner time to return its error
    tokio::time::sleep(Duration::from_millis(200)).await;
    let job = f.handle.snapshot().await.unwrap().get(&a).cloned().unwrap();
    assert_eq!(job.state, JobState::Canceled);
    assert!(job.error.is_none());
}

/// Active jobs cannot be removed; pending jobs can, and never run.
#[tokio::test]
async fn test_remove_rules() {
    let f = Fixture::new();
    let a = f.submit("a").await;
    let b = f.submit("b").await;
    let c = f.submit("c").await;
    assert_eq!(f.next_started().await, "a");

    assert_eq!(
        f.handle.remove(&a).await,
        Err(QueueError::StillActive(a.clone()))
    );
    assert_err!(f.handle.cancel(&b).await);
    assert_ok!(f.handle.remove(&b).await);

    f.release();
    assert_eq!(f.next_started().await, "c");
    f.release();
    let snap = f.wait_for(QueueSnapshot::is_idle).await;
    assert_eq!(snap.jobs.len(), 2);
    assert_eq!(state(&snap, &c), JobState::Done);
}

/// A failed job keeps its last progress and records the error.
#[tokio::test]
async fn test_failed_keeps_progress() {
    let f = Fixture::new();
    let id = f.submit("fail-1").await;
    f.next_started().await;
    f.wait_for(|s| s.get(&id).map(|j| j.progress) == Some(40))
        .await;

    f.release();
    let snap = f.wait_for(QueueSnapshot::is_idle).await;
    let job = snap.get(&id).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.progress, 40);
    assert!(job.error.as_deref().unwrap().contains("encoder exploded"));
    assert_eq!(job.log_path.as_deref(), Some("/photos/fail-1.mp4.log"));
}

/// The queue is not idle until a canceled job's runner has wound down.
#[tokio::test]
async fn test_idle_waits_for_canceled_runner() {
    let f = Fixture::new();
    let a = f.submit("a").await;
    f.next_started().await;

    assert_ok!(f.handle.cancel(&a).await);
    let snap = f.handle.snapshot().await.unwrap();
    assert_eq!(state(&snap, &a), JobState::Canceled);
    assert_eq!(snap.running, Some(a.clone()));
    assert!(!snap.is_idle());

    let snap = f.wait_for(QueueSnapshot::is_idle).await;
    assert!(snap.running.is_none());
    assert_eq!(f.runner.active.load(Ordering::SeqCst), 0);
}
