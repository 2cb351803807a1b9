//! Encoder driver: streams frames into an FFmpeg subprocess and supervises it.
//!
//! The first frame is pulled before the subprocess starts, since the raw
//! input size comes from it. While the encoder runs, four things can stop it
//! early: cancellation, the watchdog (no progress line for too long), the
//! per-frame deadline on upstream, and upstream or write errors. Every abort
//! takes the same path: SIGINT so FFmpeg can finalise the file, then SIGKILL
//! once if it has not exited after the grace period.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::FfmpegCommand;
use crate::error::{AbortReason, MediaError, MediaResult};
use crate::frame::Frame;
use crate::logging::JobLogger;
use crate::progress::{parse_progress_line, status_lines, EncodeProgress};
use crate::stream::FrameStream;
use crate::writer::FrameWriter;

pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FRAME_DEADLINE: Duration = Duration::from_secs(4 * 60);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2 * 60);

/// How long to keep reading subprocess output after it exits.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// How long a failed write waits for the encoder to exit by itself.
const WRITE_FAILURE_GRACE: Duration = Duration::from_secs(2);

/// Timing and diagnostics knobs for [`EncoderDriver`].
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Longest silence between encoder progress lines
    pub watchdog: Duration,
    /// Longest wait for each upstream frame after the first
    pub frame_deadline: Duration,
    /// Longest wait for the first frame
    pub sample_deadline: Duration,
    /// Time between SIGINT and SIGKILL
    pub kill_grace: Duration,
    /// Log a diagnostic snapshot when the frame deadline fires
    pub capture_diagnostics: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            watchdog: DEFAULT_WATCHDOG,
            frame_deadline: DEFAULT_FRAME_DEADLINE,
            sample_deadline: DEFAULT_FRAME_DEADLINE,
            kill_grace: DEFAULT_KILL_GRACE,
            capture_diagnostics: false,
        }
    }
}

#[derive(Debug, Clone)]
enum EncodeArgs {
    H264 {
        output: PathBuf,
        fps: u32,
        profile_args: Vec<String>,
    },
    Fixed(Vec<String>),
}

/// What to run and how much input to expect.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    program: PathBuf,
    args: EncodeArgs,
    expected_frames: u64,
}

impl EncodeRequest {
    /// H.264 encode of the frame stream into `output`.
    pub fn h264<I, S>(
        program: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        fps: u32,
        profile_args: I,
        expected_frames: u64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: EncodeArgs::H264 {
                output: output.into(),
                fps,
                profile_args: profile_args.into_iter().map(Into::into).collect(),
            },
            expected_frames,
        }
    }

    /// Run `program` with fixed arguments regardless of frame size.
    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I, expected_frames: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: EncodeArgs::Fixed(args.into_iter().map(Into::into).collect()),
            expected_frames,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn expected_frames(&self) -> u64 {
        self.expected_frames
    }

    /// Arguments for frames of `width` x `height`.
    pub fn args(&self, width: u32, height: u32) -> Vec<String> {
        match &self.args {
            EncodeArgs::H264 {
                output,
                fps,
                profile_args,
            } => FfmpegCommand::h264(output, width, height, *fps, profile_args.iter().cloned())
                .build_args(),
            EncodeArgs::Fixed(args) => args.clone(),
        }
    }
}

/// Runs one encode at a time.
#[derive(Debug, Clone, Default)]
pub struct EncoderDriver {
    settings: DriverSettings,
}

struct Supervision {
    status: ExitStatus,
    abort: Option<AbortReason>,
    forced: bool,
}

enum Event {
    Exited(std::io::Result<ExitStatus>),
    Abort(AbortReason),
    Pet,
    PetsClosed,
    KillDue,
}

impl EncoderDriver {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Encode `input` and wait for the subprocess to exit.
    ///
    /// An encoder stopped by the driver is reported as
    /// [`MediaError::Aborted`] even if it then exits cleanly; one that fails
    /// on its own is [`MediaError::FfmpegFailed`], including when it quits
    /// while frames are still being written.
    pub async fn run<F>(
        &self,
        request: &EncodeRequest,
        mut input: FrameStream,
        on_progress: F,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> MediaResult<()>
    where
        F: Fn(EncodeProgress) + Send + 'static,
    {
        let sample = self.sample_frame(&mut input, &cancel, log).await?;
        let args = request.args(sample.width(), sample.height());
        log.log_start(&format!(
            "Running encoder: {} {}",
            request.program.display(),
            args.join(" ")
        ));

        let mut child = Command::new(&request.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                log.log_error(&format!("Failed to start encoder: {}", e));
                MediaError::SpawnFailed(e)
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("encoder stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("encoder stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("encoder stderr not captured"))?;

        let scope = cancel.child_token();
        let (abort_tx, mut abort_rx) = mpsc::channel(4);
        let (pet_tx, mut pet_rx) = mpsc::channel(1);
        let last_frame = Arc::new(AtomicU64::new(0));

        let stderr_task = tokio::spawn(log_stderr(stderr, log.clone()));
        let stdout_task = tokio::spawn(track_progress(
            stdout,
            request.expected_frames,
            on_progress,
            pet_tx,
            Arc::clone(&last_frame),
        ));
        let feeder = Feeder {
            scope: scope.clone(),
            abort_tx,
            frame_deadline: self.settings.frame_deadline,
            capture_diagnostics: self.settings.capture_diagnostics,
            last_frame,
            started: Instant::now(),
            log: log.clone(),
        };
        let feed_task = tokio::spawn(feeder.run(stdin, sample, input));

        let outcome = self
            .supervise(&mut child, &cancel, &scope, &mut abort_rx, &mut pet_rx, log)
            .await;

        scope.cancel();
        if let Err(e) = feed_task.await {
            warn!(error = %e, "Frame feeder task failed");
        }
        drain(stderr_task).await;
        drain(stdout_task).await;

        let Supervision {
            status,
            abort,
            forced,
        } = outcome?;

        if let Some(reason) = abort {
            let err = MediaError::Aborted { reason, forced };
            log.log_error(&err.to_string());
            return Err(err);
        }

        if status.success() {
            log.log_completion("Encoder finished");
            Ok(())
        } else {
            let err = MediaError::ffmpeg_failed(format!("encoder {}", status), status.code());
            log.log_error(&err.to_string());
            Err(err)
        }
    }

    async fn sample_frame(
        &self,
        input: &mut FrameStream,
        cancel: &CancellationToken,
        log: &JobLogger,
    ) -> MediaResult<Frame> {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MediaError::Cancelled),
            item = timeout(self.settings.sample_deadline, input.next()) => item,
        };

        match item {
            Err(_) => {
                log.log_error("Deadline exceeded fetching sample image");
                Err(MediaError::SampleDeadline(self.settings.sample_deadline))
            }
            Ok(None) => {
                log.log_error("Frame stream ended before the first frame");
                Err(MediaError::EmptyStream)
            }
            Ok(Some(Err(e))) => {
                log.log_error(&format!("Failed to fetch a sample image: {}", e));
                Err(e)
            }
            Ok(Some(Ok(frame))) => Ok(frame),
        }
    }

    /// Wait for the encoder to exit, driving the watchdog and abort sequence.
    async fn supervise(
        &self,
        child: &mut Child,
        cancel: &CancellationToken,
        scope: &CancellationToken,
        abort_rx: &mut mpsc::Receiver<AbortReason>,
        pet_rx: &mut mpsc::Receiver<()>,
        log: &JobLogger,
    ) -> MediaResult<Supervision> {
        let watchdog = sleep(self.settings.watchdog);
        let kill_timer = sleep(self.settings.kill_grace);
        tokio::pin!(watchdog, kill_timer);

        let mut abort: Option<AbortReason> = None;
        let mut forced = false;
        let mut kill_armed = false;
        let mut pets_open = true;

        loop {
            let event = tokio::select! {
                status = child.wait() => Event::Exited(status),
                Some(reason) = abort_rx.recv(), if abort.is_none() => Event::Abort(reason),
                _ = cancel.cancelled(), if abort.is_none() => Event::Abort(AbortReason::Cancelled),
                _ = &mut watchdog, if abort.is_none() => {
                    Event::Abort(AbortReason::Watchdog(self.settings.watchdog))
                }
                pet = pet_rx.recv(), if pets_open => match pet {
                    Some(()) => Event::Pet,
                    None => Event::PetsClosed,
                },
                _ = &mut kill_timer, if kill_armed => Event::KillDue,
            };

            match event {
                Event::Exited(status) => {
                    return Ok(Supervision {
                        status: status?,
                        abort,
                        forced,
                    });
                }
                Event::Pet => {
                    watchdog
                        .as_mut()
                        .reset(Instant::now() + self.settings.watchdog);
                }
                Event::PetsClosed => pets_open = false,
                Event::Abort(reason) => {
                    if let AbortReason::WriteFailed(_) = reason {
                        // A closed pipe usually means the encoder quit on its
                        // own; its exit status is the real error then.
                        if let Ok(status) = timeout(WRITE_FAILURE_GRACE, child.wait()).await {
                            let status = status?;
                            return Ok(Supervision {
                                status,
                                abort: status.success().then_some(reason),
                                forced,
                            });
                        }
                    }
                    log.log_error(&format!("Aborting encoder: {}", reason));
                    scope.cancel();
                    match interrupt(child) {
                        Ok(()) => {
                            kill_timer
                                .as_mut()
                                .reset(Instant::now() + self.settings.kill_grace);
                            kill_armed = true;
                        }
                        Err(e) => {
                            log.log_warning(&format!("Failed to interrupt encoder: {}", e));
                            force_kill(child, log);
                            forced = true;
                        }
                    }
                    abort = Some(reason);
                }
                Event::KillDue => {
                    kill_armed = false;
                    log.log_warning("Encoder shutdown taking too long, sending SIGKILL");
                    force_kill(child, log);
                    forced = true;
                }
            }
        }
    }
}

/// Writes the sample and every following frame to the encoder's stdin.
struct Feeder {
    scope: CancellationToken,
    abort_tx: mpsc::Sender<AbortReason>,
    frame_deadline: Duration,
    capture_diagnostics: bool,
    last_frame: Arc<AtomicU64>,
    started: Instant,
    log: JobLogger,
}

impl Feeder {
    async fn run(self, stdin: ChildStdin, sample: Frame, mut input: FrameStream) {
        let mut writer = FrameWriter::new(stdin);
        let mut pending = Some(sample);

        loop {
            let frame = match pending.take() {
                Some(frame) => frame,
                None => {
                    let item = tokio::select! {
                        biased;
                        _ = self.scope.cancelled() => return,
                        item = timeout(self.frame_deadline, input.next()) => item,
                    };
                    match item {
                        Err(_) => {
                            self.log.log_error("Deadline exceeded waiting for next frame");
                            if self.capture_diagnostics {
                                self.log_diagnostics(writer.frames_written());
                            }
                            self.abort(AbortReason::FrameDeadline(self.frame_deadline))
                                .await;
                            return;
                        }
                        Ok(None) => break,
                        Ok(Some(Err(e))) => {
                            self.log.log_error(&format!("Error reading image: {}", e));
                            self.abort(AbortReason::Upstream(e.to_string())).await;
                            return;
                        }
                        Ok(Some(Ok(frame))) => frame,
                    }
                }
            };

            let written = tokio::select! {
                biased;
                _ = self.scope.cancelled() => return,
                written = writer.write_frame(&frame) => written,
            };
            if let Err(e) = written {
                self.log
                    .log_error(&format!("Failed to write frame to encoder: {}", e));
                self.abort(AbortReason::WriteFailed(e.to_string())).await;
                return;
            }
        }

        debug!(
            job_id = self.log.job_id(),
            frames = writer.frames_written(),
            "All frames written to encoder"
        );
        if let Err(e) = writer.finish().await {
            self.log
                .log_warning(&format!("Failed to close encoder input: {}", e));
        }
    }

    async fn abort(&self, reason: AbortReason) {
        // The supervisor may already be gone if the encoder exited first
        let _ = self.abort_tx.send(reason).await;
    }

    fn log_diagnostics(&self, frames_written: u64) {
        self.log.log_error(&format!(
            "Diagnostic snapshot: frames written {}, last encoder frame {}, elapsed {}s, frame deadline {}s",
            frames_written,
            self.last_frame.load(Ordering::Relaxed),
            self.started.elapsed().as_secs(),
            self.frame_deadline.as_secs(),
        ));
    }
}

async fn log_stderr(stderr: ChildStderr, log: JobLogger) {
    let mut lines = status_lines(stderr);
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => log.log_output(&line),
            Err(e) => {
                log.log_error(&format!("Error reading encoder stderr: {}", e));
                return;
            }
        }
    }
    log.log_output("Encoder stderr closed");
}

async fn track_progress<F>(
    stdout: ChildStdout,
    expected_frames: u64,
    on_progress: F,
    pet_tx: mpsc::Sender<()>,
    last_frame: Arc<AtomicU64>,
) where
    F: Fn(EncodeProgress) + Send + 'static,
{
    let mut lines = status_lines(stdout);
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Error reading encoder stdout");
                return;
            }
        };
        if let Some(progress) = parse_progress_line(&line, expected_frames) {
            last_frame.store(progress.frame, Ordering::Relaxed);
            on_progress(progress);
            // full means a reset is already pending
            let _ = pet_tx.try_send(());
        }
    }
}

/// Give an output reader a moment to finish, then stop it.
async fn drain(task: JoinHandle<()>) {
    let handle = task.abort_handle();
    if timeout(OUTPUT_DRAIN, task).await.is_err() {
        handle.abort();
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(std::io::Error::from),
        // already reaped
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

fn force_kill(child: &mut Child, log: &JobLogger) {
    if let Err(e) = child.start_kill() {
        log.log_warning(&format!("Failed to kill encoder: {}", e));
    }
}
