//! Encoder driver integration tests.
//!
//! `sh` scripts stand in for FFmpeg so the tests can control exactly how the
//! subprocess behaves: reading stdin, printing status lines, ignoring SIGINT.

#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tlq_media::{
    frame_channel, AbortReason, DriverSettings, EncodeRequest, EncoderDriver, Frame, FrameStream,
    JobLogger, MediaError,
};
use tlq_models::JobId;
use tokio_util::sync::CancellationToken;

fn fast_settings() -> DriverSettings {
    DriverSettings {
        watchdog: Duration::from_secs(30),
        frame_deadline: Duration::from_secs(30),
        sample_deadline: Duration::from_secs(30),
        kill_grace: Duration::from_secs(30),
        capture_diagnostics: false,
    }
}

fn frames(n: u64) -> FrameStream {
    FrameStream::from_frames((0..n).map(|i| Frame::filled(i, 4, 2, [i as u8; 4])).collect())
}

fn script(body: &str, expected_frames: u64) -> EncodeRequest {
    EncodeRequest::with_args("sh", ["-c", body], expected_frames)
}

struct Harness {
    _dir: tempfile::TempDir,
    log_path: std::path::PathBuf,
    log: JobLogger,
    progress: Arc<Mutex<Vec<u8>>>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let log_path = dir.path().join("out.mp4.log");
        let log = JobLogger::with_file(&JobId::new(), "encode", &log_path)
            .expect("Failed to open job log");
        Self {
            _dir: dir,
            log_path,
            log,
            progress: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn run(
        &self,
        settings: DriverSettings,
        request: EncodeRequest,
        input: FrameStream,
        cancel: CancellationToken,
    ) -> Result<(), MediaError> {
        let progress = Arc::clone(&self.progress);
        EncoderDriver::new(settings)
            .run(
                &request,
                input,
                move |p| progress.lock().unwrap().push(p.percent),
                cancel,
                &self.log,
            )
            .await
    }

    fn log_text(&self) -> String {
        std::fs::read_to_string(&self.log_path).unwrap_or_default()
    }
}

/// All frames reach stdin and progress lines are reported.
#[tokio::test]
async fn test_encode_success() {
    let h = Harness::new();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let out = dir.path().join("raw.bin");
    let body = format!(
        "cat > '{}'; printf 'frame=1\\rframe=2\\nframe=3\\n'; echo '[info] done' >&2",
        out.display()
    );

    h.run(fast_settings(), script(&body, 3), frames(3), CancellationToken::new())
        .await
        .expect("Encode failed");

    let raw = std::fs::read(&out).expect("Failed to read encoder input");
    assert_eq!(raw.len(), 3 * 4 * 2 * 4);
    assert_eq!(&raw[32..36], &[1, 1, 1, 1]);
    assert_eq!(*h.progress.lock().unwrap(), vec![33, 66, 100]);
    assert!(h.log_text().contains("[info] done"));
}

/// A non-zero exit without an abort is an encoder failure.
#[tokio::test]
async fn test_encoder_failure_exit_code() {
    let h = Harness::new();
    let result = h
        .run(
            fast_settings(),
            script("cat > /dev/null; exit 3", 2),
            frames(2),
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(MediaError::FfmpegFailed { exit_code, .. }) => assert_eq!(exit_code, Some(3)),
        other => panic!("unexpected result: {:?}", other),
    }
}

/// An encoder that rejects its input and exits keeps its exit code, even
/// though writing the remaining frames fails with a broken pipe.
#[tokio::test]
async fn test_encoder_rejecting_input_reports_exit_code() {
    for _ in 0..5 {
        let h = Harness::new();
        let large: Vec<Frame> = (0..20).map(|i| Frame::filled(i, 512, 512, [7; 4])).collect();
        let result = h
            .run(
                fast_settings(),
                script("echo 'bad input' >&2; exit 3", 20),
                FrameStream::from_frames(large),
                CancellationToken::new(),
            )
            .await;

        match result {
            Err(MediaError::FfmpegFailed { exit_code, .. }) => assert_eq!(exit_code, Some(3)),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(h.log_text().contains("bad input"));
    }
}

/// A silent encoder is interrupted by the watchdog.
#[tokio::test]
async fn test_watchdog_interrupts_silent_encoder() {
    let h = Harness::new();
    let settings = DriverSettings {
        watchdog: Duration::from_millis(300),
        ..fast_settings()
    };

    let started = std::time::Instant::now();
    let result = h
        .run(settings, script("exec sleep 30", 1), frames(1), CancellationToken::new())
        .await;

    match result {
        Err(MediaError::Aborted { reason, forced }) => {
            assert!(matches!(reason, AbortReason::Watchdog(_)));
            assert!(!forced);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// Progress lines keep the watchdog from firing.
#[tokio::test]
async fn test_progress_pets_watchdog() {
    let h = Harness::new();
    let settings = DriverSettings {
        watchdog: Duration::from_millis(400),
        ..fast_settings()
    };
    let body = "cat > /dev/null; for i in 1 2 3 4 5 6; do echo frame=$i; sleep 0.15; done";

    h.run(settings, script(body, 6), frames(1), CancellationToken::new())
        .await
        .expect("Watchdog fired despite progress");
    assert_eq!(h.progress.lock().unwrap().last(), Some(&100));
}

/// An encoder ignoring SIGINT is killed once after the grace period.
#[tokio::test]
async fn test_sigkill_once_after_grace() {
    let h = Harness::new();
    let settings = DriverSettings {
        watchdog: Duration::from_millis(200),
        kill_grace: Duration::from_millis(300),
        ..fast_settings()
    };

    let result = h
        .run(
            settings,
            script("trap '' INT; exec sleep 30", 1),
            frames(1),
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(MediaError::Aborted { reason, forced }) => {
            assert!(matches!(reason, AbortReason::Watchdog(_)));
            assert!(forced);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(h.log_text().matches("sending SIGKILL").count(), 1);
}

/// Cancellation interrupts a running encode.
#[tokio::test]
async fn test_cancel_running_encode() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = h
        .run(fast_settings(), script("exec sleep 30", 1), frames(1), cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

/// An encoder that exits cleanly on SIGINT still reports the cancel.
#[tokio::test]
async fn test_cancel_reported_after_clean_exit() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = h
        .run(
            fast_settings(),
            script("trap 'exit 0' INT; while :; do sleep 0.05; done", 1),
            frames(1),
            cancel,
        )
        .await;

    match result {
        Err(MediaError::Aborted { reason, forced }) => {
            assert_eq!(reason, AbortReason::Cancelled);
            assert!(!forced);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

/// A pipeline error after the sample aborts the encoder.
#[tokio::test]
async fn test_upstream_error_aborts() {
    let h = Harness::new();
    let (sink, stream) = frame_channel();
    tokio::spawn(async move {
        sink.send(Ok(Frame::filled(0, 2, 2, [0; 4]))).await;
        sink.send(Ok(Frame::filled(1, 2, 2, [0; 4]))).await;
        sink.send(Err(MediaError::IndexOutOfRange(2))).await;
    });

    let result = h
        .run(
            fast_settings(),
            script("exec cat > /dev/null", 3),
            stream,
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(MediaError::Aborted {
            reason: AbortReason::Upstream(msg),
            ..
        }) => assert!(msg.contains("outside the image sequence")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(h.log_text().contains("Error reading image"));
}

/// A stalled pipeline trips the frame deadline and logs diagnostics.
#[tokio::test]
async fn test_frame_deadline_with_diagnostics() {
    let h = Harness::new();
    let (sink, stream) = frame_channel();
    let hold = sink.clone();
    tokio::spawn(async move {
        sink.send(Ok(Frame::filled(0, 2, 2, [0; 4]))).await;
        sink.send(Ok(Frame::filled(1, 2, 2, [0; 4]))).await;
    });
    let settings = DriverSettings {
        frame_deadline: Duration::from_millis(300),
        capture_diagnostics: true,
        ..fast_settings()
    };

    let result = h
        .run(settings, script("exec cat > /dev/null", 10), stream, CancellationToken::new())
        .await;
    drop(hold);

    match result {
        Err(MediaError::Aborted { reason, forced }) => {
            assert_eq!(reason, AbortReason::FrameDeadline(Duration::from_millis(300)));
            assert!(!forced);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    let log = h.log_text();
    assert!(log.contains("Deadline exceeded waiting for next frame"));
    assert!(log.contains("Diagnostic snapshot: frames written 2"));
}

/// No first frame within the sample deadline: the encoder never starts.
#[tokio::test]
async fn test_sample_deadline() {
    let h = Harness::new();
    let (_sink, stream) = frame_channel();
    let settings = DriverSettings {
        sample_deadline: Duration::from_millis(100),
        ..fast_settings()
    };

    let err = h
        .run(settings, script("exit 0", 1), stream, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::SampleDeadline(_)));
    assert!(!h.log_text().contains("Running encoder"));
}

/// An empty stream is an error, not an empty video.
#[tokio::test]
async fn test_empty_stream() {
    let h = Harness::new();
    let err = h
        .run(fast_settings(), script("exit 0", 1), frames(0), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::EmptyStream));
}
