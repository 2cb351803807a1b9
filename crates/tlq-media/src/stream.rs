//! Frame streams between pipeline stages.
//!
//! Every stage hands frames to the next through a channel of capacity one,
//! so a slow consumer stalls everything above it and at most one frame per
//! stage is in flight. Errors travel down the same channel as the frames.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Handoff capacity between stages.
pub const STAGE_CAPACITY: usize = 1;

pub type FrameResult = MediaResult<Frame>;

/// Receiving end of a stage.
#[derive(Debug)]
pub struct FrameStream {
    rx: mpsc::Receiver<FrameResult>,
}

/// Sending end of a stage.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<FrameResult>,
}

/// Create a connected sink/stream pair.
pub fn frame_channel() -> (FrameSink, FrameStream) {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    (FrameSink { tx }, FrameStream { rx })
}

impl FrameStream {
    /// Next frame or error; `None` once the producer is finished.
    pub async fn next(&mut self) -> Option<FrameResult> {
        self.rx.recv().await
    }

    /// Stream over a fixed list, mostly useful for tests.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        let (sink, stream) = frame_channel();
        tokio::spawn(async move {
            for frame in frames {
                if !sink.send(Ok(frame)).await {
                    return;
                }
            }
        });
        stream
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect(mut self) -> MediaResult<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(item) = self.next().await {
            frames.push(item?);
        }
        Ok(frames)
    }
}

impl FrameSink {
    /// Hand an item downstream. Returns `false` if the consumer is gone.
    pub async fn send(&self, item: FrameResult) -> bool {
        self.tx.send(item).await.is_ok()
    }

    /// Like [`FrameSink::send`], but gives up when `cancel` fires first.
    pub async fn send_or_cancel(&self, item: FrameResult, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }
}

/// Run CPU-bound work on the blocking pool.
pub async fn run_blocking<T, F>(f: F) -> MediaResult<T>
where
    F: FnOnce() -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::internal(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_frames_preserves_order() {
        let frames = (0..5).map(|i| Frame::filled(i, 1, 1, [0; 4])).collect();
        let out = FrameStream::from_frames(frames).collect().await.unwrap();
        let seqs: Vec<u64> = out.iter().map(Frame::seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_collect_stops_at_error() {
        let (sink, stream) = frame_channel();
        tokio::spawn(async move {
            sink.send(Ok(Frame::filled(0, 1, 1, [0; 4]))).await;
            sink.send(Err(MediaError::internal("boom"))).await;
        });
        assert!(matches!(stream.collect().await, Err(MediaError::Internal(_))));
    }

    #[tokio::test]
    async fn test_send_or_cancel_gives_up() {
        let (sink, _stream) = frame_channel();
        let cancel = CancellationToken::new();
        // fill the single slot so the next send would block
        assert!(sink.send(Ok(Frame::filled(0, 1, 1, [0; 4]))).await);
        cancel.cancel();
        assert!(
            !sink
                .send_or_cancel(Ok(Frame::filled(1, 1, 1, [0; 4])), &cancel)
                .await
        );
    }
}
