//! One-to-one frame transforms and the task that runs each of them.

mod crop;
mod resize;
mod rotate;

pub use crop::Crop;
pub use resize::Resize;
pub use rotate::{size_after_rotate, Rotate};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MediaResult;
use crate::frame::Frame;
use crate::stream::{frame_channel, run_blocking, FrameStream};

/// A pipeline stage that maps each frame to exactly one frame.
pub trait FrameTransform: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn transform(&self, frame: Frame) -> MediaResult<Frame>;
}

/// Run `stage` over `input` on its own task.
///
/// Order and count are preserved. An upstream error is forwarded and ends the
/// stage; so does the stage's own failure. Nothing is retried.
pub fn spawn_stage<T: FrameTransform>(
    stage: T,
    mut input: FrameStream,
    cancel: CancellationToken,
) -> FrameStream {
    let (sink, stream) = frame_channel();
    let stage = Arc::new(stage);

    tokio::spawn(async move {
        let name = stage.name();
        while let Some(item) = input.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    sink.send(Err(e)).await;
                    return;
                }
            };

            let seq = frame.seq();
            let s = Arc::clone(&stage);
            let result = run_blocking(move || s.transform(frame)).await;
            if let Err(e) = &result {
                warn!(stage = name, seq, error = %e, "Transform failed");
            }
            let failed = result.is_err();

            if !sink.send_or_cancel(result.map(|f| f.with_seq(seq)), &cancel).await || failed {
                debug!(stage = name, "Stage stopped");
                return;
            }
        }
        debug!(stage = name, "Stage finished");
    });

    stream
}
