//! Frame source: decodes a range of an image sequence into a frame stream.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tlq_models::{ImageSequence, JobConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::stream::{frame_channel, run_blocking, FrameStream};

/// `<prefix><digits>.<ext>`
static SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\d]*)(\d+)\.(\w+)$").unwrap());

/// Decodes sequence images by position.
pub trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, index: u64) -> MediaResult<Frame>;
}

impl FrameDecoder for ImageSequence {
    fn decode(&self, index: u64) -> MediaResult<Frame> {
        let path = self
            .path_for_index(index)
            .ok_or(MediaError::IndexOutOfRange(index))?;
        let image = image::open(&path)
            .map_err(|source| MediaError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        Ok(Frame::from_image(index, image))
    }
}

/// Inclusive index range with a stride of at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
    pub stride: u64,
}

impl FrameRange {
    pub fn new(start: u64, end: u64, stride: u64) -> Self {
        Self {
            start,
            end,
            stride: stride.max(1),
        }
    }

    pub fn from_config(config: &JobConfig) -> Self {
        let (start, end) = config.start_end();
        Self::new(start, end, config.stride())
    }

    pub fn indices(&self) -> impl Iterator<Item = u64> {
        (self.start..=self.end).step_by(self.stride as usize)
    }

    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start) / self.stride + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Start decoding `range` in the background.
///
/// Frames come out in index order tagged with their stream position. A
/// decode failure is sent once and ends the stream. Cancellation is checked
/// before each decode; a decode already running finishes and is discarded.
pub fn spawn_frame_source(
    decoder: Arc<dyn FrameDecoder>,
    range: FrameRange,
    cancel: CancellationToken,
) -> FrameStream {
    let (sink, stream) = frame_channel();

    tokio::spawn(async move {
        for (position, index) in range.indices().enumerate() {
            if cancel.is_cancelled() {
                debug!(index, "Frame source cancelled");
                return;
            }

            let d = Arc::clone(&decoder);
            match run_blocking(move || d.decode(index)).await {
                Ok(frame) => {
                    if cancel.is_cancelled() {
                        debug!(index, "Discarding frame decoded after cancel");
                        return;
                    }
                    let frame = frame.with_seq(position as u64);
                    if !sink.send_or_cancel(Ok(frame), &cancel).await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(index, error = %e, "Failed to decode frame");
                    sink.send(Err(e)).await;
                    return;
                }
            }
        }
        debug!(frames = range.len(), "Frame source finished");
    });

    stream
}

/// Describe the numbered sequence that starts at `first_image`.
///
/// The file name must look like `<prefix><digits>.<ext>`; the sequence runs
/// for as long as consecutively numbered files exist.
pub fn discover_sequence(first_image: &Path) -> MediaResult<ImageSequence> {
    let not_a_sequence = || MediaError::NotASequence(first_image.to_path_buf());

    let name = first_image
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(not_a_sequence)?;
    let dir = first_image
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let caps = SEQUENCE_RE
        .captures(name).ok_or_else(not_a_sequence)?;
    let digits = &caps[2];
    let start: u64 = digits.parse().map_err(|_| not_a_sequence())?;

    let mut sequence = ImageSequence {
        dir,
        name: name.to_string(),
        prefix: caps[1].to_string(),
        ext: caps[3].to_string(),
        num_len: digits.len(),
        start,
        count: u64::MAX,
    };

    let mut count = 0;
    while let Some(path) = sequence.path_for_index(count) {
        if !path.is_file() {
            break;
        }
        count += 1;
    }
    if count == 0 {
        return Err(MediaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", first_image.display()),
        )));
    }

    sequence.count = count;
    debug!(
        prefix = %sequence.prefix,
        start = sequence.start,
        count = sequence.count,
        "Discovered image sequence"
    );
    Ok(sequence)
}
