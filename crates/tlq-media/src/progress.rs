//! Encoder progress parsing.

use std::io;
use std::sync::LazyLock;

use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());

/// Progress derived from one encoder status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Frames the encoder has consumed
    pub frame: u64,
    /// Percentage of the expected frame count, capped at 100
    pub percent: u8,
}

impl EncodeProgress {
    pub fn new(frame: u64, expected_frames: u64) -> Self {
        Self {
            frame,
            percent: percent_of(frame, expected_frames),
        }
    }
}

/// Frame number from a status line such as `frame=  120 fps=...`.
pub fn parse_frame_number(line: &str) -> Option<u64> {
    FRAME_RE.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Parse a status line against the expected total.
pub fn parse_progress_line(line: &str, expected_frames: u64) -> Option<EncodeProgress> {
    parse_frame_number(line).map(|frame| EncodeProgress::new(frame, expected_frames))
}

/// `100 * frame / expected`, capped at 100.
pub fn percent_of(frame: u64, expected_frames: u64) -> u8 {
    (frame.saturating_mul(100) / expected_frames.max(1)).min(100) as u8
}

/// Split subprocess output into trimmed, non-empty lines.
///
/// FFmpeg redraws its status with a bare carriage return, so both `\r` and
/// `\n` end a line.
pub fn status_lines<R>(reader: R) -> BoxStream<'static, io::Result<String>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    FramedRead::new(reader, AnyDelimiterCodec::new(b"\r\n".to_vec(), Vec::new()))
        .filter_map(|chunk| async move {
            match chunk {
                Ok(bytes) => {
                    let line = String::from_utf8_lossy(&bytes).trim().to_string();
                    (!line.is_empty()).then_some(Ok(line))
                }
                Err(e) => Some(Err(io::Error::other(e))),
            }
        })
        .boxed()
}
