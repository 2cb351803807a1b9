//! Writes frames to the encoder as packed rawvideo.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::frame::Frame;

/// Writes each frame as one packed `width * height * 4` byte record.
///
/// Frames covering their whole buffer are written straight from it; cropped
/// views are packed row by row into a scratch buffer that is reused across
/// frames, so the encoder always receives whole frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    out: W,
    scratch: Vec<u8>,
    frames_written: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            scratch: Vec::new(),
            frames_written: 0,
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        match frame.as_contiguous() {
            Some(bytes) => self.out.write_all(bytes).await?,
            None => {
                self.scratch.clear();
                self.scratch.reserve(frame.byte_len());
                for row in frame.rows() {
                    self.scratch.extend_from_slice(row);
                }
                self.out.write_all(&self.scratch).await?;
            }
        }
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and close the output, signalling end of input to the encoder.
    pub async fn finish(mut self) -> io::Result<W> {
        self.out.shutdown().await?;
        Ok(self.out)
    }
}
