#![deny(unreachable_patterns)]
//! Frame pipeline and FFmpeg streaming for timelapse encoding.
//!
//! This crate provides:
//! - Image-sequence discovery and a lazy frame source
//! - Crop, rotate and resize stages joined by single-slot channels
//! - Windowed frame stacking backed by a merge cache
//! - An encoder driver feeding raw frames to FFmpeg with a watchdog,
//!   per-frame deadlines and SIGINT-then-SIGKILL shutdown
//! - Per-job log files

pub mod command;
pub mod driver;
pub mod error;
pub mod frame;
pub mod logging;
pub mod progress;
pub mod source;
pub mod stack;
pub mod stream;
pub mod transform;
pub mod writer;

pub use command::{locate_ffmpeg, locate_ffmpeg_from, FfmpegCommand};
pub use driver::{DriverSettings, EncodeRequest, EncoderDriver};
pub use error::{AbortReason, MediaError, MediaResult};
pub use frame::{Frame, BYTES_PER_PIXEL};
pub use logging::JobLogger;
pub use progress::{parse_frame_number, parse_progress_line, status_lines, EncodeProgress};
pub use source::{discover_sequence, spawn_frame_source, FrameDecoder, FrameRange};
pub use stack::{Blender, MergeCache, StackState, Stacker};
pub use stream::{frame_channel, FrameSink, FrameStream, STAGE_CAPACITY};
pub use transform::{size_after_rotate, spawn_stage, Crop, FrameTransform, Resize, Rotate};
pub use writer::FrameWriter;
