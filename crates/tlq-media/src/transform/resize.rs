use image::imageops::{self, FilterType};

use super::FrameTransform;
use crate::error::MediaResult;
use crate::frame::Frame;

/// Smoothing filter for downscaling; nearest-neighbour aliases badly.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Rescales frames to the output resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameTransform for Resize {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn transform(&self, frame: Frame) -> MediaResult<Frame> {
        if frame.width() == self.width && frame.height() == self.height {
            return Ok(frame);
        }
        let resized = imageops::resize(&frame.to_image()?, self.width, self.height, RESIZE_FILTER);
        Ok(Frame::from_image(frame.seq(), resized))
    }
}
