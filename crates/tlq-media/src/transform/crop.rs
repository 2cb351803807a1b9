use tlq_models::Rect;

use super::FrameTransform;
use crate::error::MediaResult;
use crate::frame::Frame;

/// Extracts a fixed region without copying pixels.
///
/// A region outside the frame fails the job: validation should have
/// rejected it before the job was queued.
#[derive(Debug, Clone, Copy)]
pub struct Crop {
    pub region: Rect,
}

impl Crop {
    pub fn new(region: Rect) -> Self {
        Self { region }
    }
}

impl FrameTransform for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn transform(&self, frame: Frame) -> MediaResult<Frame> {
        frame.crop(self.region)
    }
}
