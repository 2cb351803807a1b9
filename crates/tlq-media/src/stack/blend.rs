use tlq_models::BlendMode;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Pairwise pixel merge. Implementations must be commutative and
/// associative; the merge cache depends on it.
pub trait Blender: Send + Sync + 'static {
    fn blend(&self, a: &Frame, b: &Frame) -> MediaResult<Frame>;
}

impl Blender for BlendMode {
    fn blend(&self, a: &Frame, b: &Frame) -> MediaResult<Frame> {
        if !a.same_size(b) {
            return Err(MediaError::SizeMismatch(
                format!("{}x{}", a.width(), a.height()),
                format!("{}x{}", b.width(), b.height()),
            ));
        }

        let pick: fn(u8, u8) -> u8 = match self {
            BlendMode::Lighten => u8::max,
            BlendMode::Darken => u8::min,
        };

        let mut out = Vec::with_capacity(a.byte_len());
        for (ra, rb) in a.rows().zip(b.rows()) {
            out.extend(ra.iter().zip(rb).map(|(&x, &y)| pick(x, y)));
        }
        Frame::new(a.seq().max(b.seq()), a.width(), a.height(), out)
    }
}
