use super::FrameTransform;
use crate::error::MediaResult;
use crate::frame::{Frame, BYTES_PER_PIXEL};

/// Size of the smallest upright rectangle enclosing a `width` x `height`
/// image rotated by `degrees`.
pub fn size_after_rotate(width: u32, height: u32, degrees: i32) -> (u32, u32) {
    let mut deg = degrees.unsigned_abs() % 180;
    let swap = deg > 90;
    if swap {
        deg -= 90;
    }

    let (sin, cos) = (deg as f64).to_radians().sin_cos();
    let (w, h) = (width as f64, height as f64);
    // epsilon keeps exact right angles from truncating to n - 1
    let rw = (w * cos + h * sin + 1e-9).floor() as u32;
    let rh = (w * sin + h * cos + 1e-9).floor() as u32;

    if swap {
        (rh, rw)
    } else {
        (rw, rh)
    }
}

/// Rotates frames about their centre onto the enclosing rectangle.
///
/// Uncovered corners are left transparent black.
#[derive(Debug, Clone, Copy)]
pub struct Rotate {
    pub degrees: i32,
}

impl Rotate {
    pub fn new(degrees: i32) -> Self {
        Self { degrees }
    }
}

impl FrameTransform for Rotate {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn transform(&self, frame: Frame) -> MediaResult<Frame> {
        if self.degrees % 360 == 0 {
            return Ok(frame);
        }

        let (w, h) = (frame.width(), frame.height());
        let (ow, oh) = size_after_rotate(w, h, self.degrees);
        let src = frame.to_packed();

        let (sin, cos) = (self.degrees as f64).to_radians().sin_cos();
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let (ocx, ocy) = (ow as f64 / 2.0, oh as f64 / 2.0);

        let mut out = vec![0u8; ow as usize * oh as usize * BYTES_PER_PIXEL];
        for oy in 0..oh {
            for ox in 0..ow {
                let dx = ox as f64 + 0.5 - ocx;
                let dy = oy as f64 + 0.5 - ocy;
                // inverse rotation back into source pixel-centre coordinates
                let sx = cos * dx + sin * dy + cx - 0.5;
                let sy = -sin * dx + cos * dy + cy - 0.5;

                if let Some(px) = sample_bilinear(&src, w, h, sx, sy) {
                    let i = (oy as usize * ow as usize + ox as usize) * BYTES_PER_PIXEL;
                    out[i..i + BYTES_PER_PIXEL].copy_from_slice(&px);
                }
            }
        }

        Frame::new(frame.seq(), ow, oh, out)
    }
}

fn sample_bilinear(src: &[u8], w: u32, h: u32, x: f64, y: f64) -> Option<[u8; 4]> {
    if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
        return None;
    }

    let (x0f, y0f) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0f, y - y0f);
    let clamp_x = |v: f64| (v as i64).clamp(0, w as i64 - 1) as usize;
    let clamp_y = |v: f64| (v as i64).clamp(0, h as i64 - 1) as usize;
    let (x0, x1) = (clamp_x(x0f), clamp_x(x0f + 1.0));
    let (y0, y1) = (clamp_y(y0f), clamp_y(y0f + 1.0));

    let at = |px: usize, py: usize, c: usize| src[(py * w as usize + px) * BYTES_PER_PIXEL + c] as f64;

    let mut out = [0u8; 4];
    for (c, slot) in out.iter_mut().enumerate() {
        let top = at(x0, y0, c) * (1.0 - fx) + at(x1, y0, c) * fx;
        let bottom = at(x0, y1, c) * (1.0 - fx) + at(x1, y1, c) * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}
