//! Decoded RGBA frames.
//!
//! A [`Frame`] is a rectangle inside a shared RGBA8 buffer. Cropping produces
//! a view onto the same buffer, so a frame's row stride may be wider than its
//! own rows; anything reading pixels must go through [`Frame::row`].

use std::sync::Arc;

use image::RgbaImage;
use tlq_models::Rect;

use crate::error::{MediaError, MediaResult};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the frame stream (0-based)
    seq: u64,
    /// Region of `data` this frame covers
    rect: Rect,
    /// Bytes per row of `data`
    stride: usize,
    data: Arc<Vec<u8>>,
}

impl Frame {
    /// Wrap a tightly packed `width * height * 4` byte buffer.
    pub fn new(seq: u64, width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(MediaError::BadFrameBuffer {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            seq,
            rect: Rect::sized(width, height),
            stride: width as usize * BYTES_PER_PIXEL,
            data: Arc::new(data),
        })
    }

    /// A frame filled with one colour.
    pub fn filled(seq: u64, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_PIXEL)
            .collect();
        Self {
            seq,
            rect: Rect::sized(width, height),
            stride: width as usize * BYTES_PER_PIXEL,
            data: Arc::new(data),
        }
    }

    pub fn from_image(seq: u64, image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            seq,
            rect: Rect::sized(width, height),
            stride: width as usize * BYTES_PER_PIXEL,
            data: Arc::new(image.into_raw()),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Same pixels, new stream position.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn width(&self) -> u32 {
        self.rect.width
    }

    pub fn height(&self) -> u32 {
        self.rect.height
    }

    /// Region of the backing buffer covered by this frame.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Length of one packed row.
    pub fn row_len(&self) -> usize {
        self.rect.width as usize * BYTES_PER_PIXEL
    }

    /// Size of the frame once packed.
    pub fn byte_len(&self) -> usize {
        self.row_len() * self.rect.height as usize
    }

    pub fn same_size(&self, other: &Frame) -> bool {
        self.rect.width == other.rect.width && self.rect.height == other.rect.height
    }

    /// The pixel bytes as one slice, if the frame covers its whole buffer.
    pub fn as_contiguous(&self) -> Option<&[u8]> {
        (self.rect.x == 0
            && self.rect.y == 0
            && self.stride == self.row_len()
            && self.data.len() == self.byte_len())
        .then(|| self.data.as_slice())
    }

    /// Row `y` of the frame, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = (self.rect.y + y) as usize * self.stride + self.rect.x as usize * BYTES_PER_PIXEL;
        &self.data[start..start + self.row_len()]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.rect.height).map(move |y| self.row(y))
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let row = self.row(y);
        let i = x as usize * BYTES_PER_PIXEL;
        [row[i], row[i + 1], row[i + 2], row[i + 3]]
    }

    /// View of `region` (relative to this frame) sharing the same buffer.
    pub fn crop(&self, region: Rect) -> MediaResult<Frame> {
        if region.is_empty() || !region.fits_within(self.rect.width, self.rect.height) {
            return Err(MediaError::CropOutOfBounds {
                region: format!(
                    "{}x{}+{}+{}",
                    region.width, region.height, region.x, region.y
                ),
                width: self.rect.width,
                height: self.rect.height,
            });
        }
        Ok(Frame {
            seq: self.seq,
            rect: Rect::new(
                self.rect.x + region.x,
                self.rect.y + region.y,
                region.width,
                region.height,
            ),
            stride: self.stride,
            data: Arc::clone(&self.data),
        })
    }

    /// Copy into a packed buffer.
    pub fn to_packed(&self) -> Vec<u8> {
        if let Some(bytes) = self.as_contiguous() {
            return bytes.to_vec();
        }
        let mut out = Vec::with_capacity(self.byte_len());
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    /// Copy into an owned image buffer.
    pub fn to_image(&self) -> MediaResult<RgbaImage> {
        RgbaImage::from_raw(self.rect.width, self.rect.height, self.to_packed())
            .ok_or_else(|| MediaError::internal("packed frame has unexpected length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        Frame::new(0, width, height, data).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_length() {
        assert!(matches!(
            Frame::new(0, 2, 2, vec![0; 15]),
            Err(MediaError::BadFrameBuffer { actual: 15, .. })
        ));
    }

    #[test]
    fn test_crop_is_a_view() {
        let frame = gradient(8, 6);
        let cropped = frame.crop(Rect::new(2, 1, 3, 4)).unwrap();

        assert_eq!((cropped.width(), cropped.height()), (3, 4));
        assert_eq!(cropped.stride(), 8 * BYTES_PER_PIXEL);
        assert!(cropped.as_contiguous().is_none());
        assert_eq!(cropped.pixel(0, 0), [2, 1, 0, 255]);
        assert_eq!(cropped.pixel(2, 3), [4, 4, 0, 255]);
        assert_eq!(cropped.row(0).len(), 12);
    }

    #[test]
    fn test_crop_of_crop() {
        let frame = gradient(8, 8);
        let inner = frame
            .crop(Rect::new(1, 1, 6, 6))
            .unwrap()
            .crop(Rect::new(2, 3, 2, 2))
            .unwrap();
        assert_eq!(inner.pixel(0, 0), [3, 4, 0, 255]);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let frame = gradient(4, 4);
        assert!(matches!(
            frame.crop(Rect::new(2, 0, 3, 1)),
            Err(MediaError::CropOutOfBounds { .. })
        ));
        assert!(frame.crop(Rect::new(0, 0, 0, 1)).is_err());
    }

    #[test]
    fn test_to_packed_skips_stride_padding() {
        let frame = gradient(4, 3);
        let packed = frame.crop(Rect::new(1, 1, 2, 2)).unwrap().to_packed();
        assert_eq!(
            packed,
            vec![1, 1, 0, 255, 2, 1, 0, 255, 1, 2, 0, 255, 2, 2, 0, 255]
        );
    }
}
