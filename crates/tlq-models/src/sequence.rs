//! Numbered image sequences on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A run of numbered images such as `IMG_0001.jpg .. IMG_0420.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSequence {
    /// Directory containing the images (outputs are written here too)
    pub dir: PathBuf,
    /// File name of the first image
    pub name: String,
    /// Text preceding the number
    pub prefix: String,
    /// File extension, without the dot
    pub ext: String,
    /// Zero-padded width of the number
    pub num_len: usize,
    /// Number of the first image
    pub start: u64,
    /// Number of images in the sequence
    pub count: u64,
}

impl ImageSequence {
    /// Path of the image at position `idx` (0-based), if in range.
    pub fn path_for_index(&self, idx: u64) -> Option<PathBuf> {
        if idx >= self.count {
            return None;
        }
        let base = format!(
            "{}{:0width$}.{}",
            self.prefix,
            self.start + idx,
            self.ext,
            width = self.num_len
        );
        Some(self.dir.join(base))
    }

    /// Path for an output file stored alongside the images.
    pub fn output_path(&self, base: impl AsRef<Path>) -> PathBuf {
        self.dir.join(base)
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
