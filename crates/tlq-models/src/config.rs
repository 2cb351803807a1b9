//! Job configuration.
//!
//! The engine only reads a configuration through its accessors; parsing and
//! [`JobConfig::validate`] happen before a job is ever queued.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::profile::{profile_by_name, OutputProfile};
use crate::rect::Rect;
use crate::sequence::ImageSequence;

/// Frame rate used when the configuration leaves it unset.
pub const DEFAULT_FPS: u32 = 60;

/// Pixel merge operator used when stacking frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Per-channel maximum
    Lighten,
    /// Per-channel minimum
    Darken,
}

impl BlendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Lighten => "lighten",
            BlendMode::Darken => "darken",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lighten" => Ok(BlendMode::Lighten),
            "darken" => Ok(BlendMode::Darken),
            other => Err(ConfigError::UnknownBlendMode(other.to_string())),
        }
    }
}

/// Temporal stacking options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Number of preceding frames blended into each output; 0 blends the whole history
    pub window: u64,
    /// Only blend positions divisible by this factor; 0 disables decimation
    #[serde(default)]
    pub skip: u64,
    pub mode: BlendMode,
}

/// Everything needed to turn a range of an image sequence into a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Output base name, without extension
    pub output_name: String,
    /// Crop region, in (rotated) source pixels
    pub region: Rect,
    pub start_frame: u64,
    /// Inclusive
    pub end_frame: u64,
    /// Take every n-th image; 0 and 1 both mean every image
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub frame_rate: u32,
    /// Output profile name, see [`crate::PROFILES`]
    pub profile: String,
    /// Rotation in degrees, applied before cropping
    #[serde(default)]
    pub rotate: i32,
    #[serde(default)]
    pub stack: Option<StackConfig>,
    /// Move the selected images instead of encoding them
    #[serde(default)]
    pub rename_only: bool,
}

impl JobConfig {
    /// Output video file name.
    pub fn filename(&self) -> String {
        format!("{}.mp4", self.output_name)
    }

    /// Per-job log file name.
    pub fn log_filename(&self) -> String {
        format!("{}.log", self.filename())
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn start_end(&self) -> (u64, u64) {
        (self.start_frame, self.end_frame)
    }

    pub fn stride(&self) -> u64 {
        self.skip.max(1)
    }

    pub fn fps(&self) -> u32 {
        if self.frame_rate > 0 {
            self.frame_rate
        } else {
            DEFAULT_FPS
        }
    }

    pub fn rotation(&self) -> i32 {
        self.rotate
    }

    pub fn stack_options(&self) -> Option<StackConfig> {
        self.stack
    }

    /// Number of frames the encoder will receive; the progress denominator.
    pub fn expected_frames(&self) -> u64 {
        if self.end_frame < self.start_frame {
            return 0;
        }
        (self.end_frame - self.start_frame) / self.stride() + 1
    }

    pub fn output_profile(&self) -> ConfigResult<&'static OutputProfile> {
        profile_by_name(&self.profile)
    }

    /// Check the configuration against the sequence it will read.
    ///
    /// `sample_width`/`sample_height` are the dimensions of the first selected
    /// image after rotation.
    pub fn validate(
        &self,
        sequence: &ImageSequence,
        sample_width: u32,
        sample_height: u32,
    ) -> ConfigResult<()> {
        if self.output_name.trim().is_empty() {
            return Err(ConfigError::MissingOutputName);
        }

        if self.start_frame >= sequence.count {
            return Err(ConfigError::FrameOutOfBounds("start"));
        }
        if self.end_frame >= sequence.count {
            return Err(ConfigError::FrameOutOfBounds("end"));
        }
        if self.start_frame >= self.end_frame {
            return Err(ConfigError::InvertedRange);
        }
        if self.skip >= self.end_frame - self.start_frame {
            return Err(ConfigError::InvalidSkip(self.skip));
        }

        if !self.rename_only {
            let profile = self.output_profile()?;
            if self.region.width < profile.width || self.region.height < profile.height {
                return Err(ConfigError::RegionTooSmall {
                    width: profile.width,
                    height: profile.height,
                });
            }
            if !self.region.fits_within(sample_width, sample_height) {
                return Err(ConfigError::RegionOutOfBounds);
            }
        }

        if let Some(stack) = self.stack {
            let max = (self.end_frame - self.start_frame + 1) / self.stride();
            if stack.window > max {
                return Err(ConfigError::StackWindowOutOfRange(max));
            }
            if stack.skip > max || stack.skip > stack.window {
                return Err(ConfigError::StackSkipOutOfRange);
            }
        }

        if sequence.output_path(self.filename()).exists() {
            return Err(ConfigError::OutputExists(self.filename()));
        }

        Ok(())
    }
}
