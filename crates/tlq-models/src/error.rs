//! Configuration error types.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Reasons a job configuration is rejected before it reaches the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing output filename")]
    MissingOutputName,

    #[error("{0} frame out of bounds")]
    FrameOutOfBounds(&'static str),

    #[error("start frame must come before end frame")]
    InvertedRange,

    #[error("invalid skip value {0}")]
    InvalidSkip(u64),

    #[error("output resolution profile not specified")]
    MissingProfile,

    #[error("unknown output resolution profile {0:?}")]
    UnknownProfile(String),

    #[error("selected region must be at least {width} x {height}")]
    RegionTooSmall { width: u32, height: u32 },

    #[error("crop rectangle out of bounds of source image")]
    RegionOutOfBounds,

    #[error("stacking window out of range 0..{0}")]
    StackWindowOutOfRange(u64),

    #[error("stacking skip count out of range")]
    StackSkipOutOfRange,

    #[error("invalid stack mode {0:?}")]
    UnknownBlendMode(String),

    #[error("the output file {0} already exists")]
    OutputExists(String),
}
