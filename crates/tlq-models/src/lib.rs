//! Shared data models for the timelapse queue.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job states and queue snapshots
//! - Job configuration and its validation
//! - Output resolution profiles
//! - Image sequences on disk
//! - Pixel rectangles and blend modes

pub mod config;
pub mod error;
pub mod job;
pub mod profile;
pub mod rect;
pub mod sequence;

// Re-export common types
pub use config::{BlendMode, JobConfig, StackConfig, DEFAULT_FPS};
pub use error::{ConfigError, ConfigResult};
pub use job::{format_elapsed, JobId, JobSnapshot, JobState, QueueSnapshot};
pub use profile::{profile_by_name, OutputProfile, PROFILES};
pub use rect::Rect;
pub use sequence::ImageSequence;
