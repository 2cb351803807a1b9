//! Output resolution profiles.

use serde::Serialize;

use crate::error::{ConfigError, ConfigResult};

/// A named output configuration: final resolution plus encoder arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// Extra encoder arguments, passed through verbatim
    pub ffmpeg_args: &'static [&'static str],
}

/// The supported output profiles.
pub const PROFILES: &[OutputProfile] = &[
    OutputProfile {
        name: "1080p (1920x1080)",
        width: 1920,
        height: 1080,
        ffmpeg_args: &["-level:v", "4.2", "-profile:v", "high", "-pix_fmt", "yuv420p"],
    },
    OutputProfile {
        name: "4k (3840x2160)",
        width: 3840,
        height: 2160,
        ffmpeg_args: &["-level:v", "5.2", "-profile:v", "high", "-pix_fmt", "yuv420p"],
    },
    OutputProfile {
        name: "12MP (4000x3000)",
        width: 4000,
        height: 3000,
        ffmpeg_args: &["-level:v", "6.2", "-profile:v", "high", "-pix_fmt", "yuv420p"],
    },
];

/// Look up a profile by its display name.
pub fn profile_by_name(name: &str) -> ConfigResult<&'static OutputProfile> {
    if name.is_empty() {
        return Err(ConfigError::MissingProfile);
    }
    PROFILES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
}
