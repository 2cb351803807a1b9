//! FFmpeg command builder for raw-frame encoding.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Quality settings shared by every output profile.
const VIDEO_CODEC: &str = "libx264";
const PRESET: &str = "slow";
const CRF: u8 = 16;
const X264_OPTS: &str = "colorprim=bt709:transfer=bt709:colormatrix=bt709:fullrange=off";

/// Prefix each stderr line with its level so the job log shows it.
const LOG_LEVEL: &str = "level+info";

/// Builder for an FFmpeg invocation that reads RGBA frames from stdin.
///
/// No `-y`: FFmpeg refuses to replace an existing output.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Raw RGBA frames of `width` x `height` at `fps` on stdin.
    pub fn rawvideo_stdin(output: impl AsRef<Path>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
        .input_arg("-framerate")
        .input_arg(fps.to_string())
        .input_arg("-f")
        .input_arg("rawvideo")
        .input_arg("-pixel_format")
        .input_arg("rgba")
        .input_arg("-video_size")
        .input_arg(format!("{}x{}", width, height))
    }

    /// The full H.264 recipe: codec, quality, profile passthrough arguments,
    /// BT.709 colour tags and output size.
    pub fn h264<I, S>(
        output: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: u32,
        profile_args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::rawvideo_stdin(output, width, height, fps)
            .video_codec(VIDEO_CODEC)
            .preset(PRESET)
            .crf(CRF)
            .output_args(profile_args)
            .x264_opts(X264_OPTS)
            .size(width, height)
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn x264_opts(self, opts: impl Into<String>) -> Self {
        self.output_arg("-x264opts").output_arg(opts)
    }

    /// Set output frame size.
    pub fn size(self, width: u32, height: u32) -> Self {
        self.output_arg("-s").output_arg(format!("{}x{}", width, height))
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.input_args.clone();

        // Frames arrive on stdin
        args.push("-i".to_string());
        args.push("-".to_string());

        args.extend(self.output_args.iter().cloned());

        args.push("-loglevel".to_string());
        args.push(LOG_LEVEL.to_string());

        // Key=value progress records on stdout
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Locate the ffmpeg binary: `$FFMPEG` if set, otherwise `PATH`.
pub fn locate_ffmpeg() -> MediaResult<PathBuf> {
    locate_ffmpeg_from(std::env::var_os("FFMPEG").map(PathBuf::from))
}

/// Like [`locate_ffmpeg`] with an explicit override instead of `$FFMPEG`.
pub fn locate_ffmpeg_from(configured: Option<PathBuf>) -> MediaResult<PathBuf> {
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        debug!(path = %path.display(), "Using configured ffmpeg");
        return Ok(path);
    }
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}
