//! Rename-only jobs: move the selected images to numbered output names
//! instead of encoding them.

use std::path::Path;

use tlq_media::progress::percent_of;
use tlq_media::{FrameRange, JobLogger, MediaError};
use tlq_models::{ImageSequence, JobConfig};
use tokio_util::sync::CancellationToken;

use crate::error::{WorkerError, WorkerResult};

/// Name of the `position`-th renamed image, e.g. `sunset000042.jpg`.
pub fn target_name(output_name: &str, position: u64, ext: &str) -> String {
    format!("{}{:06}.{}", output_name, position, ext)
}

/// Move every selected image of `sequence` next to itself under its
/// output name, in order. Returns the number of files moved.
///
/// Stops at the first existing target; files already moved stay moved.
pub async fn rename_sequence(
    config: &JobConfig,
    sequence: &ImageSequence,
    on_progress: impl Fn(u8),
    cancel: &CancellationToken,
    log: &JobLogger,
) -> WorkerResult<u64> {
    let range = FrameRange::from_config(config);
    let total = range.len();

    for (position, index) in range.indices().enumerate() {
        if cancel.is_cancelled() {
            log.log_warning("Rename cancelled");
            return Err(WorkerError::Cancelled);
        }

        let src = sequence
            .path_for_index(index)
            .ok_or(MediaError::IndexOutOfRange(index))?;
        let dst = sequence.output_path(target_name(
            &config.output_name,
            position as u64,
            &sequence.ext,
        ));

        log.log_progress(&format!("Rename {} to {}", src.display(), dst.display()));
        if let Err(e) = move_file(&src, &dst).await {
            log.log_error(&format!("FAILED: {}", e));
            return Err(e);
        }
        on_progress(percent_of(position as u64 + 1, total));
    }

    log.log_completion(&format!("Renamed {} images", total));
    Ok(total)
}

async fn move_file(src: &Path, dst: &Path) -> WorkerResult<()> {
    if tokio::fs::try_exists(dst).await? {
        return Err(WorkerError::OutputExists(dst.to_path_buf()));
    }
    tokio::fs::rename(src, dst)
        .await
        .map_err(|source| WorkerError::RenameFailed {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        })
}
