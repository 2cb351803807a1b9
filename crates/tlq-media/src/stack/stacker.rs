use std::collections::VecDeque;
use std::sync::Arc;

use tlq_models::StackConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Blender, MergeCache};
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::stream::{frame_channel, run_blocking, FrameStream};

/// Keep window members divisible by `skip`, plus the newest member.
pub fn apply_skip(window: &[u64], skip: u64) -> Vec<u64> {
    if skip <= 1 {
        return window.to_vec();
    }
    let mut kept: Vec<u64> = window.iter().copied().filter(|i| i % skip == 0).collect();
    if let Some(&last) = window.last() {
        if kept.last() != Some(&last) {
            kept.push(last);
        }
    }
    kept
}

/// Synchronous stacking state, one call to [`StackState::push`] per input.
#[derive(Debug)]
pub enum StackState {
    /// Sliding window of `size` positions backed by a merge cache
    Window {
        size: usize,
        skip: u64,
        positions: VecDeque<u64>,
        cache: MergeCache,
        next: u64,
    },
    /// Running blend of everything seen so far
    History { acc: Option<Frame> },
}

impl StackState {
    /// `overlap` of zero stacks the whole history.
    pub fn new(overlap: u64, skip: u64) -> Self {
        if overlap == 0 {
            return StackState::History { acc: None };
        }
        StackState::Window {
            size: overlap as usize + 1,
            skip,
            positions: VecDeque::new(),
            cache: MergeCache::new(),
            next: 0,
        }
    }

    /// Feed one input frame and return the stacked output for it.
    pub fn push(&mut self, frame: Frame, blender: &dyn Blender) -> MediaResult<Frame> {
        let seq = frame.seq();
        match self {
            StackState::History { acc } => {
                let merged = match acc.take() {
                    Some(prev) => blender.blend(&frame, &prev)?,
                    None => frame,
                };
                let merged = merged.with_seq(seq);
                *acc = Some(merged.clone());
                Ok(merged)
            }
            StackState::Window {
                size,
                skip,
                positions,
                cache,
                next,
            } => {
                let position = *next;
                *next += 1;

                cache.insert(position, frame);
                positions.push_back(position);
                if positions.len() > *size {
                    if let Some(oldest) = positions.pop_front() {
                        cache.evict_through(oldest);
                    }
                }

                let window: Vec<u64> = positions.iter().copied().collect();
                let members = apply_skip(&window, *skip);
                Ok(cache.generate(&members, blender)?.with_seq(seq))
            }
        }
    }

    /// The merge cache, for window mode.
    pub fn cache(&self) -> Option<&MergeCache> {
        match self {
            StackState::Window { cache, .. } => Some(cache),
            StackState::History { .. } => None,
        }
    }
}

/// Pipeline stage producing one stacked frame per input frame.
pub struct Stacker {
    overlap: u64,
    skip: u64,
    blender: Arc<dyn Blender>,
}

impl Stacker {
    pub fn new(overlap: u64, skip: u64, blender: Arc<dyn Blender>) -> Self {
        Self {
            overlap,
            skip,
            blender,
        }
    }

    pub fn from_config(config: &StackConfig) -> Self {
        Self::new(config.window, config.skip, Arc::new(config.mode))
    }

    /// Start stacking `input` in the background.
    ///
    /// Output positions match input positions. An upstream error is passed
    /// on and ends the stage, as does a blend failure.
    pub fn spawn(self, mut input: FrameStream, cancel: CancellationToken) -> FrameStream {
        let (sink, stream) = frame_channel();

        tokio::spawn(async move {
            let mut state = StackState::new(self.overlap, self.skip);
            let mut count = 0u64;

            while let Some(item) = input.next().await {
                if cancel.is_cancelled() {
                    debug!("Stacker cancelled");
                    return;
                }
                let frame = match item {
                    Ok(frame) => frame,
                    Err(e) => {
                        sink.send(Err(e)).await;
                        return;
                    }
                };

                let blender = Arc::clone(&self.blender);
                let pushed = run_blocking(move || {
                    let out = state.push(frame, blender.as_ref());
                    Ok((state, out))
                })
                .await;

                let (next_state, out) = match pushed {
                    Ok(pushed) => pushed,
                    Err(e) => {
                        sink.send(Err(e)).await;
                        return;
                    }
                };
                state = next_state;

                match out {
                    Ok(frame) => {
                        count += 1;
                        if !sink.send_or_cancel(Ok(frame), &cancel).await {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Stacking failed");
                        sink.send(Err(e)).await;
                        return;
                    }
                }
            }
            debug!(frames = count, "Stacker finished");
        });

        stream
    }
}
