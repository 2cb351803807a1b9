//! Temporal frame stacking.
//!
//! Each output frame is the blend of a sliding window of input frames. Blends
//! are commutative and associative, so partial results over any subset of a
//! window can be cached and reused by later windows.

mod blend;
mod merge_cache;
mod stacker;

pub use blend::Blender;
pub use merge_cache::{CacheEntry, MergeCache};
pub use stacker::{apply_skip, StackState, Stacker};
