use tracing::trace;

use super::Blender;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// A blended result and the input indices that went into it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Sorted, unique
    indices: Vec<u64>,
    frame: Frame,
}

impl CacheEntry {
    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    fn min_index(&self) -> u64 {
        self.indices[0]
    }
}

/// Partial blends keyed by the set of input indices they cover.
///
/// Generating a window picks a greedy cover of the window out of cached
/// entries and merges it back to front, caching every intermediate result.
/// Consecutive windows share most of their members, so each new window
/// typically costs a couple of blends instead of `window - 1`.
#[derive(Debug, Default)]
pub struct MergeCache {
    entries: Vec<CacheEntry>,
}

impl MergeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Index sets of all entries, in insertion order.
    pub fn index_sets(&self) -> Vec<Vec<u64>> {
        self.entries.iter().map(|e| e.indices.clone()).collect()
    }

    /// Cache a single input frame.
    pub fn insert(&mut self, index: u64, frame: Frame) {
        self.insert_entry(vec![index], frame);
    }

    fn insert_entry(&mut self, indices: Vec<u64>, frame: Frame) {
        if self.entries.iter().any(|e| e.indices == indices) {
            return;
        }
        self.entries.push(CacheEntry { indices, frame });
    }

    /// Drop every entry whose smallest index is `index` or lower.
    pub fn evict_through(&mut self, index: u64) {
        let before = self.entries.len();
        self.entries.retain(|e| e.min_index() > index);
        trace!(index, evicted = before - self.entries.len(), "Evicted merge cache entries");
    }

    /// Disjoint cached entries whose union is exactly `window`, ordered by
    /// smallest index.
    ///
    /// Greedy: repeatedly take the largest entry that fits inside what is
    /// still uncovered, preferring the smallest minimum index on ties.
    pub fn spanning_cover(&self, window: &[u64]) -> MediaResult<Vec<usize>> {
        let mut remaining: Vec<u64> = window.to_vec();
        remaining.sort_unstable();
        remaining.dedup();

        let mut cover = Vec::new();
        while !remaining.is_empty() {
            let best = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| is_subset(&e.indices, &remaining))
                .min_by_key(|(_, e)| (std::cmp::Reverse(e.indices.len()), e.min_index()))
                .map(|(i, _)| i)
                .ok_or_else(|| {
                    MediaError::internal(format!(
                        "merge cache cannot cover frames {:?}",
                        remaining
                    ))
                })?;

            remaining.retain(|i| self.entries[best].indices.binary_search(i).is_err());
            cover.push(best);
        }

        cover.sort_by_key(|&i| self.entries[i].min_index());
        Ok(cover)
    }

    /// Blend of every frame in `window`.
    ///
    /// All members must already be cached, as singletons or larger entries.
    pub fn generate(&mut self, window: &[u64], blender: &dyn Blender) -> MediaResult<Frame> {
        let cover: Vec<CacheEntry> = self
            .spanning_cover(window)?
            .into_iter()
            .map(|i| self.entries[i].clone())
            .collect();

        let mut parts = cover.into_iter().rev();
        let tail = parts
            .next()
            .ok_or_else(|| MediaError::internal("cannot generate an empty window"))?;

        let (mut indices, mut frame) = (tail.indices, tail.frame);
        for part in parts {
            frame = blender.blend(&frame, &part.frame)?;
            indices = merge_sorted(&part.indices, &indices);
            self.insert_entry(indices.clone(), frame.clone());
        }
        Ok(frame)
    }
}

/// `a` ⊆ `b`, both sorted.
fn is_subset(a: &[u64], b: &[u64]) -> bool {
    a.iter().all(|x| b.binary_search(x).is_ok())
}

fn merge_sorted(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] <= b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tlq_models::BlendMode;

    /// Keeps the first argument; only the bookkeeping is under test.
    struct KeepFirst;

    impl Blender for KeepFirst {
        fn blend(&self, a: &Frame, _b: &Frame) -> MediaResult<Frame> {
            Ok(a.clone())
        }
    }

    fn frame() -> Frame {
        Frame::filled(0, 1, 1, [0; 4])
    }

    fn cache_with(sets: &[&[u64]]) -> MergeCache {
        let mut cache = MergeCache::new();
        for set in sets {
            cache.insert_entry(set.to_vec(), frame());
        }
        cache
    }

    fn cover_sets(cache: &MergeCache, window: &[u64]) -> Vec<Vec<u64>> {
        cache
            .spanning_cover(window)
            .unwrap()
            .into_iter()
            .map(|i| cache.entries()[i].indices().to_vec())
            .collect()
    }

    #[test]
    fn test_cover_singletons() {
        let cache = cache_with(&[&[1], &[2], &[3]]);
        assert_eq!(cover_sets(&cache, &[1, 2, 3]), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_cover_prefers_larger() {
        let cache = cache_with(&[&[1], &[2, 3], &[3]]);
        assert_eq!(cover_sets(&cache, &[1, 2, 3]), vec![vec![1], vec![2, 3]]);
    }

    #[test]
    fn test_cover_even_larger() {
        let cache = cache_with(&[
            &[1],
            &[2],
            &[3],
            &[4],
            &[5],
            &[6],
            &[3, 4],
            &[2, 3, 4],
            &[5, 6],
        ]);
        assert_eq!(
            cover_sets(&cache, &[1, 2, 3, 4, 5, 6]),
            vec![vec![1], vec![2, 3, 4], vec![5, 6]]
        );
    }

    #[test]
    fn test_cover_with_skipped_members() {
        let cache = cache_with(&[&[1], &[2], &[3], &[4], &[2, 3], &[2, 3, 4], &[3, 4]]);
        assert_eq!(cover_sets(&cache, &[2, 4]), vec![vec![2], vec![4]]);
    }

    #[test]
    fn test_cover_tie_breaks_on_smallest_index() {
        let cache = cache_with(&[&[5, 6], &[3, 4], &[3], &[4], &[5], &[6]]);
        let cover = cache.spanning_cover(&[3, 4, 5, 6]).unwrap();
        // both pairs have size two; [3, 4] is chosen first
        assert_eq!(cache.entries()[cover[0]].indices(), &[3, 4]);
        assert_eq!(cover.len(), 2);
    }

    #[test]
    fn test_cover_missing_frame() {
        let cache = cache_with(&[&[1], &[2]]);
        assert!(matches!(
            cache.spanning_cover(&[1, 2, 3]),
            Err(MediaError::Internal(_))
        ));
    }

    #[test]
    fn test_generate_caches_intermediates() {
        let mut cache = cache_with(&[&[1], &[2], &[3], &[4]]);
        cache.generate(&[1, 2, 3, 4], &KeepFirst).unwrap();
        assert_eq!(
            cache.index_sets(),
            vec![
                vec![1],
                vec![2],
                vec![3],
                vec![4],
                vec![3, 4],
                vec![2, 3, 4],
                vec![1, 2, 3, 4],
            ]
        );
    }

    #[test]
    fn test_generate_reuses_previous_window() {
        let mut cache = cache_with(&[&[2], &[3], &[4], &[3, 4], &[2, 3, 4], &[5]]);
        cache.generate(&[2, 3, 4, 5], &KeepFirst).unwrap();
        assert_eq!(
            cache.index_sets(),
            vec![
                vec![2],
                vec![3],
                vec![4],
                vec![3, 4],
                vec![2, 3, 4],
                vec![5],
                vec![2, 3, 4, 5],
            ]
        );
    }

    #[test]
    fn test_generate_merges_from_the_back() {
        let mut cache = cache_with(&[&[4], &[5], &[6], &[5, 6], &[7]]);
        cache.generate(&[4, 5, 6, 7], &KeepFirst).unwrap();
        assert_eq!(
            cache.index_sets(),
            vec![
                vec![4],
                vec![5],
                vec![6],
                vec![5, 6],
                vec![7],
                vec![5, 6, 7],
                vec![4, 5, 6, 7],
            ]
        );
    }

    #[test]
    fn test_generate_single_entry_adds_nothing() {
        let mut cache = cache_with(&[&[1], &[2]]);
        cache.generate(&[2], &KeepFirst).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_generate_matches_naive_fold() {
        let values = [10u8, 200, 40, 90, 250, 3, 77];
        let mut cache = MergeCache::new();
        for (i, v) in values.iter().enumerate() {
            cache.insert(i as u64, Frame::filled(i as u64, 1, 1, [*v, 255 - *v, 0, 255]));
        }

        for start in 0..values.len() - 2 {
            let window: Vec<u64> = (start as u64..start as u64 + 3).collect();
            let out = cache.generate(&window, &BlendMode::Lighten).unwrap();
            let max = values[start..start + 3].iter().copied().max().unwrap();
            let min = values[start..start + 3].iter().copied().min().unwrap();
            assert_eq!(out.pixel(0, 0), [max, 255 - min, 0, 255]);
        }
    }

    #[test]
    fn test_evict_through() {
        let mut cache = cache_with(&[&[1], &[2], &[1, 2], &[2, 3], &[3]]);
        cache.evict_through(1);
        assert_eq!(cache.index_sets(), vec![vec![2], vec![2, 3], vec![3]]);
        cache.evict_through(5);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_merge_sorted_interleaves() {
        assert_eq!(merge_sorted(&[2, 4], &[3, 5]), vec![2, 3, 4, 5]);
        assert!(is_subset(&[2, 4], &[1, 2, 3, 4]));
        assert!(!is_subset(&[2, 5], &[1, 2, 3, 4]));
    }
}
