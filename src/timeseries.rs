//! # Bounded Ring Buffer Module
//!
//! Generic bounded storage for sequential, time-tagged data. Every buffer in
//! the pipeline (the ECG buffer, the accelerometer alignment buffer, the HRV
//! sliding R-R window) is "insertion-ordered, bounded in count, oldest
//! evicted on overflow" — this module is the one place that owns that
//! behavior, so C1/C3/C4 never reimplement eviction.
//!
//! ## Architecture
//! `RingBuffer<T>` tracks a monotonic *global index* per element so that a
//! fiducial point or QT event can reference "sample 48213" and have that
//! reference become naturally unreferenced (not dangling — just no longer
//! resolvable) once the sample ages out of the window.
//!
//! ## Usage
//! Component-specific helpers (nearest-by-time lookup, RMSSD, etc.) build on
//! top of this generic storage; they do not live here.

use std::collections::VecDeque;

/// A bounded, insertion-ordered buffer. Pushing past `capacity` evicts the
/// oldest element. Every pushed element is assigned a monotonically
/// increasing global index, even after its slot has been evicted.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
    total_pushed: u64,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            total_pushed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Global index of the oldest element currently retained, or the index
    /// the next push will receive if the buffer is empty.
    pub fn oldest_global_index(&self) -> u64 {
        self.total_pushed - self.data.len() as u64
    }

    /// Total number of elements ever pushed (i.e. the global index the next
    /// push will receive).
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Push a new element, evicting the oldest if at capacity.
    /// Returns the global index assigned to the new element.
    pub fn push(&mut self, value: T) -> u64 {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        let index = self.total_pushed;
        self.data.push_back(value);
        self.total_pushed += 1;
        index
    }

    /// Look up an element by its global index. Returns `None` if the index
    /// was never assigned or has since been evicted.
    pub fn get_global(&self, global_index: u64) -> Option<&T> {
        if global_index < self.oldest_global_index() || global_index >= self.total_pushed {
            return None;
        }
        let local = (global_index - self.oldest_global_index()) as usize;
        self.data.get(local)
    }

    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.data.iter()
    }

    /// Borrow the most recent `n` elements as a contiguous slice. Costs a
    /// rotation the first time it's called after a wraparound push; amortized
    /// cheap for a buffer that's mostly appended-to and rarely indexed this way.
    pub fn make_contiguous(&mut self) -> &[T] {
        self.data.make_contiguous()
    }

    /// Borrow the trailing `n` elements as a contiguous slice (or fewer, if
    /// the buffer holds less than `n`).
    pub fn last_n_contiguous(&mut self, n: usize) -> &[T] {
        let slice = self.data.make_contiguous();
        let start = slice.len().saturating_sub(n);
        &slice[start..]
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Timestamped value, used by buffers that need nearest-by-time lookup
/// (the accelerometer alignment buffer in the motion canceller).
pub trait Timestamped {
    fn time_s(&self) -> f64;
}

impl<T: Timestamped> RingBuffer<T> {
    /// Find the element nearest in time to `target_time_s`, returning it
    /// along with the absolute time gap in seconds. Assumes timestamps are
    /// non-decreasing within the buffer (true for every stream in this
    /// pipeline) and uses a binary search accordingly.
    pub fn nearest_by_time(&self, target_time_s: f64) -> Option<(&T, f64)> {
        if self.data.is_empty() {
            return None;
        }

        // partition_point requires a contiguous or at-least-slice-like view;
        // VecDeque supports binary search directly via partition_point on an
        // iterator-derived index since 1.54 is not available, so walk the two
        // deque halves explicitly using a manual binary search over indices.
        let n = self.data.len();
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.data[mid].time_s() < target_time_s {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        let candidates = [lo.checked_sub(1), Some(lo).filter(|&i| i < n)];
        candidates
            .into_iter()
            .flatten()
            .map(|i| {
                let item = &self.data[i];
                (item, (item.time_s() - target_time_s).abs())
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tagged(f64);

    impl Timestamped for Tagged {
        fn time_s(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_push_and_len() {
        let mut buf = RingBuffer::new(3);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.last(), Some(&2));
    }

    #[test]
    fn test_eviction_beyond_capacity() {
        let mut buf = RingBuffer::new(3);
        for v in 0..5 {
            buf.push(v);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_global_index_tracks_through_eviction() {
        let mut buf = RingBuffer::new(3);
        for v in 0..5 {
            buf.push(v);
        }
        // indices 0,1 have been evicted
        assert_eq!(buf.get_global(0), None);
        assert_eq!(buf.get_global(1), None);
        assert_eq!(buf.get_global(2), Some(&2));
        assert_eq!(buf.get_global(4), Some(&4));
        assert_eq!(buf.oldest_global_index(), 2);
        assert_eq!(buf.total_pushed(), 5);
    }

    #[test]
    fn test_last_n_contiguous() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(10);
        for v in 0..7 {
            buf.push(v);
        }
        assert_eq!(buf.last_n_contiguous(3), &[4, 5, 6]);
        assert_eq!(buf.last_n_contiguous(100), &[0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_nearest_by_time() {
        let mut buf = RingBuffer::new(10);
        buf.push(Tagged(0.0));
        buf.push(Tagged(0.1));
        buf.push(Tagged(0.2));
        buf.push(Tagged(0.3));

        let (nearest, gap) = buf.nearest_by_time(0.19).unwrap();
        assert_eq!(nearest.0, 0.2);
        assert!((gap - 0.01).abs() < 1e-9);

        let (nearest, _) = buf.nearest_by_time(1.0).unwrap();
        assert_eq!(nearest.0, 0.3);

        let (nearest, _) = buf.nearest_by_time(-1.0).unwrap();
        assert_eq!(nearest.0, 0.0);
    }

    #[test]
    fn test_nearest_by_time_empty() {
        let buf: RingBuffer<Tagged> = RingBuffer::new(10);
        assert!(buf.nearest_by_time(0.0).is_none());
    }
}
