// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::segment::BlockKey;
use crate::HashMap;
use std::collections::VecDeque;

/// Bounded FIFO of keys recently evicted from the cache
///
/// Not a real cache: it only answers "was this key evicted recently" and
/// counts its own overflow evictions, feeding the adaptive-threshold loop.
///
/// Removal is lazy: `access` drops the lookup entry, the queue entry stays
/// behind as a stale ticket and is skipped when it reaches the head.
#[allow(clippy::module_name_repetitions)]
pub struct GhostCache {
    capacity: usize,
    queue: VecDeque<(BlockKey, u64)>,

    /// key -> ticket of its newest queue entry
    lookup: HashMap<BlockKey, u64>,
    next_ticket: u64,
    evict_count: u64,
}

impl GhostCache {
    /// Creates a ghost cache holding up to `capacity` keys.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::new(),
            lookup: HashMap::default(),
            next_ticket: 0,
            evict_count: 0,
        }
    }

    /// Removes `key` if present; returns whether it was.
    pub fn access(&mut self, key: BlockKey) -> bool {
        self.lookup.remove(&key).is_some()
    }

    /// Inserts `key` at the tail, re-inserting if already present.
    ///
    /// Returns `true` if the key was already tracked.
    pub fn push(&mut self, key: BlockKey) -> bool {
        let was_present = self.lookup.remove(&key).is_some();

        self.queue.push_back((key, self.next_ticket));
        self.lookup.insert(key, self.next_ticket);
        self.next_ticket += 1;

        while self.lookup.len() > self.capacity {
            self.pop_oldest();
        }

        was_present
    }

    fn pop_oldest(&mut self) {
        while let Some((old, ticket)) = self.queue.pop_front() {
            if self.lookup.get(&old) == Some(&ticket) {
                self.lookup.remove(&old);
                self.evict_count += 1;
                return;
            }
            // stale ticket of a re-inserted or accessed key
        }
    }

    /// Amount of keys pushed out by capacity pressure.
    #[must_use]
    pub fn evict_count(&self) -> u64 {
        self.evict_count
    }

    /// Amount of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_overflow_counts_evictions() {
        let mut g = GhostCache::new(4);

        for key in 0..10u64 {
            g.push(key);
        }

        assert_eq!(4, g.len());
        assert_eq!(6, g.evict_count());
    }

    #[test]
    fn access_removes_without_counting() {
        let mut g = GhostCache::new(4);
        g.push(1);
        g.push(2);

        assert!(g.access(1));
        assert!(!g.access(1));
        assert_eq!(1, g.len());
        assert_eq!(0, g.evict_count());
    }

    #[test]
    fn reinsert_moves_to_tail() {
        let mut g = GhostCache::new(2);
        g.push(1);
        g.push(2);
        g.push(1); // 1 is now newest

        g.push(3); // overflow drops 2, not 1

        assert!(g.access(1));
        assert!(!g.access(2));
    }

    #[test]
    fn distinct_pushes_over_capacity() {
        let capacity = 8;
        let n = 100u64;
        let mut g = GhostCache::new(capacity);

        for key in 0..n {
            g.push(key);
        }

        assert_eq!(n - capacity as u64, g.evict_count());
    }
}
