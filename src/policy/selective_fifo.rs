// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::FifoQueue;
use crate::segment::store::SegmentStore;
use crate::segment::{Segment, SegmentId, GC_STREAM_START};
use crate::HashMap;

/// Host plus GC stream classes
const QUEUE_COUNT: usize = (GC_STREAM_START * 2) as usize;

/// Head segments denser than this are rotated back in GC mode
const DENSE_CUTOFF: f64 = 0.85;

/// One FIFO queue per stream class, scanned in a configurable order
///
/// Forward order walks from the highest class downwards; reverse order from
/// class 0 upwards, optionally through an explicit class sequence. In GC
/// mode a head segment that is still mostly valid rotates to the tail and
/// the scan retries, bounded by one full pass per queue.
pub struct SelectiveFifoPolicy {
    queues: Vec<FifoQueue>,
    class_of: HashMap<SegmentId, usize>,
    reverse: bool,
    gc_mode: bool,
    sequence: Option<Vec<usize>>,
}

impl SelectiveFifoPolicy {
    /// Creates per-class queues with the given scan configuration.
    #[must_use]
    pub fn new(reverse: bool, gc_mode: bool, sequence: Option<Vec<usize>>) -> Self {
        Self {
            queues: (0..QUEUE_COUNT).map(|_| FifoQueue::default()).collect(),
            class_of: HashMap::default(),
            reverse,
            gc_mode,
            sequence,
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn class_index(seg: &Segment) -> usize {
        debug_assert!(seg.class_num >= 0 && (seg.class_num as usize) < QUEUE_COUNT);
        (seg.class_num as usize).min(QUEUE_COUNT - 1)
    }

    pub(crate) fn add(&mut self, seg: &Segment) {
        let class = Self::class_index(seg);

        if let Some(old) = self.class_of.insert(seg.id, class) {
            #[allow(clippy::indexing_slicing)]
            self.queues[old].remove(seg.id);
        }

        #[allow(clippy::indexing_slicing)]
        self.queues[class].push_back(seg.id);
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        if let Some(class) = self.class_of.remove(&seg.id) {
            #[allow(clippy::indexing_slicing)]
            self.queues[class].remove(seg.id);
        }
    }

    pub(crate) fn update(&mut self, _seg: &Segment) {}

    fn pop_from(&mut self, class: usize, store: &SegmentStore) -> Option<SegmentId> {
        #[allow(clippy::indexing_slicing)]
        let queue = &mut self.queues[class];

        if !self.gc_mode {
            let seg = queue.pop_front()?;
            self.class_of.remove(&seg);
            return Some(seg);
        }

        // bounded pass: every rotation shrinks the budget, so a queue of
        // dense-only segments is eventually skipped
        let mut budget = queue.len();
        while budget > 0 {
            let head = queue.front()?;

            if store.get(head).utilization() > DENSE_CUTOFF {
                queue.pop_front();
                queue.push_back(head);
                budget -= 1;
                continue;
            }

            queue.pop_front();
            self.class_of.remove(&head);
            return Some(head);
        }

        None
    }

    pub(crate) fn choose(&mut self, store: &SegmentStore) -> Option<SegmentId> {
        if self.reverse {
            let order: Vec<usize> = match (&self.sequence, self.gc_mode) {
                (Some(seq), false) => seq.clone(),
                _ => (0..QUEUE_COUNT).collect(),
            };

            for class in order {
                if class >= QUEUE_COUNT {
                    continue;
                }
                if let Some(seg) = self.pop_from(class, store) {
                    return Some(seg);
                }
            }
        } else {
            for class in (0..QUEUE_COUNT).rev() {
                if let Some(seg) = self.pop_from(class, store) {
                    return Some(seg);
                }
            }
        }

        None
    }

    pub(crate) fn len(&self) -> usize {
        self.class_of.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(store: &mut SegmentStore, class: i32, valid: usize) -> SegmentId {
        let id = store.allocate().unwrap();
        let blocks = store.blocks_per_segment();
        let seg = store.get_mut(id);

        for i in 0..blocks {
            seg.slots[i] = crate::segment::BlockSlot {
                key: i as u64,
                valid: i < valid,
                create_ts: 0,
            };
        }
        seg.write_ptr = blocks;
        seg.valid_cnt = valid;
        seg.class_num = class;
        id
    }

    #[test]
    fn forward_scan_prefers_higher_class() {
        let mut store = SegmentStore::new(2, 8);
        let mut p = SelectiveFifoPolicy::new(false, false, None);

        let low = closed(&mut store, 0, 4);
        let high = closed(&mut store, 3, 4);

        p.add(store.get(low));
        p.add(store.get(high));

        assert_eq!(Some(high), p.choose(&store));
        assert_eq!(Some(low), p.choose(&store));
    }

    #[test]
    fn reverse_scan_follows_explicit_sequence() {
        let mut store = SegmentStore::new(2, 8);
        let mut p = SelectiveFifoPolicy::new(true, false, Some(vec![2, 0]));

        let zero = closed(&mut store, 0, 4);
        let two = closed(&mut store, 2, 4);

        p.add(store.get(zero));
        p.add(store.get(two));

        assert_eq!(Some(two), p.choose(&store));
        assert_eq!(Some(zero), p.choose(&store));
    }

    #[test]
    fn gc_mode_rotates_dense_heads() {
        let mut store = SegmentStore::new(3, 8);
        let mut p = SelectiveFifoPolicy::new(true, true, None);

        let dense = closed(&mut store, 0, 8);
        let sparse = closed(&mut store, 0, 2);

        p.add(store.get(dense));
        p.add(store.get(sparse));

        // dense head rotates away, sparse is taken
        assert_eq!(Some(sparse), p.choose(&store));

        // only the dense one is left; the bounded pass gives up on it
        assert_eq!(None, p.choose(&store));
        assert_eq!(1, p.len());
    }
}
