// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::FifoQueue;
use crate::segment::{Segment, SegmentId};

/// Plain FIFO: the victim is the oldest closed segment
#[derive(Default)]
pub struct FifoPolicy {
    queue: FifoQueue,
}

impl FifoPolicy {
    /// Creates an empty FIFO policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, seg: &Segment) {
        self.queue.push_back(seg.id);
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        self.queue.remove(seg.id);
    }

    pub(crate) fn choose(&mut self) -> Option<SegmentId> {
        self.queue.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

/// FIFO with a fast path for segments that lost all their valid blocks
///
/// `choose` drains the zero-valid queue before touching the main queue.
#[derive(Default)]
pub struct FifoZeroPolicy {
    queue: FifoQueue,
    zero_queue: FifoQueue,
}

impl FifoZeroPolicy {
    /// Creates an empty FIFO-zero policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, seg: &Segment) {
        self.queue.remove(seg.id);
        self.zero_queue.remove(seg.id);

        if seg.valid_cnt == 0 {
            self.zero_queue.push_back(seg.id);
        } else {
            self.queue.push_back(seg.id);
        }
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        if !self.queue.remove(seg.id) {
            self.zero_queue.remove(seg.id);
        }
    }

    pub(crate) fn update(&mut self, seg: &Segment) {
        if seg.valid_cnt == 0 && self.queue.remove(seg.id) {
            self.zero_queue.push_back(seg.id);
        }
    }

    pub(crate) fn choose(&mut self) -> Option<SegmentId> {
        self.zero_queue.pop_front().or_else(|| self.queue.pop_front())
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len() + self.zero_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::store::SegmentStore;

    fn closed_segment(store: &mut SegmentStore, valid: usize) -> SegmentId {
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
        id
    }

    #[test]
    fn fifo_order_is_arrival_order() {
        let mut store = SegmentStore::new(3, 4);
        let mut p = FifoPolicy::new();

        let a = closed_segment(&mut store, 4);
        let b = closed_segment(&mut store, 4);
        let c = closed_segment(&mut store, 4);

        p.add(store.get(a));
        p.add(store.get(b));
        p.add(store.get(c));
        p.remove(store.get(b));

        assert_eq!(Some(a), p.choose());
        assert_eq!(Some(c), p.choose());
        assert_eq!(None, p.choose());
    }

    #[test]
    fn zero_valid_segments_drain_first() {
        let mut store = SegmentStore::new(3, 4);
        let mut p = FifoZeroPolicy::new();

        let a = closed_segment(&mut store, 4);
        let b = closed_segment(&mut store, 0);
        let c = closed_segment(&mut store, 2);

        p.add(store.get(a));
        p.add(store.get(b));
        p.add(store.get(c));

        assert_eq!(Some(b), p.choose());
        assert_eq!(Some(a), p.choose());
    }

    #[test]
    fn update_moves_drained_segment_to_zero_queue() {
        let mut store = SegmentStore::new(2, 4);
        let mut p = FifoZeroPolicy::new();

        let a = closed_segment(&mut store, 1);
        let b = closed_segment(&mut store, 4);

        p.add(store.get(a));
        p.add(store.get(b));

        store.set_slot_invalid(a, 0).unwrap();
        p.update(store.get(a));

        assert_eq!(Some(a), p.choose());
        assert_eq!(Some(b), p.choose());
    }
}
