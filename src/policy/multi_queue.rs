// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::FifoQueue;
use crate::segment::{Segment, SegmentId};
use crate::HashMap;

const QUEUE_COUNT: usize = 16;

/// Age-bucketed FIFO queues
///
/// A segment lands in bucket `age / age_granularity` at registration time;
/// `choose` scans from the oldest bucket down.
pub struct MultiQueuePolicy {
    queues: Vec<FifoQueue>,
    bucket_of: HashMap<SegmentId, usize>,
    age_granularity: u64,
}

impl MultiQueuePolicy {
    /// Creates age buckets of the given width in blocks.
    #[must_use]
    pub fn new(age_granularity: u64) -> Self {
        Self {
            queues: (0..QUEUE_COUNT).map(|_| FifoQueue::default()).collect(),
            bucket_of: HashMap::default(),
            age_granularity,
        }
    }

    fn bucket(&self, age: u64) -> usize {
        if self.age_granularity == 0 {
            return 0;
        }
        // NOTE: Truncation is OK after the min()
        #[allow(clippy::cast_possible_truncation)]
        ((age / self.age_granularity) as usize).min(QUEUE_COUNT - 1)
    }

    pub(crate) fn add(&mut self, seg: &Segment, now: u64) {
        let bucket = self.bucket(seg.age(now));

        if let Some(old) = self.bucket_of.insert(seg.id, bucket) {
            #[allow(clippy::indexing_slicing)]
            self.queues[old].remove(seg.id);
        }

        #[allow(clippy::indexing_slicing)]
        self.queues[bucket].push_back(seg.id);
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        if let Some(bucket) = self.bucket_of.remove(&seg.id) {
            #[allow(clippy::indexing_slicing)]
            self.queues[bucket].remove(seg.id);
        }
    }

    pub(crate) fn update(&mut self, _seg: &Segment) {}

    pub(crate) fn choose(&mut self) -> Option<SegmentId> {
        for bucket in (0..QUEUE_COUNT).rev() {
            #[allow(clippy::indexing_slicing)]
            if let Some(seg) = self.queues[bucket].pop_front() {
                self.bucket_of.remove(&seg);
                return Some(seg);
            }
        }
        None
    }

    pub(crate) fn len(&self) -> usize {
        self.bucket_of.len()
    }
}
