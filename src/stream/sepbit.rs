// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::StreamClassifier;
use crate::segment::{BlockKey, Segment, GC_STREAM_START};
use crate::HashMap;
use std::collections::VecDeque;

/// Collections of class-0 segments averaged per estimator refresh
const COLLECT_WINDOW: u32 = 16;

/// Bounded FIFO of recent writes, answering "how many writes ago was this
/// key last written"
///
/// The window shrinks to the current lifespan estimate, so only keys that
/// could still be classified hot are retained.
#[derive(Default)]
struct WriteFifo {
    queue: VecDeque<BlockKey>,
    position: HashMap<BlockKey, u64>,
    head: u64,
    tail: u64,
}

impl WriteFifo {
    fn update(&mut self, key: BlockKey, threshold: f64, valid_blocks: u64) {
        self.queue.push_back(key);
        self.position.insert(key, self.tail);
        self.tail += 1;

        #[allow(clippy::cast_precision_loss)]
        let limit = threshold.min(valid_blocks as f64);

        #[allow(clippy::cast_precision_loss)]
        if (self.tail - self.head) as f64 > limit {
            self.expire_one();

            #[allow(clippy::cast_precision_loss)]
            if (self.tail - self.head) as f64 > threshold {
                self.expire_one();
            }
        }
    }

    fn expire_one(&mut self) {
        if let Some(old) = self.queue.pop_front() {
            if self.position.get(&old) == Some(&self.head) {
                self.position.remove(&old);
            }
            self.head += 1;
        }
    }

    /// Writes since `key` was last written, if still inside the window.
    fn query(&self, key: BlockKey) -> Option<u64> {
        self.position.get(&key).map(|pos| self.tail - pos)
    }
}

/// SepBIT-style lifespan separation
///
/// A host block is hot iff its write-to-write lifespan undercuts the running
/// average lifespan of collected class-0 segments. GC appends are spread
/// over four cold classes by age relative to that average.
pub struct SepBit {
    avg_lifespan: f64,
    class_of_last_collected: i32,
    recent_writes: WriteFifo,

    /// Last write timestamp per block
    last_write_ts: HashMap<BlockKey, u64>,

    total_lifespan: u64,
    collect_count: u32,
}

impl Default for SepBit {
    fn default() -> Self {
        Self::new()
    }
}

impl SepBit {
    /// Creates a classifier with an unsettled lifespan estimate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            avg_lifespan: f64::INFINITY,
            class_of_last_collected: 0,
            recent_writes: WriteFifo::default(),
            last_write_ts: HashMap::default(),
            total_lifespan: 0,
            collect_count: 0,
        }
    }
}

impl StreamClassifier for SepBit {
    #[allow(clippy::cast_precision_loss)]
    fn classify(&mut self, key: BlockKey, is_gc: bool, now: u64, _prev_create_ts: u64) -> i32 {
        if !is_gc {
            return match self.recent_writes.query(key) {
                Some(lifespan) if (lifespan as f64) < self.avg_lifespan => 0,
                _ => 1,
            };
        }

        if self.class_of_last_collected == 0 {
            return GC_STREAM_START + 2;
        }

        let last_write = self.last_write_ts.get(&key).copied().unwrap_or(0);
        let age = now.saturating_sub(last_write) as f64;

        if age < 4.0 * self.avg_lifespan {
            GC_STREAM_START + 3
        } else if age < 16.0 * self.avg_lifespan {
            GC_STREAM_START + 4
        } else {
            GC_STREAM_START + 5
        }
    }

    fn on_append(&mut self, key: BlockKey, now: u64, segment_valid_blocks: u64) {
        self.recent_writes
            .update(key, self.avg_lifespan, segment_valid_blocks);
        self.last_write_ts.insert(key, now);
    }

    #[allow(clippy::cast_precision_loss)]
    fn on_segment_collected(&mut self, seg: &Segment, now: u64) {
        if seg.class_num == 0 {
            self.total_lifespan += seg.age(now);
            self.collect_count += 1;

            if self.collect_count == COLLECT_WINDOW {
                self.avg_lifespan = self.total_lifespan as f64 / f64::from(COLLECT_WINDOW);
                self.total_lifespan = 0;
                self.collect_count = 0;
            }
        }

        self.class_of_last_collected = seg.class_num;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::NO_TIMESTAMP;

    #[test]
    fn unknown_lifespan_is_cold() {
        let mut c = SepBit::new();
        assert_eq!(1, c.classify(7, false, 100, NO_TIMESTAMP));
    }

    #[test]
    fn short_lifespan_is_hot_once_average_settles() {
        let mut c = SepBit::new();

        // settle the average at a finite value via 16 class-0 collections
        let mut seg = crate::segment::Segment::new(0, 4);
        seg.class_num = 0;
        seg.create_ts = 0;
        for _ in 0..COLLECT_WINDOW {
            c.on_segment_collected(&seg, 1000);
        }
        assert!((c.avg_lifespan - 1000.0).abs() < f64::EPSILON);

        // key written twice in quick succession
        c.on_append(42, 1, 8);
        c.on_append(42, 2, 8);

        assert_eq!(0, c.classify(42, false, 3, 2));
    }

    #[test]
    fn gc_routing_follows_last_collected_class() {
        let mut c = SepBit::new();

        // last collected was class 0
        let mut seg = crate::segment::Segment::new(0, 4);
        seg.class_num = 0;
        c.on_segment_collected(&seg, 10);
        assert_eq!(GC_STREAM_START + 2, c.classify(1, true, 10, NO_TIMESTAMP));

        // after a non-zero collection, routing goes by age vs average
        seg.class_num = 1;
        c.on_segment_collected(&seg, 10);
        let class = c.classify(1, true, 10, NO_TIMESTAMP);
        assert!((GC_STREAM_START + 3..=GC_STREAM_START + 5).contains(&class));
    }
}
