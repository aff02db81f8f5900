// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::StreamClassifier;
use crate::policy::SharedClock;
use crate::segment::{BlockKey, Segment, GC_STREAM_START, NO_TIMESTAMP};
use crate::HashMap;

/// Multi-class age-bucket classifier
///
/// GC appends are bucketed by block age (or by raw creation timestamp when
/// `check_created_only` is set) into `max_gc_streams` classes. Host appends
/// either collapse into hot/cold around the age threshold the GC loop
/// publishes, or all land in class 0.
pub struct MultiHotCold {
    max_gc_streams: i32,
    granularity: u64,
    check_created_only: bool,
    classify_host: bool,
    classify_gc: bool,

    /// Oldest creation timestamp seen per GC bucket, for victim-stream drain
    oldest_ts: HashMap<i32, u64>,
    clock: SharedClock,
}

impl MultiHotCold {
    /// Creates a classifier over `max_gc_streams` age buckets.
    #[must_use]
    pub fn new(
        max_gc_streams: i32,
        granularity: u64,
        check_created_only: bool,
        classify_host: bool,
        classify_gc: bool,
        clock: SharedClock,
    ) -> Self {
        Self {
            max_gc_streams,
            granularity: granularity.max(1),
            check_created_only,
            classify_host,
            classify_gc,
            oldest_ts: HashMap::default(),
            clock,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn bucket(&self, now: u64, created_ts: u64) -> i32 {
        let diff = if self.check_created_only {
            created_ts
        } else {
            now.saturating_sub(created_ts)
        };

        let mut bucket = (diff / self.granularity) as i32;
        if bucket >= self.max_gc_streams {
            bucket = if self.check_created_only {
                bucket % self.max_gc_streams
            } else {
                self.max_gc_streams - 1
            };
        }
        bucket
    }
}

impl StreamClassifier for MultiHotCold {
    #[allow(clippy::cast_precision_loss)]
    fn classify(&mut self, _key: BlockKey, is_gc: bool, now: u64, prev_create_ts: u64) -> i32 {
        if !is_gc {
            if self.classify_host && !self.classify_gc {
                // dynamic two-class split around the published threshold
                if prev_create_ts == NO_TIMESTAMP {
                    return 1;
                }
                let age = now.saturating_sub(prev_create_ts) as f64;
                return i32::from(age >= self.clock.threshold() as f64 * 0.3);
            }
            if !self.classify_host {
                return 0;
            }
        } else if !self.classify_gc {
            return GC_STREAM_START;
        }

        let bucket = self.bucket(now, prev_create_ts);

        self.oldest_ts
            .entry(bucket)
            .and_modify(|oldest| *oldest = (*oldest).min(prev_create_ts))
            .or_insert(prev_create_ts);

        bucket + GC_STREAM_START
    }

    fn on_segment_collected(&mut self, _seg: &Segment, _now: u64) {}

    fn victim_stream(&mut self, now: u64, threshold: u64) -> Option<i32> {
        if !self.check_created_only {
            return None;
        }

        for bucket in 0..self.max_gc_streams {
            let Some(&oldest) = self.oldest_ts.get(&bucket) else {
                continue;
            };

            if now.saturating_sub(oldest) >= threshold {
                self.oldest_ts.remove(&bucket);
                return Some(bucket + GC_STREAM_START);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::GcClock;
    use std::rc::Rc;

    fn classifier(check_created_only: bool) -> MultiHotCold {
        MultiHotCold::new(
            4,
            100,
            check_created_only,
            false,
            true,
            Rc::new(GcClock::default()),
        )
    }

    #[test]
    fn gc_appends_bucket_by_age() {
        let mut c = classifier(false);

        assert_eq!(GC_STREAM_START, c.classify(1, true, 1000, 950));
        assert_eq!(GC_STREAM_START + 2, c.classify(1, true, 1000, 750));
        // clamped to the last bucket
        assert_eq!(GC_STREAM_START + 3, c.classify(1, true, 1000, 0));
    }

    #[test]
    fn host_appends_default_to_class_zero() {
        let mut c = classifier(false);
        assert_eq!(0, c.classify(1, false, 1000, 10));
    }

    #[test]
    fn victim_stream_drains_expired_buckets() {
        let mut c = classifier(true);

        let class = c.classify(1, true, 1000, 50);
        assert!(class >= GC_STREAM_START);

        assert_eq!(None, c.victim_stream(1000, 10_000));
        assert_eq!(Some(class), c.victim_stream(20_000, 10_000));
        // bucket was consumed
        assert_eq!(None, c.victim_stream(20_000, 10_000));
    }
}
