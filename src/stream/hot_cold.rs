// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::StreamClassifier;
use crate::segment::{BlockKey, GC_STREAM_START, NO_TIMESTAMP};

/// 16 GiB worth of 4 KiB blocks
pub const DEFAULT_HOT_WINDOW: u64 = 16 * 1024 * 1024 / 4;

/// Two-class classifier: a block overwritten within the hot window is hot
pub struct HotCold {
    hot_window: u64,
}

impl HotCold {
    /// Creates a classifier with the given hot window in blocks.
    #[must_use]
    pub fn new(hot_window: u64) -> Self {
        Self { hot_window }
    }

    fn partition(&self, now: u64, prev_create_ts: u64) -> i32 {
        if prev_create_ts != NO_TIMESTAMP && now.saturating_sub(prev_create_ts) <= self.hot_window
        {
            0
        } else {
            1
        }
    }
}

impl StreamClassifier for HotCold {
    fn classify(&mut self, _key: BlockKey, is_gc: bool, now: u64, prev_create_ts: u64) -> i32 {
        let class = self.partition(now, prev_create_ts);

        if is_gc {
            class + GC_STREAM_START
        } else {
            class
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_overwrite_is_hot() {
        let mut c = HotCold::new(100);

        assert_eq!(0, c.classify(1, false, 1000, 950));
        assert_eq!(1, c.classify(1, false, 1000, 10));
        assert_eq!(1, c.classify(1, false, 1000, NO_TIMESTAMP));
    }

    #[test]
    fn gc_appends_use_offset_partition() {
        let mut c = HotCold::new(100);

        assert_eq!(GC_STREAM_START, c.classify(1, true, 1000, 950));
        assert_eq!(GC_STREAM_START + 1, c.classify(1, true, 1000, 10));
    }
}
