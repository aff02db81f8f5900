// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod hot_cold;
pub mod multi_hot_cold;
pub mod sepbit;

use crate::policy::SharedClock;
use crate::segment::{BlockKey, Segment};

pub use hot_cold::HotCold;
pub use multi_hot_cold::MultiHotCold;
pub use sepbit::SepBit;

/// Routes appends to stream classes so blocks with similar lifetimes share
/// segments
///
/// Host appends must classify into `[0, GC_STREAM_START)`, GC appends into
/// `[GC_STREAM_START, ..)`. `prev_create_ts` is [`crate::segment::NO_TIMESTAMP`]
/// when no prior valid copy exists.
pub trait StreamClassifier {
    /// Picks the stream class for a block about to be appended.
    fn classify(&mut self, key: BlockKey, is_gc: bool, now: u64, prev_create_ts: u64) -> i32;

    /// Called after every host append so estimators can track write history.
    fn on_append(&mut self, _key: BlockKey, _now: u64, _segment_valid_blocks: u64) {}

    /// Called when GC collects a segment (evicted or compacted).
    fn on_segment_collected(&mut self, _seg: &Segment, _now: u64) {}

    /// Declares a GC stream whose active segment should be force-closed.
    fn victim_stream(&mut self, _now: u64, _threshold: u64) -> Option<i32> {
        None
    }
}

/// Builds a classifier by its configuration name.
///
/// `total_blocks` sizes the age buckets of the multi-class variants.
///
/// # Errors
///
/// Will return `Err(Config)` for an unknown name.
pub fn create_classifier(
    name: &str,
    total_blocks: u64,
    clock: &SharedClock,
) -> crate::Result<Box<dyn StreamClassifier>> {
    match name {
        "sepbit" => Ok(Box::new(SepBit::new())),
        "hotcold" => Ok(Box::new(HotCold::new(hot_cold::DEFAULT_HOT_WINDOW))),
        "multi_hotcold" => Ok(Box::new(MultiHotCold::new(
            8,
            (total_blocks / 8).max(1),
            false,
            false,
            true,
            clock.clone(),
        ))),
        "multi_hotcold_create_timestamp_only" => Ok(Box::new(MultiHotCold::new(
            8,
            (total_blocks / 8).max(1),
            true,
            false,
            true,
            clock.clone(),
        ))),
        "multi_hotcold_two_class" => Ok(Box::new(MultiHotCold::new(
            8,
            (total_blocks / 8).max(1),
            false,
            true,
            false,
            clock.clone(),
        ))),
        _ => Err(crate::Error::Config(format!(
            "unknown stream classifier: {name}"
        ))),
    }
}
