// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Trace-driven simulator for a log-structured write cache.
//!
//! The cache accepts block writes into segmented, append-only storage in
//! front of a slower, capacity-oriented cold tier. Segments fill up, close,
//! and eventually get garbage collected: live blocks are either *compacted*
//! into fresh segments or *evicted* down to the cold tier, which is itself
//! modeled as a page-mapping FTL so end-to-end write amplification
//! (host -> cache -> cold-tier NAND) is measurable.
//!
//! Victim selection is pluggable ([`VictimPolicy`]): FIFO variants, greedy,
//! several cost-benefit flavors, per-stream and age-bucketed queues. An
//! optional [`StreamClassifier`] routes appends to per-stream active
//! segments by predicted lifetime, and a ghost cache drives an adaptive
//! loop that trades compaction against eviction.
//!
//! ```
//! use logcache_sim::{Config, OutputSinks, OpType};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> logcache_sim::Result<()> {
//! let config = Config::new(
//!     4 * 32 * 1024 * 1024, // 4 segments
//!     1 << 30,              // 1 GiB cold tier
//! );
//!
//! let mut cache = logcache_sim::build_cache(config, "greedy", OutputSinks::default())?;
//!
//! let batch: BTreeMap<u64, u32> = (0..64).map(|key| (key, 4096)).collect();
//! cache.batch_insert(0, &batch, OpType::Write)?;
//!
//! assert_eq!(64, cache.size());
//! # Ok(())
//! # }
//! ```
//!
//! The simulator is single-threaded and in-memory; there is no durability,
//! no crash recovery and no real device I/O.

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

mod cache;
mod config;
mod error;
mod ewma;
mod ftl;
mod ghost;
mod histogram;
mod index;
mod policy;
mod report;
mod segment;
mod setup;
mod stream;
mod trace;

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, xxhash_rust::xxh3::Xxh3Builder>;

pub use {
    cache::{ClassCollection, LogCache, OutputSinks},
    config::Config,
    error::{Error, Result},
    ewma::{Ewma, EwmaRatio},
    ftl::{ColdTierFtl, NAND_BLOCK_SIZE, NAND_PAGE_SIZE},
    ghost::GhostCache,
    histogram::Histogram,
    policy::{
        CostBenefitPolicy, FifoPolicy, FifoZeroPolicy, GcClock, GreedyPolicy,
        KthCostBenefitPolicy, LambdaPolicy, MultiQueuePolicy, ScoreFn, SelectiveFifoPolicy,
        SharedClock, VictimPolicy,
    },
    report::{sink, CacheCounters, Sink},
    segment::{BlockKey, BlockSlot, Segment, SegmentId, GC_STREAM_START, MAX_STREAMS, NO_TIMESTAMP},
    setup::build_cache,
    stream::{create_classifier, HotCold, MultiHotCold, SepBit, StreamClassifier},
    trace::{OpType, Record, TraceFormat, TraceReader},
};

#[doc(hidden)]
pub use {
    index::{Location, LocationIndex},
    report::{buffer_sink, null_sink, shared_buffer},
    segment::store::SegmentStore,
};
