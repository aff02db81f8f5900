// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::config::Config;
use crate::ewma::EwmaRatio;
use crate::ftl::ColdTierFtl;
use crate::ghost::GhostCache;
use crate::histogram::Histogram;
use crate::index::LocationIndex;
use crate::policy::{SharedClock, VictimPolicy};
use crate::report::{CacheCounters, Sink};
use crate::segment::store::SegmentStore;
use crate::segment::{BlockKey, BlockSlot, SegmentId, GC_STREAM_START};
use crate::stream::StreamClassifier;
use crate::trace::OpType;
use crate::HashMap;
use std::collections::BTreeMap;
use std::io::Write;

/// Weight of the eviction-rate surplus in the adaptive comparison
const FEEDBACK_ALPHA: f64 = 6.73;

/// Step by which the target valid ratio moves per review
const TARGET_STEP: f64 = 0.02;

/// Reviews happen every `TARGET_REVIEW_PERIOD_SEGMENTS * S` appended blocks
const TARGET_REVIEW_PERIOD_SEGMENTS: u64 = 64;

/// One WAF log line per this many bytes written to the cache
const WAF_SAMPLE_BYTES: u64 = 10 * 1_024 * 1_024 * 1_024;

const HISTOGRAM_BUCKETS: usize = 20;

/// Output destinations; anything left `None` is silently discarded
#[derive(Default)]
pub struct OutputSinks {
    /// WAF samples, one line per 10 GiB of cache writes
    pub waf: Option<Sink>,

    /// Stats lines and histogram dumps
    pub stats: Option<Sink>,

    /// Mirror of every block accepted into the cache
    pub cache_trace: Option<Sink>,

    /// Mirror of every write/trim reaching the cold tier
    pub cold_trace: Option<Sink>,
}

/// Per-class totals at collection time, a test observation hook
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassCollection {
    /// Segments of this class collected so far
    pub segments: u64,

    /// Sum of their valid counts when chosen
    pub valid_blocks: u64,
}

/// Multi-stream append-only log cache over a cold-tier FTL
///
/// Writes append into per-stream active segments; GC either compacts live
/// blocks into fresh segments or evicts them down to the cold tier, steered
/// by the configured victim policies and, optionally, a ghost-cache
/// feedback loop that adapts the compaction/eviction split.
pub struct LogCache {
    cfg: Config,
    clock: SharedClock,

    store: SegmentStore,
    index: LocationIndex,

    /// Stream class -> active segment, host appends
    active: HashMap<i32, SegmentId>,

    /// Stream class -> active segment, GC-origin appends
    gc_active: HashMap<i32, SegmentId>,

    evictor: VictimPolicy,
    compactor: Option<VictimPolicy>,
    classifier: Option<Box<dyn StreamClassifier>>,

    ftl: ColdTierFtl,
    ghost: Option<GhostCache>,

    counters: CacheCounters,
    target_valid_ratio: f64,

    compaction_rate: EwmaRatio,
    eviction_rate: EwmaRatio,
    ghost_eviction_rate: EwmaRatio,

    next_waf_at: u64,
    next_stats_at: u64,
    next_rate_sample_at: u64,
    next_target_review_at: u64,

    evicted_ages: Histogram,
    evicted_segment_ages: Histogram,
    compacted_segment_ages: Histogram,
    evicted_per_victim: Histogram,
    compacted_per_victim: Histogram,
    collateral_groups: Histogram,

    collection_stats: HashMap<i32, ClassCollection>,

    stats_prefix: String,
    sinks: OutputSinks,

    total_blocks: u64,
    low_water: usize,
}

impl LogCache {
    /// Builds the cache from a validated configuration.
    ///
    /// The clock must be the same handle the policies were constructed
    /// with; the cache is its sole writer.
    ///
    /// # Errors
    ///
    /// Will return `Err(Config)` for inconsistent parameters.
    pub fn new(
        cfg: Config,
        clock: SharedClock,
        evictor: VictimPolicy,
        compactor: Option<VictimPolicy>,
        classifier: Option<Box<dyn StreamClassifier>>,
        sinks: OutputSinks,
    ) -> crate::Result<Self> {
        cfg.validate()?;

        let blocks_per_segment = cfg.blocks_per_segment();
        let segment_count = cfg.segment_count();
        let total_blocks = cfg.total_blocks();

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let low_water = (segment_count as f64 * cfg.free_ratio_low).ceil() as usize;

        log::info!(
            "Log cache: {segment_count} segments x {blocks_per_segment} blocks, low water {low_water}",
        );

        let ftl = ColdTierFtl::new(cfg.cold_capacity)?;

        #[allow(clippy::cast_possible_truncation)]
        let ghost = cfg.ghost_cache.then(|| {
            GhostCache::new(cfg.ghost_capacity.unwrap_or(total_blocks as usize))
        });

        let histo_sink = sinks
            .stats
            .clone()
            .unwrap_or_else(crate::report::null_sink);
        let age_granularity = blocks_per_segment as u64;

        let s = blocks_per_segment as u64;

        Ok(Self {
            store: SegmentStore::new(segment_count, blocks_per_segment),
            index: LocationIndex::default(),
            active: HashMap::default(),
            gc_active: HashMap::default(),
            evictor,
            compactor,
            classifier,
            ftl,
            ghost,
            counters: CacheCounters::default(),
            target_valid_ratio: cfg.target_valid_ratio,
            compaction_rate: EwmaRatio::from_half_life_blocks(cfg.half_life_blocks),
            eviction_rate: EwmaRatio::from_half_life_blocks(cfg.half_life_blocks),
            ghost_eviction_rate: EwmaRatio::from_half_life_blocks(cfg.half_life_blocks),
            next_waf_at: WAF_SAMPLE_BYTES,
            next_stats_at: cfg.segment_bytes,
            next_rate_sample_at: s,
            next_target_review_at: TARGET_REVIEW_PERIOD_SEGMENTS * s,
            evicted_ages: Histogram::new(
                "evicted_ages",
                age_granularity,
                HISTOGRAM_BUCKETS * 2,
                histo_sink.clone(),
            ),
            evicted_segment_ages: Histogram::new(
                "evicted_ages_with_segment",
                age_granularity,
                HISTOGRAM_BUCKETS * 2,
                histo_sink.clone(),
            ),
            compacted_segment_ages: Histogram::new(
                "compacted_ages_with_segment",
                age_granularity,
                HISTOGRAM_BUCKETS * 2,
                histo_sink.clone(),
            ),
            evicted_per_victim: Histogram::new(
                "evicted_blocks",
                400,
                HISTOGRAM_BUCKETS,
                histo_sink.clone(),
            ),
            compacted_per_victim: Histogram::new(
                "compacted_blocks",
                400,
                HISTOGRAM_BUCKETS,
                histo_sink.clone(),
            ),
            collateral_groups: Histogram::new(
                "evicted_cache_blocks_per_evict",
                1,
                HISTOGRAM_BUCKETS,
                histo_sink,
            ),
            collection_stats: HashMap::default(),
            stats_prefix: "stats".into(),
            sinks,
            clock,
            total_blocks,
            low_water,
            cfg,
        })
    }

    /// Returns `true` if the block currently resides in the cache.
    #[must_use]
    pub fn exists(&self, key: BlockKey) -> bool {
        self.index.contains(key)
    }

    /// Amount of blocks resident in the cache.
    #[must_use]
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Cache block size in bytes.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.cfg.block_size
    }

    /// Logical time, counted in host-appended blocks.
    #[must_use]
    pub fn logical_time(&self) -> u64 {
        self.clock.now()
    }

    /// Current adaptive compaction target.
    #[must_use]
    pub fn target_valid_ratio(&self) -> f64 {
        self.target_valid_ratio
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    /// The cold tier, for WAF inspection.
    #[must_use]
    pub fn cold_tier(&self) -> &ColdTierFtl {
        &self.ftl
    }

    /// Returns `true` once the free pool has dropped to the low-water mark.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.store.free_count() < self.low_water
    }

    /// Sets the prefix of stats log lines.
    pub fn set_stats_prefix(&mut self, prefix: &str) {
        self.stats_prefix = prefix.into();
    }

    /// Per-class collection totals (observation hook).
    #[doc(hidden)]
    #[must_use]
    pub fn collection_stats(&self) -> &HashMap<i32, ClassCollection> {
        &self.collection_stats
    }

    /// Accepts a batch of block-granular writes for one stream.
    ///
    /// Reads and empty batches are no-ops. Blocks are processed in key
    /// order; afterwards GC runs until the free pool recovers.
    ///
    /// # Errors
    ///
    /// Will return `Err(NoFreeSegment)` if GC cannot make progress, or any
    /// invariant/cold-tier error.
    pub fn batch_insert(
        &mut self,
        stream_id: i32,
        items: &BTreeMap<BlockKey, u32>,
        op: OpType,
    ) -> crate::Result<()> {
        if op != OpType::Write || items.is_empty() {
            return Ok(());
        }

        if let Some(limit) = self.cfg.bypass_batch_blocks {
            if items.len() >= limit {
                return self.bypass_batch(items);
            }
        }

        for (&key, &size) in items {
            self.periodic_feedback();

            if let Some(ghost) = &mut self.ghost {
                ghost.access(key);
            }

            let seg_id = if self.classifier.is_some() {
                self.segment_for_key(false, key)?
            } else {
                self.active_segment(false, stream_id)?
            };

            let seg_id = if self.store.get(seg_id).is_full() {
                self.close_and_reactivate(false, seg_id)?
            } else {
                seg_id
            };

            if self.index.contains(key) {
                self.counters.write_hit_size += u64::from(size);
            } else if u64::from(size) < u64::from(self.cfg.block_size) {
                // a partial write to an absent block forces a fill read
                self.counters.read_blocks_in_partial_write += 1;
            }

            self.invalidate(key, size)?;

            let now = self.clock.now();
            let seg = self.store.get_mut(seg_id);
            let slot_idx = seg.write_ptr;

            crate::error::invariant!(slot_idx < seg.slots.len(), "append into full segment", seg_id);

            #[allow(clippy::indexing_slicing)]
            {
                seg.slots[slot_idx] = BlockSlot {
                    key,
                    valid: true,
                    create_ts: now,
                };
            }
            seg.write_ptr += 1;
            seg.valid_cnt += 1;

            self.index.put(key, seg_id, slot_idx);
            self.counters.global_valid_blocks += 1;
            self.clock.set_now(now + 1);

            let segment_valid_blocks = self.store.get(seg_id).valid_cnt as u64;
            if let Some(classifier) = &mut self.classifier {
                classifier.on_append(key, self.clock.now(), segment_valid_blocks);
            }

            self.counters.write_size_to_cache += u64::from(size);

            if let Some(sink) = &self.sinks.cache_trace {
                let offset = key * u64::from(self.cfg.block_size);
                let _ = writeln!(sink.borrow_mut(), "0,W,{offset},{size},{now}");
            }

            self.emit_milestones();
        }

        self.run_gc()
    }

    /// Large batches skip the log entirely and stream to the cold tier.
    fn bypass_batch(&mut self, items: &BTreeMap<BlockKey, u32>) -> crate::Result<()> {
        log::debug!("Bypassing batch of {} blocks to cold tier", items.len());

        for (&key, &size) in items {
            self.counters.evicted_blocks += 1;
            self.ftl
                .write(key * u64::from(self.cfg.block_size), u64::from(size), 0)?;
            self.index.record_eviction(key, self.clock.now());
        }

        Ok(())
    }

    /// Drops the prior copy of `key`, wherever it lives.
    ///
    /// A key absent from the cache but present in the eviction ledger is a
    /// reinsertion: the cold-tier copy is trimmed.
    fn invalidate(&mut self, key: BlockKey, size: u32) -> crate::Result<()> {
        if let Some(loc) = self.index.get(key) {
            {
                let seg = self.store.get(loc.segment);

                #[allow(clippy::indexing_slicing)]
                let slot = &seg.slots[loc.slot];
                crate::error::invariant!(
                    slot.valid && slot.key == key,
                    "index points at dead slot",
                    loc.segment
                );
            }

            self.counters.invalidate_blocks += 1;
            self.store.set_slot_invalid(loc.segment, loc.slot)?;
            self.counters.global_valid_blocks -= 1;

            if self.is_closed(loc.segment) {
                self.policy_update(loc.segment);
            }

            self.index.erase(key);
        } else if self.index.take_eviction(key).is_some() {
            self.counters.reinsert_blocks += 1;

            let offset = key * u64::from(self.cfg.block_size);
            self.ftl.trim(offset, u64::from(size))?;

            if let Some(sink) = &self.sinks.cold_trace {
                let _ = writeln!(sink.borrow_mut(), "0,T,{offset},{size}");
            }
        }

        Ok(())
    }

    /// Resolves the active segment of a stream, allocating on demand.
    ///
    /// Stream ids below [`GC_STREAM_START`] are offset into the GC range
    /// when `gc` is set.
    fn active_segment(&mut self, gc: bool, stream_id: i32) -> crate::Result<SegmentId> {
        let mut class = stream_id;
        if gc && class < GC_STREAM_START {
            class += GC_STREAM_START;
        }

        self.lookup_or_activate(gc, class)
    }

    /// Resolves the active segment through the stream classifier.
    fn segment_for_key(&mut self, gc: bool, key: BlockKey) -> crate::Result<SegmentId> {
        let prev_create_ts = self
            .index
            .get(key)
            .map_or(crate::segment::NO_TIMESTAMP, |loc| {
                #[allow(clippy::indexing_slicing)]
                let slot = &self.store.get(loc.segment).slots[loc.slot];
                if slot.valid {
                    slot.create_ts
                } else {
                    crate::segment::NO_TIMESTAMP
                }
            });

        let now = self.clock.now();
        let class = self
            .classifier
            .as_mut()
            .map_or(0, |c| c.classify(key, gc, now, prev_create_ts));

        debug_assert!(
            (gc && class >= GC_STREAM_START) || (!gc && class < GC_STREAM_START),
            "classifier stream id out of partition"
        );

        self.lookup_or_activate(gc, class)
    }

    fn lookup_or_activate(&mut self, gc: bool, class: i32) -> crate::Result<SegmentId> {
        let table = if gc { &self.gc_active } else { &self.active };
        if let Some(&seg) = table.get(&class) {
            return Ok(seg);
        }

        // host allocations may shrink the pool first; GC allocations must
        // not re-enter the GC loop
        if !gc {
            self.run_gc()?;
        }

        let seg_id = self.store.allocate()?;
        {
            let now = self.clock.now();
            let seg = self.store.get_mut(seg_id);
            seg.create_ts = now;
            seg.class_num = class;
        }

        if gc {
            self.gc_active.insert(class, seg_id);
        } else {
            self.active.insert(class, seg_id);
        }

        Ok(seg_id)
    }

    /// Closes a full active segment and activates a fresh one for the same
    /// class.
    fn close_and_reactivate(&mut self, gc: bool, seg_id: SegmentId) -> crate::Result<SegmentId> {
        self.policy_add(seg_id);

        let class = self.store.get(seg_id).class_num;
        if gc {
            self.gc_active.remove(&class);
        } else {
            self.active.remove(&class);
        }

        self.active_segment(gc, class)
    }

    /// A segment is closed once it is full and off both active tables.
    ///
    /// Only closed segments are subject to policy updates; a full segment
    /// still sitting in an active table is closed at its next append.
    fn is_closed(&self, seg_id: SegmentId) -> bool {
        self.store.get(seg_id).is_full()
            && !self
                .active
                .values()
                .chain(self.gc_active.values())
                .any(|&seg| seg == seg_id)
    }

    fn policy_add(&mut self, seg_id: SegmentId) {
        let now = self.clock.now();
        let seg = self.store.get(seg_id);

        self.evictor.add(seg, now);
        if let Some(compactor) = &mut self.compactor {
            compactor.add(seg, now);
        }
    }

    fn policy_remove(&mut self, seg_id: SegmentId) {
        let seg = self.store.get(seg_id);

        self.evictor.remove(seg);
        if let Some(compactor) = &mut self.compactor {
            compactor.remove(seg);
        }
    }

    fn policy_update(&mut self, seg_id: SegmentId) {
        let seg = self.store.get(seg_id);

        self.evictor.update(seg);
        if let Some(compactor) = &mut self.compactor {
            compactor.update(seg);
        }
    }

    /// The GC loop: reclaims segments until the free pool recovers.
    ///
    /// Each round decides between compaction and eviction, based on how the
    /// live-block population compares against the target valid ratio.
    fn run_gc(&mut self) -> crate::Result<()> {
        while self.store.free_count() < self.low_water {
            let now = self.clock.now();

            #[allow(clippy::cast_precision_loss)]
            let below_target = self.target_valid_ratio * self.total_blocks as f64
                > self.counters.global_valid_blocks as f64;
            let maybe_compact =
                self.compactor.is_some() && self.target_valid_ratio >= 0.01 && below_target;

            let (victim, compact) = if maybe_compact {
                // probe the evictor's candidate for its age, then choose
                // the actual victim from the compactor
                let probe = self.evictor.choose(&self.store).ok_or(crate::Error::NoFreeSegment)?;
                let probe_age = self.store.get(probe).age(now);
                let threshold = probe_age + 1;
                self.clock.set_threshold(threshold);

                if self.cfg.additional_free_blks_ratio_by_gc >= 0.01 && probe_age >= threshold {
                    // candidate is already past the age window: evict it
                    (probe, false)
                } else {
                    self.evictor.add(self.store.get(probe), now);

                    let compactor = self
                        .compactor
                        .as_mut()
                        .expect("checked by maybe_compact");
                    let victim = compactor
                        .choose(&self.store)
                        .ok_or(crate::Error::NoFreeSegment)?;
                    (victim, true)
                }
            } else {
                let victim = self.evictor.choose(&self.store).ok_or(crate::Error::NoFreeSegment)?;
                self.clock.set_threshold(self.store.get(victim).age(now));
                (victim, false)
            };

            let (victim_class, victim_valid, victim_age) = {
                let seg = self.store.get(victim);
                (seg.class_num, seg.valid_cnt, seg.age(now))
            };

            // a fully valid victim cannot yield free space by compaction;
            // evicting it is the only way to keep the loop progressing
            let compact = compact && victim_valid < self.cfg.blocks_per_segment();

            {
                let entry = self.collection_stats.entry(victim_class).or_default();
                entry.segments += 1;
                entry.valid_blocks += victim_valid as u64;
            }

            if victim_valid == 0 {
                self.reset_segment(victim)?;
            } else if compact {
                log::trace!(
                    "Compacting segment {victim} (class {victim_class}, {victim_valid} valid, age {victim_age})",
                );
                self.compacted_segment_ages.inc(victim_age, 1);
                self.evict_and_compaction(victim, self.clock.threshold())?;
            } else {
                log::trace!(
                    "Evicting segment {victim} (class {victim_class}, {victim_valid} valid, age {victim_age})",
                );
                self.evicted_segment_ages.inc(victim_age, 1);
                self.evict_segment(victim)?;
            }

            self.notify_collection(victim)?;
        }

        Ok(())
    }

    /// Classifier bookkeeping after a victim was processed, including the
    /// drain of GC streams the classifier declares dead.
    fn notify_collection(&mut self, victim: SegmentId) -> crate::Result<()> {
        let Some(mut classifier) = self.classifier.take() else {
            return Ok(());
        };

        let now = self.clock.now();
        classifier.on_segment_collected(self.store.get(victim), now);

        let victim_stream = classifier.victim_stream(now, self.clock.threshold());
        self.classifier = Some(classifier);

        if let Some(stream) = victim_stream {
            if stream >= GC_STREAM_START {
                if let Some(&seg) = self.gc_active.get(&stream) {
                    log::debug!("Force-closing GC stream {stream} (segment {seg})");
                    self.dummy_fill_segment(seg);
                    self.gc_active.remove(&stream);
                }
            }
        }

        Ok(())
    }

    /// Pads a partially written segment with invalid slots and closes it.
    fn dummy_fill_segment(&mut self, seg_id: SegmentId) {
        {
            let seg = self.store.get_mut(seg_id);
            for idx in seg.write_ptr..seg.slots.len() {
                #[allow(clippy::indexing_slicing)]
                {
                    seg.slots[idx] = BlockSlot::default();
                }
            }
            seg.write_ptr = seg.slots.len();
        }

        self.policy_add(seg_id);
    }

    /// Migrates live blocks of `victim` into GC segments; blocks at or past
    /// the age threshold are evicted instead.
    fn evict_and_compaction(&mut self, victim: SegmentId, threshold: u64) -> crate::Result<()> {
        let mut evicted_for_victim = 0u64;
        let mut compacted_for_victim = 0u64;

        let victim_class = self.store.get(victim).class_num;
        let mut target = if self.classifier.is_none() {
            Some(self.active_segment(true, victim_class)?)
        } else {
            None
        };

        let slot_count = self.store.get(victim).slots.len();
        for idx in 0..slot_count {
            #[allow(clippy::indexing_slicing)]
            let slot = self.store.get(victim).slots[idx];
            if !slot.valid {
                continue;
            }

            let now = self.clock.now();
            if threshold > 0 && now.saturating_sub(slot.create_ts) >= threshold {
                self.evict_block(victim, idx)?;
                evicted_for_victim += 1;
                continue;
            }

            let mut dest = if self.classifier.is_some() {
                self.segment_for_key(true, slot.key)?
            } else {
                target.expect("pass-through target was resolved above")
            };

            if self.store.get(dest).is_full() {
                dest = self.close_and_reactivate(true, dest)?;
            }
            target = Some(dest);

            debug_assert_ne!(dest, victim, "compaction into the victim");

            {
                let dest_seg = self.store.get_mut(dest);

                // the destination inherits the age of its oldest block
                if dest_seg.create_ts > slot.create_ts {
                    dest_seg.create_ts = slot.create_ts;
                }

                let dest_idx = dest_seg.write_ptr;
                #[allow(clippy::indexing_slicing)]
                {
                    dest_seg.slots[dest_idx] = slot;
                }
                dest_seg.write_ptr += 1;
                dest_seg.valid_cnt += 1;

                self.index.put(slot.key, dest, dest_idx);
            }

            self.counters.compacted_blocks += 1;
            compacted_for_victim += 1;

            // the live copy moved, so the global count is unchanged
            self.store.set_slot_invalid(victim, idx)?;
        }

        self.reset_segment(victim)?;

        self.evicted_per_victim.inc(evicted_for_victim, 1);
        self.compacted_per_victim.inc(compacted_for_victim, 1);

        Ok(())
    }

    /// Surrenders every live block of `victim` to the cold tier.
    fn evict_segment(&mut self, victim: SegmentId) -> crate::Result<()> {
        let mut evicted_for_victim = 0u64;

        let slot_count = self.store.get(victim).slots.len();
        for idx in 0..slot_count {
            #[allow(clippy::indexing_slicing)]
            let valid = self.store.get(victim).slots[idx].valid;
            if !valid {
                continue;
            }

            self.evict_block(victim, idx)?;
            evicted_for_victim += 1;
        }

        self.reset_segment(victim)?;
        self.evicted_per_victim.inc(evicted_for_victim, 1);

        Ok(())
    }

    /// Evicts one block: writes its aligned window to the cold tier and
    /// invalidates every cached block the window covers.
    ///
    /// Collateral invalidations are not counted as evictions; the surface
    /// eviction accounts for the whole window.
    fn evict_block(&mut self, seg_id: SegmentId, slot_idx: usize) -> crate::Result<()> {
        #[allow(clippy::indexing_slicing)]
        let slot = self.store.get(seg_id).slots[slot_idx];
        let now = self.clock.now();
        let key = slot.key;

        let window = self.cfg.evicted_block_size;
        let window_start = key / window * window;
        let mut group_size = 1u64;

        for other in window_start..window_start + window {
            if other == key {
                continue;
            }

            if let Some(loc) = self.index.get(other) {
                self.store.set_slot_invalid(loc.segment, loc.slot)?;
                self.counters.global_valid_blocks -= 1;

                if self.is_closed(loc.segment) {
                    self.policy_update(loc.segment);
                }

                self.index.erase(other);
                group_size += 1;
            }
        }

        let block_size = u64::from(self.cfg.block_size);
        self.ftl
            .write(window_start * block_size, window * block_size, 0)?;

        if let Some(sink) = &self.sinks.cold_trace {
            let _ = writeln!(
                sink.borrow_mut(),
                "0,W,{},{}",
                window_start * block_size,
                window * block_size
            );
        }

        self.index.record_eviction(key, now);
        self.index.erase(key);
        self.store.set_slot_invalid(seg_id, slot_idx)?;
        self.counters.global_valid_blocks -= 1;
        self.counters.evicted_blocks += window;

        if let Some(ghost) = &mut self.ghost {
            ghost.push(key);
        }

        self.evicted_ages.inc(now.saturating_sub(slot.create_ts), 1);
        self.collateral_groups.inc(group_size, 1);
        self.emit_milestones();

        Ok(())
    }

    fn reset_segment(&mut self, seg_id: SegmentId) -> crate::Result<()> {
        self.policy_remove(seg_id);
        self.store.release(seg_id)
    }

    /// Refreshes the rate EWMAs every `S` appended blocks and reviews the
    /// target valid ratio every `64 * S`.
    #[allow(clippy::cast_precision_loss)]
    fn periodic_feedback(&mut self) {
        let now = self.clock.now();

        if now >= self.next_rate_sample_at {
            self.next_rate_sample_at += self.cfg.blocks_per_segment() as u64;

            self.compaction_rate
                .update_from_cumulative(self.counters.compacted_blocks as f64, now as f64);
            self.eviction_rate
                .update_from_cumulative(self.counters.evicted_blocks as f64, now as f64);

            let ghost_evictions = self.ghost.as_ref().map_or(0, GhostCache::evict_count);
            self.ghost_eviction_rate
                .update_from_cumulative(ghost_evictions as f64, now as f64);
        }

        if now >= self.next_target_review_at {
            self.next_target_review_at +=
                TARGET_REVIEW_PERIOD_SEGMENTS * self.cfg.blocks_per_segment() as u64;

            if self.ghost.is_none() {
                return;
            }

            let (Some(r_c), Some(r_e), Some(r_g)) = (
                self.compaction_rate.value(),
                self.eviction_rate.value(),
                self.ghost_eviction_rate.value(),
            ) else {
                return;
            };

            let valid_ratio = self.counters.global_valid_blocks as f64 / self.total_blocks as f64;

            // evictions the ghost cache would have absorbed dominate:
            // holding more live data converts them into hits
            self.target_valid_ratio = if FEEDBACK_ALPHA * (r_e - r_g) > r_c {
                (valid_ratio + TARGET_STEP).min(self.cfg.valid_ratio_hard_limit)
            } else {
                (valid_ratio - TARGET_STEP).max(0.0)
            };

            log::debug!(
                "Target review: r_c={r_c:.6} r_e={r_e:.6} r_g={r_g:.6} -> target {:.3}",
                self.target_valid_ratio,
            );
        }
    }

    /// Emits WAF and stats lines at their byte milestones.
    fn emit_milestones(&mut self) {
        while self.counters.write_size_to_cache >= self.next_waf_at {
            self.next_waf_at += WAF_SAMPLE_BYTES;

            if let Some(sink) = &self.sinks.waf {
                let _ = writeln!(
                    sink.borrow_mut(),
                    "{} {} {} {}",
                    self.counters.write_size_to_cache,
                    self.counters.evicted_blocks * u64::from(self.cfg.block_size),
                    self.ftl.host_bytes(),
                    self.ftl.nand_bytes(),
                );
            }
        }

        while self.counters.write_size_to_cache >= self.next_stats_at {
            self.next_stats_at += self.cfg.segment_bytes;
            self.print_stats();
        }
    }

    /// Writes one stats line to the stats sink.
    pub fn print_stats(&self) {
        let Some(sink) = &self.sinks.stats else {
            return;
        };

        let c = &self.counters;
        let _ = writeln!(
            sink.borrow_mut(),
            "{} invalidate_blocks: {} compacted_blocks: {} global_valid_blocks: {} \
             write_size_to_cache: {} evicted_blocks: {} write_hit_size: {} \
             total_cache_size: {} reinsert_blocks: {} read_blocks_in_partial_write: {}",
            self.stats_prefix,
            c.invalidate_blocks,
            c.compacted_blocks,
            c.global_valid_blocks,
            c.write_size_to_cache,
            c.evicted_blocks,
            c.write_hit_size,
            self.cfg.cache_bytes,
            c.reinsert_blocks,
            c.read_blocks_in_partial_write,
        );
    }

    /// Verifies the structural invariants; test hook.
    ///
    /// # Errors
    ///
    /// Will return `Err(InvariantViolation)` on the first inconsistency.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> crate::Result<()> {
        let valid_sum: usize = self.store.iter().map(|seg| seg.valid_cnt).sum();

        crate::error::invariant!(
            valid_sum == self.index.len(),
            "valid count sum diverged from index size"
        );
        crate::error::invariant!(
            valid_sum as u64 == self.counters.global_valid_blocks,
            "global valid counter diverged"
        );

        for seg in self.store.iter() {
            let counted = seg
                .slots
                .iter()
                .take(seg.write_ptr)
                .filter(|slot| slot.valid)
                .count();
            crate::error::invariant!(
                counted == seg.valid_cnt,
                "per-segment valid count diverged",
                seg.id
            );
        }

        for seg in self.store.iter() {
            for (idx, slot) in seg.slots.iter().enumerate().take(seg.write_ptr) {
                if !slot.valid {
                    continue;
                }
                let loc = self.index.get(slot.key);
                crate::error::invariant!(
                    loc == Some(crate::index::Location {
                        segment: seg.id,
                        slot: idx
                    }),
                    "valid slot not indexed",
                    seg.id
                );
            }
        }

        Ok(())
    }
}
