mod common;

use common::{tiny_config, BLOCK};
use logcache_sim::{OpType, OutputSinks};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use test_log::test;

/// Random mixed workload; structural invariants must hold after every batch.
fn churn(policy: &str, seed: u64) -> logcache_sim::Result<()> {
    // classifier-routed compaction can keep one active segment per GC
    // stream, so the pool must comfortably exceed the stream count
    let mut cache = logcache_sim::build_cache(tiny_config(32, 8), policy, OutputSinks::default())?;
    let mut rng = StdRng::seed_from_u64(seed);

    for batch_no in 0..400 {
        let len = rng.gen_range(1..16);
        let mut batch = BTreeMap::new();

        for _ in 0..len {
            let key = if rng.gen_bool(0.6) {
                rng.gen_range(0..64u64) // hot
            } else {
                rng.gen_range(64..4_096u64) // cold
            };
            // occasionally a partial write
            let size = if rng.gen_bool(0.1) { 1_024 } else { BLOCK };
            batch.insert(key, size);
        }

        let op = if rng.gen_bool(0.05) {
            OpType::Read
        } else {
            OpType::Write
        };
        cache.batch_insert(0, &batch, op)?;

        if batch_no % 10 == 0 {
            cache.check_invariants()?;
        }
    }

    cache.check_invariants()?;

    let counters = cache.counters();
    assert_eq!(counters.global_valid_blocks as usize, cache.size());
    assert!(cache.cold_tier().nand_pages() >= cache.cold_tier().host_pages());

    Ok(())
}

#[test]
fn invariants_hold_under_fifo() -> logcache_sim::Result<()> {
    churn("fifo", 1)
}

#[test]
fn invariants_hold_under_fifo_zero() -> logcache_sim::Result<()> {
    churn("fifo_zero", 2)
}

#[test]
fn invariants_hold_under_greedy() -> logcache_sim::Result<()> {
    churn("greedy", 3)
}

#[test]
fn invariants_hold_under_cost_benefit() -> logcache_sim::Result<()> {
    churn("cost_benefit", 4)
}

#[test]
fn invariants_hold_under_lambda() -> logcache_sim::Result<()> {
    churn("lambda", 5)
}

#[test]
fn invariants_hold_under_multi_queue() -> logcache_sim::Result<()> {
    churn("multi_queue", 6)
}

#[test]
fn invariants_hold_under_greedy_cost_benefit() -> logcache_sim::Result<()> {
    churn("greedy_cost_benefit", 7)
}

#[test]
fn invariants_hold_under_sepbit() -> logcache_sim::Result<()> {
    churn("greedy_sepbit", 8)
}

#[test]
fn invariants_hold_with_an_eviction_window() -> logcache_sim::Result<()> {
    let cfg = tiny_config(8, 8).evicted_block_size(4);
    let mut cache = logcache_sim::build_cache(cfg, "greedy", OutputSinks::default())?;
    let mut rng = StdRng::seed_from_u64(9);

    for _ in 0..300 {
        let mut batch = BTreeMap::new();
        for _ in 0..rng.gen_range(1..12) {
            batch.insert(rng.gen_range(0..1_024u64), BLOCK);
        }
        cache.batch_insert(0, &batch, OpType::Write)?;
        cache.check_invariants()?;
    }

    // collateral invalidations never count as evictions
    assert_eq!(0, cache.counters().evicted_blocks % 4);
    Ok(())
}
