mod common;

use common::{tiny_config, write_one};
use logcache_sim::{
    CostBenefitPolicy, GcClock, GreedyPolicy, LogCache, OutputSinks, ScoreFn, SharedClock,
    VictimPolicy,
};
use std::rc::Rc;
use test_log::test;

const INITIAL_TARGET: f64 = 0.3;

fn feedback_cache() -> logcache_sim::Result<LogCache> {
    let mut cfg = tiny_config(8, 8).target_valid_ratio(INITIAL_TARGET).ghost_cache(true);

    // short half-life so the rate estimators react within the test
    cfg.half_life_blocks = 256.0;
    cfg.ghost_capacity = Some(256);

    let clock: SharedClock = Rc::new(GcClock::default());
    let blocks = cfg.blocks_per_segment();

    let evictor = VictimPolicy::CostBenefit(CostBenefitPolicy::new(
        ScoreFn::OldestFirst,
        clock.clone(),
        blocks,
    ));
    let compactor = VictimPolicy::Greedy(GreedyPolicy::new());

    LogCache::new(
        cfg,
        clock,
        evictor,
        Some(compactor),
        None,
        OutputSinks::default(),
    )
}

/// A workload switching from purely cold to hot raises the target valid
/// ratio: evicted keys start returning, so keeping more of the cache live
/// would convert those evictions into hits.
#[test]
fn hot_switch_raises_the_target_valid_ratio() -> logcache_sim::Result<()> {
    let mut cache = feedback_cache()?;

    // phase 1: cold sequential flood, nothing ever comes back
    for key in 0..2_048u64 {
        write_one(&mut cache, key)?;
    }

    // phase 2: a working set slightly above capacity, cycled; every
    // evicted key is re-accessed before it ages out of the ghost cache
    for round in 0..40u64 {
        for key in 0..96u64 {
            write_one(&mut cache, 100_000 + key)?;
        }
        let _ = round;
    }

    let target = cache.target_valid_ratio();
    assert!(
        target >= INITIAL_TARGET + 0.1,
        "target never rose: {target:.3}",
    );

    cache.check_invariants()?;
    Ok(())
}

/// Without the ghost cache the target stays where it was configured.
#[test]
fn target_is_static_without_ghost_cache() -> logcache_sim::Result<()> {
    let cfg = tiny_config(8, 8).target_valid_ratio(0.5);
    let mut cache = logcache_sim::build_cache(cfg, "greedy_selective_fifo", OutputSinks::default())?;

    for key in 0..4_096u64 {
        write_one(&mut cache, key)?;
    }

    assert!((cache.target_valid_ratio() - 0.5).abs() < f64::EPSILON);
    Ok(())
}
