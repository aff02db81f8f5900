// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::cache::{LogCache, OutputSinks};
use crate::config::Config;
use crate::policy::{
    CostBenefitPolicy, FifoPolicy, FifoZeroPolicy, GcClock, GreedyPolicy, KthCostBenefitPolicy,
    LambdaPolicy, MultiQueuePolicy, ScoreFn, SelectiveFifoPolicy, SharedClock, VictimPolicy,
};
use crate::stream::{create_classifier, StreamClassifier};
use std::rc::Rc;

/// Default rank fraction of the k-th order-statistic compactor
const KTH_RANK: (usize, usize) = (30, 90);

/// Everything `batch_insert` needs, wired together by a policy preset
struct Preset {
    evictor: VictimPolicy,
    compactor: Option<VictimPolicy>,
    classifier: Option<Box<dyn StreamClassifier>>,

    /// Target valid ratio the preset ships with; the configured value
    /// wins if one was given
    target_valid_ratio: Option<f64>,
    additional_free_blks_ratio_by_gc: Option<f64>,
}

#[allow(clippy::too_many_lines)]
fn preset(name: &str, cfg: &Config, clock: &SharedClock) -> crate::Result<Preset> {
    let s = cfg.blocks_per_segment();
    let total_blocks = cfg.total_blocks();

    let plain = |evictor: VictimPolicy| Preset {
        evictor,
        compactor: None,
        classifier: None,
        target_valid_ratio: None,
        additional_free_blks_ratio_by_gc: None,
    };

    let cb = |score: ScoreFn| {
        VictimPolicy::CostBenefit(CostBenefitPolicy::new(score, clock.clone(), s))
    };

    Ok(match name {
        "fifo" => plain(VictimPolicy::Fifo(FifoPolicy::new())),
        "fifo_zero" => plain(VictimPolicy::FifoZero(FifoZeroPolicy::new())),
        "greedy" => plain(VictimPolicy::Greedy(GreedyPolicy::new())),
        "cost_benefit" => plain(cb(ScoreFn::AgeOverUtil)),
        "lambda" => plain(VictimPolicy::Lambda(LambdaPolicy::new(clock.clone(), s))),
        "selective_fifo" => plain(VictimPolicy::SelectiveFifo(SelectiveFifoPolicy::new(
            false, false, None,
        ))),
        "multi_queue" => plain(VictimPolicy::MultiQueue(MultiQueuePolicy::new(
            (total_blocks / 16).max(1),
        ))),

        "fifo_sepbit" | "greedy_sepbit" | "cost_benefit_sepbit" => {
            let evictor = match name {
                "fifo_sepbit" => VictimPolicy::Fifo(FifoPolicy::new()),
                "greedy_sepbit" => VictimPolicy::Greedy(GreedyPolicy::new()),
                _ => cb(ScoreFn::AgeOverUtil),
            };
            Preset {
                evictor,
                compactor: None,
                classifier: Some(create_classifier("sepbit", total_blocks, clock)?),
                target_valid_ratio: None,
                additional_free_blks_ratio_by_gc: None,
            }
        }

        "fifo_hotcold" | "greedy_hotcold" | "cost_benefit_hotcold" => {
            let evictor = match name {
                "fifo_hotcold" => VictimPolicy::Fifo(FifoPolicy::new()),
                "greedy_hotcold" => VictimPolicy::Greedy(GreedyPolicy::new()),
                _ => cb(ScoreFn::AgeOverUtil),
            };
            Preset {
                evictor,
                compactor: None,
                classifier: Some(create_classifier("hotcold", total_blocks, clock)?),
                target_valid_ratio: None,
                additional_free_blks_ratio_by_gc: None,
            }
        }

        "greedy_cost_benefit" => Preset {
            evictor: cb(ScoreFn::OldestFirst),
            compactor: Some(VictimPolicy::Greedy(GreedyPolicy::new())),
            classifier: Some(create_classifier("multi_hotcold", total_blocks, clock)?),
            target_valid_ratio: Some(0.93),
            additional_free_blks_ratio_by_gc: Some(0.7),
        },

        "kth_cost_benefit" => Preset {
            evictor: cb(ScoreFn::OldestFirst),
            compactor: Some(VictimPolicy::KthCostBenefit(KthCostBenefitPolicy::new(
                ScoreFn::NewestFull,
                KTH_RANK.0,
                KTH_RANK.1,
                clock.clone(),
                s,
            ))),
            classifier: None,
            target_valid_ratio: Some(0.93),
            additional_free_blks_ratio_by_gc: Some(0.7),
        },

        "hot_first_cost_benefit" | "cold_first_cost_benefit" | "warm_first_cost_benefit" => {
            let score = match name {
                "hot_first_cost_benefit" => ScoreFn::HotFirst,
                "cold_first_cost_benefit" => ScoreFn::ColdFirst,
                _ => ScoreFn::WarmFirst,
            };
            Preset {
                evictor: cb(ScoreFn::OldestFirst),
                compactor: Some(cb(score)),
                classifier: None,
                target_valid_ratio: Some(0.93),
                additional_free_blks_ratio_by_gc: Some(1.2),
            }
        }

        "greedy_selective_fifo" => Preset {
            evictor: VictimPolicy::SelectiveFifo(SelectiveFifoPolicy::new(false, false, None)),
            compactor: Some(VictimPolicy::Greedy(GreedyPolicy::new())),
            classifier: None,
            target_valid_ratio: Some(0.85),
            additional_free_blks_ratio_by_gc: None,
        },

        _ => {
            return Err(crate::Error::Config(format!(
                "unknown cache policy: {name}"
            )))
        }
    })
}

/// Builds a [`LogCache`] from a configuration and a policy preset name.
///
/// The preset's target valid ratio and GC headroom only apply when the
/// configuration left them at zero.
///
/// # Errors
///
/// Will return `Err(Config)` for unknown presets or inconsistent sizes.
pub fn build_cache(
    mut cfg: Config,
    policy_name: &str,
    sinks: OutputSinks,
) -> crate::Result<LogCache> {
    cfg.validate()?;

    let clock: SharedClock = Rc::new(GcClock::default());
    let preset = preset(policy_name, &cfg, &clock)?;

    if cfg.target_valid_ratio == 0.0 {
        if let Some(ratio) = preset.target_valid_ratio {
            cfg.target_valid_ratio = ratio;
        }
    }
    if cfg.additional_free_blks_ratio_by_gc == 0.0 {
        if let Some(ratio) = preset.additional_free_blks_ratio_by_gc {
            cfg.additional_free_blks_ratio_by_gc = ratio;
        }
    }

    log::info!(
        "Cache policy {policy_name}: target_valid_ratio={}, gc_headroom={}",
        cfg.target_valid_ratio,
        cfg.additional_free_blks_ratio_by_gc,
    );

    LogCache::new(
        cfg,
        clock,
        preset.evictor,
        preset.compactor,
        preset.classifier,
        sinks,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::new(4 * crate::config::DEFAULT_SEGMENT_BYTES, 1 << 30)
    }

    #[test]
    fn all_presets_build() {
        for name in [
            "fifo",
            "fifo_zero",
            "greedy",
            "cost_benefit",
            "lambda",
            "selective_fifo",
            "multi_queue",
            "fifo_sepbit",
            "greedy_sepbit",
            "cost_benefit_sepbit",
            "fifo_hotcold",
            "greedy_hotcold",
            "greedy_cost_benefit",
            "kth_cost_benefit",
            "hot_first_cost_benefit",
            "cold_first_cost_benefit",
            "warm_first_cost_benefit",
            "greedy_selective_fifo",
        ] {
            build_cache(base_config(), name, OutputSinks::default())
                .unwrap_or_else(|e| panic!("preset {name} failed: {e}"));
        }
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        let result = build_cache(base_config(), "nope", OutputSinks::default());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn preset_target_applies_when_unset() {
        let cache = build_cache(base_config(), "greedy_cost_benefit", OutputSinks::default())
            .unwrap();
        assert!((cache.target_valid_ratio() - 0.93).abs() < f64::EPSILON);

        let cache = build_cache(
            base_config().target_valid_ratio(0.5),
            "greedy_cost_benefit",
            OutputSinks::default(),
        )
        .unwrap();
        assert!((cache.target_valid_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
