// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

const EPS_TINY: f64 = 1e-12;
const PROD_FLOOR: f64 = 1e-15;

/// Exponentially weighted moving average over logical-block time
///
/// The smoothing factor is derived from a half-life expressed in appended
/// blocks: `alpha = 1 - exp(-ln2 * delta / half_life)`.
#[derive(Clone, Debug)]
pub struct Ewma {
    alpha: f64,
    bias_correction: bool,
    initialized: bool,
    mean: f64,

    /// Running product of `(1 - alpha_k)`, for bias correction
    bias_prod: f64,
}

impl Ewma {
    /// Creates an EWMA with the given half-life in blocks.
    #[must_use]
    pub fn from_half_life_blocks(half_life_blocks: f64, bias_correction: bool) -> Self {
        debug_assert!(half_life_blocks > 0.0);

        let alpha = 1.0 - (-std::f64::consts::LN_2 / half_life_blocks).exp();

        Self {
            alpha: alpha.clamp(EPS_TINY, 1.0),
            bias_correction,
            initialized: false,
            mean: 0.0,
            bias_prod: 1.0,
        }
    }

    /// Folds in a sample weighted by `blocks` elapsed block units.
    pub fn update_with_blocks(&mut self, x: f64, blocks: f64) {
        debug_assert!(blocks > 0.0);

        // (1 - alpha)^blocks, kept away from log(0)
        let decay = (blocks * (1.0 - self.alpha).max(PROD_FLOOR).ln()).exp();
        let alpha_eff = (1.0 - decay).clamp(EPS_TINY, 1.0);

        if self.initialized {
            self.mean = alpha_eff * x + (1.0 - alpha_eff) * self.mean;
        } else {
            self.mean = x;
            self.initialized = true;
        }

        self.bias_prod *= 1.0 - alpha_eff;
    }

    /// Current value, bias-corrected if configured.
    ///
    /// Returns `None` before the first sample.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        if !self.initialized {
            return None;
        }

        if !self.bias_correction {
            return Some(self.mean);
        }

        let denom = 1.0 - self.bias_prod;
        if denom <= PROD_FLOOR {
            return Some(self.mean);
        }

        Some(self.mean / denom)
    }
}

/// EWMA of `delta_numer / delta_denom`, weighted by `delta_denom`
///
/// Used to compare compaction and eviction rates per appended block.
#[derive(Clone, Debug)]
pub struct EwmaRatio {
    ewma: Ewma,
    prev_numer: f64,
    prev_denom: f64,
    initialized: bool,
}

impl EwmaRatio {
    /// Creates a bias-corrected ratio EWMA with the given half-life.
    #[must_use]
    pub fn from_half_life_blocks(half_life_blocks: f64) -> Self {
        Self {
            ewma: Ewma::from_half_life_blocks(half_life_blocks, true),
            prev_numer: 0.0,
            prev_denom: 0.0,
            initialized: false,
        }
    }

    /// Folds in one `(delta_numer, delta_denom)` sample.
    pub fn update(&mut self, numer_inc: f64, denom_inc: f64) {
        if denom_inc <= 0.0 {
            return;
        }
        self.ewma.update_with_blocks(numer_inc / denom_inc, denom_inc);
    }

    /// Feeds cumulative counters; deltas are derived internally.
    ///
    /// The first sample only records the baseline.
    pub fn update_from_cumulative(&mut self, numer: f64, denom: f64) {
        if !self.initialized {
            self.prev_numer = numer;
            self.prev_denom = denom;
            self.initialized = true;
            return;
        }

        let d_numer = numer - self.prev_numer;
        let d_denom = denom - self.prev_denom;
        self.prev_numer = numer;
        self.prev_denom = denom;

        if d_denom > 0.0 {
            self.update(d_numer, d_denom);
        }
    }

    /// Current smoothed ratio, `None` before the first delta.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.ewma.value()
    }
}
