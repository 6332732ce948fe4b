//! Thread requirement calculator.
//!
//! Turns a target's measured state into the number of threads each
//! operation needs. When a capacity cap is given and the uncapped plan does
//! not fit, the largest plan that does fit is found by bisection over a
//! scalar (an extraction percentage, or a raw replenishment thread count)
//! whose total thread requirement is non-decreasing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::core::effects::{EffectModel, UniformEffectModel};
use crate::core::model::{Target, TargetState};

/// Slack absorbed before rounding, so `ceil(10.0 / 0.5)` stays 20.
const ROUNDING_EPSILON: f64 = 1e-9;

/// Threads per operation slot of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCounts {
    /// Suppression of the existing security gap.
    pub suppress: u32,
    /// Replenishment threads.
    pub replenish: u32,
    /// Suppression offsetting the replenishment's security increase.
    pub replenish_suppress: u32,
    /// Extraction threads.
    pub extract: u32,
    /// Suppression offsetting the extraction's security increase.
    pub extract_suppress: u32,
}

impl ThreadCounts {
    /// Sum over all slots.
    #[must_use]
    pub fn total(&self) -> u64 {
        [
            self.suppress,
            self.replenish,
            self.replenish_suppress,
            self.extract,
            self.extract_suppress,
        ]
        .iter()
        .map(|&n| u64::from(n))
        .sum()
    }

    /// True when no slot has threads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Tunables of the calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalculatorSettings {
    /// Share of the resource an extract cycle aims to withdraw, in percent.
    pub extract_percentage: f64,
    /// Stopping width of the percentage bisection.
    pub tolerance: f64,
    /// Over-provisioning factor applied inside an extract cycle.
    pub cycle_safety_factor: f64,
}

impl Default for CalculatorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for CalculatorSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            extract_percentage: cfg.extract_percentage,
            tolerance: cfg.bisection_tolerance,
            cycle_safety_factor: cfg.cycle_safety_factor,
        }
    }
}

/// Computes per-operation thread requirements for targets.
#[derive(Debug, Clone)]
pub struct ThreadCalculator<M = UniformEffectModel> {
    model: M,
    settings: CalculatorSettings,
}

impl ThreadCalculator<UniformEffectModel> {
    /// Build a calculator with the default effect model from configuration.
    #[must_use]
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(UniformEffectModel::new(cfg.effects), CalculatorSettings::from(cfg))
    }
}

impl<M: EffectModel> ThreadCalculator<M> {
    /// Create a calculator from an effect model and settings.
    pub const fn new(model: M, settings: CalculatorSettings) -> Self {
        Self { model, settings }
    }

    /// Calculator settings.
    #[must_use]
    pub const fn settings(&self) -> &CalculatorSettings {
        &self.settings
    }

    /// Threads each operation of `target` needs, optionally capped at `limit`.
    ///
    /// A cap of zero always yields zero counts.
    #[must_use]
    pub fn calculate(&self, target: &Target, limit: Option<u32>) -> ThreadCounts {
        if limit == Some(0) {
            return ThreadCounts::default();
        }
        let counts = match target.state {
            TargetState::NeedsSuppression => self.heal(target, true, limit),
            TargetState::NeedsReplenishment => self.heal(target, false, limit),
            TargetState::ReadyToExtract => self.cycle(target, limit),
        };
        debug!(
            target_id = %target.id,
            state = ?target.state,
            limit = ?limit,
            total = counts.total(),
            "calculated thread counts"
        );
        counts
    }

    /// Uncapped total thread requirement of `target`.
    #[must_use]
    pub fn threads_needed(&self, target: &Target) -> u32 {
        u32::try_from(self.calculate(target, None).total()).unwrap_or(u32::MAX)
    }

    /// Threads that close the current security gap, plus one of slack.
    #[must_use]
    pub fn suppress_threads(&self, target: &Target) -> u32 {
        let gap = target.security_gap();
        if gap <= 0.0 {
            return 0;
        }
        ceil_threads(gap / self.model.suppression_per_thread(target)).saturating_add(1)
    }

    /// Replenishment threads restoring the resource from its current level.
    #[must_use]
    pub fn replenish_threads(&self, target: &Target) -> u32 {
        let multiplier = replenish_multiplier(target, 0.0);
        if multiplier <= 1.0 {
            return 0;
        }
        ceil_threads(self.model.replenish_threads_for(target, multiplier)).saturating_add(1)
    }

    /// Suppression offsetting `threads` replenishment threads.
    #[must_use]
    pub fn replenish_suppress_threads(&self, target: &Target, threads: u32) -> u32 {
        self.compensate(target, self.model.replenish_security_increase(target, threads), threads, 1.0)
    }

    /// Total threads of an extract cycle aiming at `percentage` percent.
    #[must_use]
    pub fn total_required_at(&self, target: &Target, percentage: f64) -> u64 {
        self.cycle_counts_at(target, percentage).total()
    }

    /// Largest percentage in `[0, extract_percentage]` whose extract cycle
    /// fits into `limit` threads, to within the configured tolerance.
    #[must_use]
    pub fn max_feasible_percentage(&self, target: &Target, limit: u32) -> f64 {
        let limit = u64::from(limit);
        bisect_max(0.0, self.settings.extract_percentage, self.settings.tolerance, |pct| {
            self.total_required_at(target, pct) <= limit
        })
    }

    fn compensate(&self, target: &Target, security_increase: f64, inducing: u32, factor: f64) -> u32 {
        if inducing == 0 {
            return 0;
        }
        ceil_threads(security_increase / self.model.suppression_per_thread(target) * factor)
            .saturating_add(1)
    }

    fn heal(&self, target: &Target, include_gap: bool, limit: Option<u32>) -> ThreadCounts {
        let suppress = if include_gap { self.suppress_threads(target) } else { 0 };
        if let Some(limit) = limit {
            if limit < suppress {
                return ThreadCounts {
                    suppress: limit,
                    ..ThreadCounts::default()
                };
            }
        }

        let mut replenish = self.replenish_threads(target);
        let mut replenish_suppress = self.replenish_suppress_threads(target, replenish);

        if let Some(limit) = limit {
            let total = u64::from(suppress) + u64::from(replenish) + u64::from(replenish_suppress);
            if total > u64::from(limit) {
                let budget = u64::from(limit - suppress);
                replenish = bisect_max_threads(replenish, |g| {
                    u64::from(g) + u64::from(self.replenish_suppress_threads(target, g)) <= budget
                });
                replenish_suppress = self.replenish_suppress_threads(target, replenish);
            }
        }

        ThreadCounts {
            suppress,
            replenish,
            replenish_suppress,
            ..ThreadCounts::default()
        }
    }

    fn cycle(&self, target: &Target, limit: Option<u32>) -> ThreadCounts {
        let desired = self.cycle_counts_at(target, self.settings.extract_percentage);
        match limit {
            Some(limit) if desired.total() > u64::from(limit) => {
                if self.total_required_at(target, 0.0) > u64::from(limit) {
                    return ThreadCounts::default();
                }
                let pct = self.max_feasible_percentage(target, limit);
                debug!(target_id = %target.id, percentage = pct, limit, "degraded extract cycle");
                self.cycle_counts_at(target, pct)
            }
            _ => desired,
        }
    }

    fn cycle_counts_at(&self, target: &Target, percentage: f64) -> ThreadCounts {
        let factor = self.settings.cycle_safety_factor;
        let fraction = (percentage / 100.0).clamp(0.0, 0.99);

        let extract = floor_threads(fraction / self.model.extraction_fraction_per_thread(target));
        let extract_suppress =
            self.compensate(target, self.model.extract_security_increase(target, extract), extract, factor);

        let multiplier = replenish_multiplier(target, fraction);
        let replenish = if multiplier > 1.0 {
            ceil_threads(self.model.replenish_threads_for(target, multiplier) * factor).saturating_add(1)
        } else {
            0
        };
        let replenish_suppress = self.compensate(
            target,
            self.model.replenish_security_increase(target, replenish),
            replenish,
            factor,
        );

        ThreadCounts {
            suppress: 0,
            replenish,
            replenish_suppress,
            extract,
            extract_suppress,
        }
    }
}

/// Ratio restoring the resource to its maximum after `withdrawn` of it is taken.
fn replenish_multiplier(target: &Target, withdrawn: f64) -> f64 {
    if target.resource_max <= 0.0 {
        return 1.0;
    }
    let remaining = target.resource_current.max(1.0) * (1.0 - withdrawn);
    if remaining <= 0.0 {
        return 1.0;
    }
    target.resource_max / remaining
}

/// Round a fractional thread requirement up, ignoring floating-point noise.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ceil_threads(x: f64) -> u32 {
    if !x.is_finite() || x <= 0.0 {
        return if x.is_infinite() && x > 0.0 { u32::MAX } else { 0 };
    }
    (x - ROUNDING_EPSILON).ceil().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Round a fractional thread count down, ignoring floating-point noise.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn floor_threads(x: f64) -> u32 {
    if !x.is_finite() || x <= 0.0 {
        return if x.is_infinite() && x > 0.0 { u32::MAX } else { 0 };
    }
    (x + ROUNDING_EPSILON).floor().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Largest `x` in `[low, high]` for which the monotone predicate `fits`
/// holds, bisected until the bracket is narrower than `tolerance`.
///
/// Returns `high` when it fits and `low` when nothing above it was found to.
pub fn bisect_max(mut low: f64, mut high: f64, tolerance: f64, fits: impl Fn(f64) -> bool) -> f64 {
    if fits(high) {
        return high;
    }
    let mut best = low;
    while high - low > tolerance {
        let mid = (low + high) / 2.0;
        if fits(mid) {
            best = mid;
            low = mid;
        } else {
            high = mid;
        }
    }
    best
}

/// Largest integer `g` in `[0, high]` for which the monotone predicate holds.
///
/// `fits(0)` is assumed to hold.
pub fn bisect_max_threads(high: u32, fits: impl Fn(u32) -> bool) -> u32 {
    let (mut low, mut high) = (0_u32, high);
    while low < high {
        let mid = low + (high - low).div_ceil(2);
        if fits(mid) {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}
