//! Per-thread effect model used by the thread requirement calculator.
//!
//! The engine never measures targets itself. How much one thread of each
//! operation moves a target's security and resource levels is supplied by an
//! [`EffectModel`]; [`UniformEffectModel`] is the coefficient-driven default.

use std::collections::HashMap;

use crate::config::EffectCoefficients;
use crate::core::model::{Target, TargetId};

/// Effect quantities consumed by the calculator.
pub trait EffectModel: Send + Sync {
    /// Security removed by one suppression thread against `target`.
    fn suppression_per_thread(&self, target: &Target) -> f64;

    /// Fractional replenishment threads needed to multiply the resource of
    /// `target` by `multiplier`.
    fn replenish_threads_for(&self, target: &Target, multiplier: f64) -> f64;

    /// Security added by `threads` replenishment threads.
    fn replenish_security_increase(&self, target: &Target, threads: u32) -> f64;

    /// Fraction of the resource one extraction thread withdraws.
    fn extraction_fraction_per_thread(&self, target: &Target) -> f64;

    /// Security added by `threads` extraction threads.
    fn extract_security_increase(&self, target: &Target, threads: u32) -> f64;
}

/// Effect model with linear security effects and geometric growth, driven by
/// [`EffectCoefficients`] with optional per-target overrides.
#[derive(Debug, Clone, Default)]
pub struct UniformEffectModel {
    defaults: EffectCoefficients,
    overrides: HashMap<TargetId, EffectCoefficients>,
}

impl UniformEffectModel {
    /// Create a model applying `coefficients` to every target.
    #[must_use]
    pub fn new(coefficients: EffectCoefficients) -> Self {
        Self {
            defaults: coefficients,
            overrides: HashMap::new(),
        }
    }

    /// Use different coefficients for one target.
    #[must_use]
    pub fn with_override(mut self, target_id: impl Into<TargetId>, coefficients: EffectCoefficients) -> Self {
        self.overrides.insert(target_id.into(), coefficients);
        self
    }

    fn coefficients(&self, target: &Target) -> &EffectCoefficients {
        self.overrides.get(&target.id).unwrap_or(&self.defaults)
    }
}

impl EffectModel for UniformEffectModel {
    fn suppression_per_thread(&self, target: &Target) -> f64 {
        self.coefficients(target).suppression_per_thread
    }

    fn replenish_threads_for(&self, target: &Target, multiplier: f64) -> f64 {
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return 0.0;
        }
        multiplier.ln() / self.coefficients(target).growth_factor_per_thread.ln()
    }

    fn replenish_security_increase(&self, target: &Target, threads: u32) -> f64 {
        f64::from(threads) * self.coefficients(target).replenish_security_per_thread
    }

    fn extraction_fraction_per_thread(&self, target: &Target) -> f64 {
        self.coefficients(target).extraction_fraction_per_thread
    }

    fn extract_security_increase(&self, target: &Target, threads: u32) -> f64 {
        f64::from(threads) * self.coefficients(target).extract_security_per_thread
    }
}
