//! Engine configuration structures.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How scarce capacity is shared among targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Spread capacity over every target in proportion to its priority.
    ProportionalFair,
    /// Keep only the `max_targets` highest-priority targets, then share.
    Focused,
}

impl FromStr for AllocationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proportional_fair" | "proportional" | "fair" => Ok(Self::ProportionalFair),
            "focused" => Ok(Self::Focused),
            other => Err(format!("unknown allocation mode `{other}`")),
        }
    }
}

/// Allocator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Sharing strategy.
    pub mode: AllocationMode,
    /// Active-set cap used by [`AllocationMode::Focused`].
    pub max_targets: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            mode: AllocationMode::ProportionalFair,
            max_targets: 25,
        }
    }
}

/// Per-thread effect coefficients for the default effect model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectCoefficients {
    /// Security removed by one suppression thread.
    pub suppression_per_thread: f64,
    /// Security added by one replenishment thread.
    pub replenish_security_per_thread: f64,
    /// Security added by one extraction thread.
    pub extract_security_per_thread: f64,
    /// Fraction of the resource withdrawn by one extraction thread.
    pub extraction_fraction_per_thread: f64,
    /// Multiplicative resource growth contributed by one replenishment thread.
    pub growth_factor_per_thread: f64,
}

impl Default for EffectCoefficients {
    fn default() -> Self {
        Self {
            suppression_per_thread: 0.05,
            replenish_security_per_thread: 0.004,
            extract_security_per_thread: 0.002,
            extraction_fraction_per_thread: 0.002,
            growth_factor_per_thread: 1.0025,
        }
    }
}

impl EffectCoefficients {
    /// Validate coefficient ranges.
    ///
    /// # Errors
    ///
    /// Returns a description of the first out-of-range coefficient.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.suppression_per_thread.is_finite() && self.suppression_per_thread > 0.0) {
            return Err("suppression_per_thread must be greater than 0".into());
        }
        if !(self.extraction_fraction_per_thread.is_finite()
            && self.extraction_fraction_per_thread > 0.0)
        {
            return Err("extraction_fraction_per_thread must be greater than 0".into());
        }
        if !(self.growth_factor_per_thread.is_finite() && self.growth_factor_per_thread > 1.0) {
            return Err("growth_factor_per_thread must be greater than 1".into());
        }
        for (name, value) in [
            ("replenish_security_per_thread", self.replenish_security_per_thread),
            ("extract_security_per_thread", self.extract_security_per_thread),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number"));
            }
        }
        Ok(())
    }
}

/// Settings for the pooled dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of dispatch worker threads.
    pub worker_count: usize,
    /// Dispatch requests that may wait before submissions are refused.
    pub max_queue_depth: usize,
    /// Stack size of each worker thread in bytes.
    pub thread_stack_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().clamp(1, 8),
            max_queue_depth: 1024,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl DispatchConfig {
    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the queue depth.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Validate dispatcher settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing between dependent actions, in milliseconds.
    pub interval_ms: u64,
    /// Share of the resource an extract cycle aims to withdraw, in percent.
    pub extract_percentage: f64,
    /// Stopping width of the degraded-mode bisection, in percent.
    pub bisection_tolerance: f64,
    /// Over-provisioning factor applied inside an extract cycle.
    pub cycle_safety_factor: f64,
    /// Smoothing factor of the drift compensation average.
    pub drift_alpha: f64,
    /// Raise repeat counts to use spare capacity after composing.
    pub scale_repeats: bool,
    /// Allocator settings.
    pub allocation: AllocationConfig,
    /// Effect model coefficients.
    pub effects: EffectCoefficients,
    /// Pooled dispatcher settings.
    pub dispatch: DispatchConfig,
    /// Log filter directives used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            extract_percentage: 10.0,
            bisection_tolerance: 0.01,
            cycle_safety_factor: 1.1,
            drift_alpha: 0.2,
            scale_repeats: true,
            allocation: AllocationConfig::default(),
            effects: EffectCoefficients::default(),
            dispatch: DispatchConfig::default(),
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Validate all settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be greater than 0".into());
        }
        if !(self.extract_percentage > 0.0 && self.extract_percentage < 100.0) {
            return Err("extract_percentage must be within (0, 100)".into());
        }
        if !(self.bisection_tolerance.is_finite() && self.bisection_tolerance > 0.0) {
            return Err("bisection_tolerance must be greater than 0".into());
        }
        if !(self.cycle_safety_factor.is_finite() && self.cycle_safety_factor >= 1.0) {
            return Err("cycle_safety_factor must be at least 1".into());
        }
        if !(self.drift_alpha > 0.0 && self.drift_alpha <= 1.0) {
            return Err("drift_alpha must be within (0, 1]".into());
        }
        if self.allocation.mode == AllocationMode::Focused && self.allocation.max_targets == 0 {
            return Err("max_targets must be greater than 0 in focused mode".into());
        }
        self.effects
            .validate()
            .map_err(|e| format!("effects invalid: {e}"))?;
        self.dispatch
            .validate()
            .map_err(|e| format!("dispatch invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `BATCH_*` environment
    /// variables, loading a `.env` file first when one is present.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine; the process environment still applies.
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        override_from_env("BATCH_INTERVAL_MS", &mut cfg.interval_ms)?;
        override_from_env("BATCH_EXTRACT_PERCENTAGE", &mut cfg.extract_percentage)?;
        override_from_env("BATCH_BISECTION_TOLERANCE", &mut cfg.bisection_tolerance)?;
        override_from_env("BATCH_CYCLE_SAFETY_FACTOR", &mut cfg.cycle_safety_factor)?;
        override_from_env("BATCH_DRIFT_ALPHA", &mut cfg.drift_alpha)?;
        override_from_env("BATCH_SCALE_REPEATS", &mut cfg.scale_repeats)?;
        override_from_env("BATCH_ALLOCATION_MODE", &mut cfg.allocation.mode)?;
        override_from_env("BATCH_MAX_TARGETS", &mut cfg.allocation.max_targets)?;
        override_from_env("BATCH_DISPATCH_WORKERS", &mut cfg.dispatch.worker_count)?;
        override_from_env("BATCH_DISPATCH_QUEUE_DEPTH", &mut cfg.dispatch.max_queue_depth)?;
        if let Ok(filter) = std::env::var("BATCH_LOG") {
            cfg.log_filter = Some(filter);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn override_from_env<T>(key: &str, slot: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => {
            *slot = raw
                .trim()
                .parse()
                .map_err(|e| format!("{key}={raw:?} could not be parsed: {e}"))?;
            Ok(())
        }
        Err(std::env::VarError::NotPresent) => Ok(()),
        Err(e) => Err(format!("{key}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let cfg = EngineConfig {
            interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_extract_percentage_bounds() {
        for pct in [0.0, 100.0, -3.0, f64::NAN] {
            let cfg = EngineConfig {
                extract_percentage: pct,
                ..EngineConfig::default()
            };
            assert!(cfg.validate().is_err(), "{pct} should be rejected");
        }
    }

    #[test]
    fn test_focused_needs_max_targets() {
        let mut cfg = EngineConfig::default();
        cfg.allocation = AllocationConfig {
            mode: AllocationMode::Focused,
            max_targets: 0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "interval_ms": 250, "allocation": { "mode": "focused" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.interval_ms, 250);
        assert_eq!(cfg.allocation.mode, AllocationMode::Focused);
        assert_eq!(cfg.allocation.max_targets, 25);
        assert!((cfg.drift_alpha - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_allocation_mode_from_str() {
        assert_eq!("focused".parse::<AllocationMode>(), Ok(AllocationMode::Focused));
        assert_eq!(
            "Proportional_Fair".parse::<AllocationMode>(),
            Ok(AllocationMode::ProportionalFair)
        );
        assert!("greedy".parse::<AllocationMode>().is_err());
    }
}
