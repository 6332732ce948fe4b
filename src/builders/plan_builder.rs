//! Builders wiring engine components from configuration.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::core::{
    compose_batches, scale_repeat_counts, AllocationReport, Batch, Clock, Dispatcher, EffectModel,
    EngineError, Executor, Host, Target, ThreadAllocator, ThreadCalculator, UniformEffectModel,
};

/// Output of one planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Targets kept by the allocator, with needs and assignments filled in.
    pub targets: Vec<Target>,
    /// Batches ready for the executor.
    pub batches: Vec<Batch>,
    /// Aggregate capacity ledger.
    pub allocation: AllocationReport,
}

/// Runs calculator, allocator, and composer in sequence.
#[derive(Debug, Clone)]
pub struct PlanBuilder<M = UniformEffectModel> {
    config: EngineConfig,
    calculator: ThreadCalculator<M>,
}

impl PlanBuilder<UniformEffectModel> {
    /// Validate `config` and use the default effect model.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` when validation fails.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let calculator = ThreadCalculator::from_config(&config);
        Ok(Self { config, calculator })
    }
}

impl<M: EffectModel> PlanBuilder<M> {
    /// Swap in a different effect model.
    pub fn with_effect_model<N: EffectModel>(self, model: N) -> PlanBuilder<N> {
        let settings = *self.calculator.settings();
        PlanBuilder {
            config: self.config,
            calculator: ThreadCalculator::new(model, settings),
        }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Calculator in use.
    pub const fn calculator(&self) -> &ThreadCalculator<M> {
        &self.calculator
    }

    /// Plan batches for `targets` over `hosts`.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidInput` when any host or target record is invalid.
    /// Short capacity is not an error; it yields smaller or fewer batches.
    pub fn plan(&self, hosts: &[Host], targets: Vec<Target>) -> Result<Plan, EngineError> {
        hosts.iter().try_for_each(Host::validate)?;
        targets.iter().try_for_each(Target::validate)?;

        let allocator = ThreadAllocator::new(self.config.allocation.clone());
        let (targets, allocation) = allocator.assign(&self.calculator, hosts, targets);

        let interval = self.config.interval_ms;
        let mut batches = compose_batches(&self.calculator, &targets, interval);
        if self.config.scale_repeats {
            batches = scale_repeat_counts(batches, allocation.total_capacity, interval);
        }

        info!(
            targets = targets.len(),
            batches = batches.len(),
            assigned = allocation.assigned,
            remaining = allocation.remaining,
            "plan ready"
        );
        Ok(Plan {
            targets,
            batches,
            allocation,
        })
    }
}

/// Build an executor over `hosts` from validated configuration.
///
/// # Errors
///
/// `EngineError::InvalidConfig` when validation fails, `InvalidInput` for an
/// invalid host record.
pub fn build_executor<C: Clock, D: Dispatcher>(
    config: &EngineConfig,
    clock: C,
    dispatcher: D,
    hosts: Vec<Host>,
) -> Result<Executor<C, D>, EngineError> {
    config.validate().map_err(EngineError::InvalidConfig)?;
    hosts.iter().try_for_each(Host::validate)?;
    Ok(Executor::new(
        clock,
        dispatcher,
        hosts,
        config.interval_ms,
        config.drift_alpha,
    ))
}
