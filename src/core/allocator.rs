//! Proportional-fair thread allocator.
//!
//! Shares the aggregate host capacity among targets in proportion to their
//! priority value, capped by each target's need, repeating until a pass
//! assigns nothing or capacity runs out.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AllocationConfig, AllocationMode};
use crate::core::calculator::ThreadCalculator;
use crate::core::effects::EffectModel;
use crate::core::model::{Host, Target};

/// Aggregate capacity ledger of one allocation run.
///
/// Hosts are not debited individually here; placement on concrete hosts
/// happens when the executor dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationReport {
    /// Fixed-point passes run.
    pub passes: usize,
    /// Capacity available when allocation started.
    pub total_capacity: u64,
    /// Threads granted across all targets.
    pub assigned: u64,
    /// Capacity left unassigned.
    pub remaining: u64,
}

/// Distributes capacity among targets.
#[derive(Debug, Clone)]
pub struct ThreadAllocator {
    config: AllocationConfig,
}

impl ThreadAllocator {
    /// Create an allocator.
    #[must_use]
    pub const fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    /// Compute uncapped needs, select the active set, and allocate.
    ///
    /// Targets with no need are dropped from the result; in focused mode only
    /// the `max_targets` highest-priority targets are kept.
    pub fn assign<M: EffectModel>(
        &self,
        calculator: &ThreadCalculator<M>,
        hosts: &[Host],
        targets: Vec<Target>,
    ) -> (Vec<Target>, AllocationReport) {
        let mut targets: Vec<Target> = targets
            .into_iter()
            .map(|mut target| {
                target.threads_needed = calculator.threads_needed(&target);
                target.threads_assigned = 0;
                target
            })
            .filter(|target| target.threads_needed > 0)
            .collect();

        if self.config.mode == AllocationMode::Focused {
            targets.sort_by(|a, b| b.priority_value.total_cmp(&a.priority_value));
            targets.truncate(self.config.max_targets);
        }

        let capacity = hosts.iter().map(|h| u64::from(h.capacity_available)).sum();
        let report = distribute(&mut targets, capacity);
        info!(
            targets = targets.len(),
            capacity = report.total_capacity,
            assigned = report.assigned,
            passes = report.passes,
            "allocated threads"
        );
        (targets, report)
    }
}

/// Share `capacity` among `targets` whose `threads_needed` is already set.
///
/// Existing `threads_assigned` values count toward each target's need.
pub fn distribute(targets: &mut [Target], capacity: u64) -> AllocationReport {
    let mut remaining = capacity;
    let mut passes = 0;

    while remaining > 0 {
        let active: Vec<usize> = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.threads_assigned < t.threads_needed)
            .map(|(i, _)| i)
            .collect();
        if active.is_empty() {
            break;
        }
        passes += 1;

        let weights: Vec<f64> = active
            .iter()
            .map(|&i| targets[i].priority_value.max(0.0))
            .collect();
        let value_sum: f64 = weights.iter().sum();
        let pool = remaining;
        let mut assigned_this_pass = 0_u64;

        for (&i, weight) in active.iter().zip(&weights) {
            let share = if value_sum > 0.0 {
                weight / value_sum
            } else {
                1.0 / active.len() as f64
            };
            let offer = proportional_offer(share, pool).min(remaining);
            let target = &mut targets[i];
            let want = u64::from(target.threads_needed - target.threads_assigned);
            let grant = offer.min(want);
            if grant == 0 {
                continue;
            }
            // grant <= want, which fits in u32
            target.threads_assigned += u32::try_from(grant).unwrap_or(0);
            remaining -= grant;
            assigned_this_pass += grant;
        }

        debug!(pass = passes, assigned = assigned_this_pass, remaining, "allocation pass");
        if assigned_this_pass == 0 {
            break;
        }
    }

    AllocationReport {
        passes,
        total_capacity: capacity,
        assigned: capacity - remaining,
        remaining,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn proportional_offer(share: f64, pool: u64) -> u64 {
    (share * pool as f64).floor().clamp(0.0, pool as f64) as u64
}
