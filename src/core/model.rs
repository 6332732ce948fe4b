//! Host, target, and batch descriptors shared by every pipeline stage.
//!
//! Field names serialize in camelCase so the same records can be handed
//! between the planning and execution stages as JSON files.

use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// Identifier of a worker host.
pub type HostId = String;

/// Identifier of a target.
pub type TargetId = String;

/// The kind of timed remote operation carried by a [`ThreadAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Lowers the target's security metric toward its minimum.
    Suppress,
    /// Restores the target's resource toward its maximum.
    Replenish,
    /// Withdraws a fraction of the target's resource.
    Extract,
    /// Any kind this build does not know about (e.g. from a newer batch file).
    #[serde(other)]
    Unknown,
}

impl OperationKind {
    /// Stable lowercase name used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suppress => "suppress",
            Self::Replenish => "replenish",
            Self::Extract => "extract",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a target needs next, as decided by the target profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetState {
    /// Security is above minimum.
    NeedsSuppression,
    /// Resource is below maximum.
    NeedsReplenishment,
    /// Security at minimum and resource at maximum.
    ReadyToExtract,
}

/// Completion time of each operation kind against one target, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDurations {
    /// Duration of a suppression.
    pub suppress: u64,
    /// Duration of a replenishment.
    pub replenish: u64,
    /// Duration of an extraction.
    pub extract: u64,
}

impl OperationDurations {
    /// Duration of the given kind; unknown kinds take no time.
    #[must_use]
    pub const fn of(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::Suppress => self.suppress,
            OperationKind::Replenish => self.replenish,
            OperationKind::Extract => self.extract,
            OperationKind::Unknown => 0,
        }
    }

    /// Longest of the three durations.
    #[must_use]
    pub fn max(&self) -> u64 {
        self.suppress.max(self.replenish).max(self.extract)
    }

    /// Shortest of the three durations.
    #[must_use]
    pub fn min(&self) -> u64 {
        self.suppress.min(self.replenish).min(self.extract)
    }
}

/// A worker host with a finite budget of execution threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Host identifier.
    pub id: HostId,
    /// Threads the host can run when idle.
    pub capacity_total: u32,
    /// Threads currently free.
    pub capacity_available: u32,
}

impl Host {
    /// Create an idle host.
    pub fn new(id: impl Into<HostId>, capacity_total: u32) -> Self {
        Self {
            id: id.into(),
            capacity_total,
            capacity_available: capacity_total,
        }
    }

    /// Derive thread capacity from a memory budget and a fixed per-thread cost.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_memory(
        id: impl Into<HostId>,
        memory_max: f64,
        memory_used: f64,
        per_thread_cost: f64,
    ) -> Self {
        let threads = |mem: f64| {
            if per_thread_cost <= 0.0 || !mem.is_finite() || mem <= 0.0 {
                0
            } else {
                (mem / per_thread_cost).floor().min(f64::from(u32::MAX)) as u32
            }
        };
        let capacity_total = threads(memory_max);
        let capacity_available = threads(memory_max - memory_used).min(capacity_total);
        Self {
            id: id.into(),
            capacity_total,
            capacity_available,
        }
    }

    /// Reject records that cannot be scheduled against.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` for an empty id or more available
    /// than total capacity.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidInput("host id must not be empty".into()));
        }
        if self.capacity_available > self.capacity_total {
            return Err(EngineError::InvalidInput(format!(
                "host `{}` has capacityAvailable {} above capacityTotal {}",
                self.id, self.capacity_available, self.capacity_total
            )));
        }
        Ok(())
    }
}

/// A target of timed remote operations, as measured by the target profiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Target identifier.
    pub id: TargetId,
    /// Current security level.
    pub security_current: f64,
    /// Lowest reachable security level.
    pub security_min: f64,
    /// Current resource level.
    pub resource_current: f64,
    /// Resource ceiling.
    pub resource_max: f64,
    /// Per-kind operation durations.
    pub durations: OperationDurations,
    /// Shortest operation duration.
    pub min_duration: u64,
    /// Longest operation duration.
    pub max_duration: u64,
    /// Relative worth of the target when sharing capacity.
    pub priority_value: f64,
    /// Next phase of the target.
    pub state: TargetState,
    /// Threads the target would use uncapped.
    #[serde(default)]
    pub threads_needed: u32,
    /// Threads granted by the allocator.
    #[serde(default)]
    pub threads_assigned: u32,
}

impl Target {
    /// Gap between current and minimum security, never negative.
    #[must_use]
    pub fn security_gap(&self) -> f64 {
        (self.security_current - self.security_min).max(0.0)
    }

    /// Reject records with missing or non-finite measurements.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` describing the first bad field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidInput("target id must not be empty".into()));
        }
        let fields = [
            ("securityCurrent", self.security_current),
            ("securityMin", self.security_min),
            ("resourceCurrent", self.resource_current),
            ("resourceMax", self.resource_max),
            ("priorityValue", self.priority_value),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "target `{}` has invalid {name}: {value}",
                    self.id
                )));
            }
        }
        if self.threads_assigned > self.threads_needed {
            return Err(EngineError::InvalidInput(format!(
                "target `{}` has threadsAssigned {} above threadsNeeded {}",
                self.id, self.threads_assigned, self.threads_needed
            )));
        }
        Ok(())
    }
}

/// One operation of a batch: a thread count and an offset from the batch anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadAction {
    /// Operation kind.
    pub kind: OperationKind,
    /// Threads the operation runs with.
    pub amount: u32,
    /// Delay from the batch's dispatch instant, in milliseconds.
    pub offset_msec: i64,
}

/// The time-anchored set of operations scheduled against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Target the batch runs against.
    pub target_id: TargetId,
    /// Shortest operation duration of the target.
    pub min_duration: u64,
    /// Longest operation duration of the target.
    pub max_duration: u64,
    /// Firings left before the batch retires.
    pub repeat_count: u32,
    /// Earliest time (relative to loop start) the batch may fire.
    pub scheduling_start_time: u64,
    /// Time after which the batch may no longer fire.
    pub scheduling_end_time: u64,
    /// Shared anchor all composed batches converge on.
    pub execution_start_time: u64,
    /// Latest `offset + duration` over the actions.
    pub execution_end_time: u64,
    /// Ordered operations.
    pub actions: Vec<ThreadAction>,
}

impl Batch {
    /// Sum of threads over all actions.
    #[must_use]
    pub fn total_threads(&self) -> u64 {
        self.actions.iter().map(|a| u64::from(a.amount)).sum()
    }

    /// Shift offsets so the earliest becomes zero and recompute `execution_end_time`.
    #[allow(clippy::cast_sign_loss)]
    pub fn normalize(&mut self, durations: &OperationDurations) {
        let Some(min) = self.actions.iter().map(|a| a.offset_msec).min() else {
            self.execution_end_time = 0;
            return;
        };
        for action in &mut self.actions {
            action.offset_msec -= min;
        }
        self.execution_end_time = self
            .actions
            .iter()
            .map(|a| a.offset_msec.max(0) as u64 + durations.of(a.kind))
            .max()
            .unwrap_or(0);
    }

    /// Reject batches the executor cannot run.
    ///
    /// Times must fit in an `i64` so offsets and windows stay comparable, the
    /// scheduling window must not run backwards, and offsets are delays, so
    /// they are never negative.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` describing the first bad field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.target_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("batch targetId must not be empty".into()));
        }
        let limit = i64::MAX.unsigned_abs();
        let times = [
            ("minDuration", self.min_duration),
            ("maxDuration", self.max_duration),
            ("schedulingStartTime", self.scheduling_start_time),
            ("schedulingEndTime", self.scheduling_end_time),
            ("executionStartTime", self.execution_start_time),
            ("executionEndTime", self.execution_end_time),
        ];
        for (name, value) in times {
            if value > limit {
                return Err(EngineError::InvalidInput(format!(
                    "batch `{}` has out-of-range {name}: {value}",
                    self.target_id
                )));
            }
        }
        if self.min_duration > self.max_duration {
            return Err(EngineError::InvalidInput(format!(
                "batch `{}` has minDuration {} above maxDuration {}",
                self.target_id, self.min_duration, self.max_duration
            )));
        }
        if self.scheduling_start_time > self.scheduling_end_time {
            return Err(EngineError::InvalidInput(format!(
                "batch `{}` has schedulingStartTime {} after schedulingEndTime {}",
                self.target_id, self.scheduling_start_time, self.scheduling_end_time
            )));
        }
        if let Some((index, action)) = self.actions.iter().enumerate().find(|(_, a)| a.offset_msec < 0) {
            return Err(EngineError::InvalidInput(format!(
                "batch `{}` action {index} has negative offsetMsec {}",
                self.target_id, action.offset_msec
            )));
        }
        Ok(())
    }
}
