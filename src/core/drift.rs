//! Drift compensation for the executor's sleep targets.
//!
//! The executor wakes late by a roughly constant amount (scheduler slack,
//! coarse timers). The compensator keeps a smoothed estimate of that lag and
//! subtracts it from future wake-up deadlines:
//!
//! > offset = (1 - alpha) * offset + alpha * (delay + offset)
//!
//! where `delay` is the observed lateness of a wake-up that was already
//! compensated by the previous offset. The offset therefore converges on the
//! systematic lag and the residual delay on zero.

use serde::{Deserialize, Serialize};

/// Rolling drift estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftCompensator {
    alpha: f64,
    offset_ms: f64,
    observations: u64,
}

impl DriftCompensator {
    /// Create a compensator with smoothing factor `alpha`, clamped into `(0, 1]`.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 { alpha.min(1.0) } else { 0.2 };
        Self {
            alpha,
            offset_ms: 0.0,
            observations: 0,
        }
    }

    /// Current offset in milliseconds.
    #[must_use]
    pub const fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    /// Number of wake-ups observed.
    #[must_use]
    pub const fn observations(&self) -> u64 {
        self.observations
    }

    /// Wake-up deadline for a pass scheduled at `scheduled_ms`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn adjust(&self, scheduled_ms: u64) -> u64 {
        let offset = self.offset_ms.round();
        if offset <= 0.0 {
            return scheduled_ms.saturating_add((-offset) as u64);
        }
        scheduled_ms.saturating_sub(offset as u64)
    }

    /// Record a wake-up that was meant for `scheduled_ms` and happened at `actual_ms`.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&mut self, scheduled_ms: u64, actual_ms: u64) {
        let delay = actual_ms as f64 - scheduled_ms as f64;
        self.offset_ms = (1.0 - self.alpha).mul_add(self.offset_ms, self.alpha * (delay + self.offset_ms));
        self.observations += 1;
    }
}

impl Default for DriftCompensator {
    fn default() -> Self {
        Self::new(0.2)
    }
}
