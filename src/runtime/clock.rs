//! Clock implementations for the executor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Clock;

/// Virtual clock that jumps to each sleep deadline instead of waiting.
///
/// A non-zero lag makes every wake-up late by that many milliseconds, which
/// stands in for a loaded scheduler. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    lag_ms: u64,
}

impl ManualClock {
    /// Clock starting at `start_ms` with no lag.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
            lag_ms: 0,
        }
    }

    /// Make every wake-up late by `lag_ms`.
    #[must_use]
    pub const fn with_lag(mut self, lag_ms: u64) -> Self {
        self.lag_ms = lag_ms;
        self
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_until(&self, deadline_ms: u64) {
        let current = self.now.load(Ordering::SeqCst);
        let wake = current.max(deadline_ms).saturating_add(self.lag_ms);
        self.now.store(wake, Ordering::SeqCst);
    }
}

/// Wall clock backed by the tokio timer, measured from its creation.
#[cfg(feature = "tokio-runtime")]
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

#[cfg(feature = "tokio-runtime")]
impl TokioClock {
    /// Clock whose zero is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(feature = "tokio-runtime")]
impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tokio-runtime")]
#[async_trait]
impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    async fn sleep_until(&self, deadline_ms: u64) {
        let deadline = self.origin + std::time::Duration::from_millis(deadline_ms);
        tokio::time::sleep_until(deadline).await;
    }
}
