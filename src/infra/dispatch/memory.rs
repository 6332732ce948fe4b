//! In-process dispatchers: a recorder for tests and a dry-run logger.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{Dispatcher, OperationKind};

/// One dispatch call as seen by a [`RecordingDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    /// Operation kind.
    pub kind: OperationKind,
    /// Host the operation was sent to.
    pub host_id: String,
    /// Target of the operation.
    pub target_id: String,
    /// Thread count.
    pub threads: u32,
    /// Launch delay in milliseconds.
    pub delay_msec: u64,
    /// Whether the call reported success.
    pub accepted: bool,
}

/// Records every call; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    records: Arc<Mutex<Vec<DispatchRecord>>>,
    failing: Arc<Mutex<HashSet<OperationKind>>>,
}

impl RecordingDispatcher {
    /// Dispatcher accepting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every dispatch of `kind`.
    #[must_use]
    pub fn failing(self, kind: OperationKind) -> Self {
        self.failing.lock().insert(kind);
        self
    }

    /// Accept `kind` again.
    pub fn recover(&self, kind: OperationKind) {
        self.failing.lock().remove(&kind);
    }

    /// All calls so far, in order.
    #[must_use]
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.lock().clone()
    }

    /// Threads of accepted calls.
    #[must_use]
    pub fn accepted_threads(&self) -> u64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.accepted)
            .map(|r| u64::from(r.threads))
            .sum()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        kind: OperationKind,
        host_id: &str,
        target_id: &str,
        threads: u32,
        delay_msec: u64,
    ) -> bool {
        let accepted = !self.failing.lock().contains(&kind);
        self.records.lock().push(DispatchRecord {
            kind,
            host_id: host_id.to_string(),
            target_id: target_id.to_string(),
            threads,
            delay_msec,
            accepted,
        });
        accepted
    }
}

/// Logs each dispatch and accepts it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

impl Dispatcher for TracingDispatcher {
    fn dispatch(
        &self,
        kind: OperationKind,
        host_id: &str,
        target_id: &str,
        threads: u32,
        delay_msec: u64,
    ) -> bool {
        info!(%kind, host_id, target_id, threads, offset_ms = delay_msec, "dispatch (dry run)");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_kind_is_refused_and_recorded() {
        let dispatcher = RecordingDispatcher::new().failing(OperationKind::Extract);
        let view = dispatcher.clone();
        assert!(dispatcher.dispatch(OperationKind::Suppress, "h", "t", 3, 0));
        assert!(!dispatcher.dispatch(OperationKind::Extract, "h", "t", 2, 10));
        assert_eq!(view.records().len(), 2);
        assert_eq!(view.accepted_threads(), 3);

        view.recover(OperationKind::Extract);
        assert!(dispatcher.dispatch(OperationKind::Extract, "h", "t", 2, 10));
    }

    #[test]
    fn test_tracing_dispatcher_accepts() {
        assert!(TracingDispatcher.dispatch(OperationKind::Replenish, "h", "t", 1, 0));
    }
}
