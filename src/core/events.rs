//! Scheduling progress events.
//!
//! The executor reports what it does as [`ScheduleEvent`] values handed to an
//! [`EventSink`]. Presentation (progress bars, dashboards) subscribes through
//! a sink and stays out of the control loop.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::model::{HostId, OperationKind, TargetId};

/// Something the executor did. Times are milliseconds since loop start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScheduleEvent {
    /// Every action of a batch was placed and dispatched.
    BatchFired {
        /// Target of the batch.
        target_id: TargetId,
        /// Threads dispatched.
        threads: u64,
        /// Firings left.
        repeat_left: u32,
        /// Time of the pass.
        at_ms: u64,
    },
    /// A batch did not fit the host pool this pass.
    BatchSkipped {
        /// Target of the batch.
        target_id: TargetId,
        /// Threads the batch needs.
        threads: u64,
        /// Threads free in the pool.
        available: u64,
        /// Time of the pass.
        at_ms: u64,
    },
    /// A batch's scheduling window closed before it ran out of repeats.
    BatchExpired {
        /// Target of the batch.
        target_id: TargetId,
        /// Firings that never happened.
        repeat_left: u32,
        /// Time of the pass.
        at_ms: u64,
    },
    /// A batch fired its last repeat.
    BatchExhausted {
        /// Target of the batch.
        target_id: TargetId,
        /// Time of the pass.
        at_ms: u64,
    },
    /// The dispatcher refused one placement.
    DispatchFailed {
        /// Target of the batch.
        target_id: TargetId,
        /// Host of the placement.
        host_id: HostId,
        /// Operation kind.
        kind: OperationKind,
        /// Threads of the placement.
        threads: u32,
    },
    /// An action of unknown kind was skipped.
    UnknownAction {
        /// Target of the batch.
        target_id: TargetId,
        /// Index of the action within its batch.
        action_index: usize,
    },
    /// One pass over the pending batches finished.
    PassCompleted {
        /// Pass number, starting at 1.
        pass: u64,
        /// Time of the pass.
        at_ms: u64,
        /// Batches still pending.
        pending: usize,
        /// Current drift offset.
        drift_offset_ms: f64,
    },
    /// The run returned after waiting out in-flight operations.
    RunFinished {
        /// Projected finish of the last dispatched operation.
        execution_end_ms: u64,
    },
}

/// Receiver of scheduling events.
pub trait EventSink: Send {
    /// Record one event. Must not block.
    fn record(&mut self, event: ScheduleEvent);
}

/// Bounded in-memory event buffer; clones share the same buffer.
#[derive(Debug, Clone)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<VecDeque<ScheduleEvent>>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink keeping the latest `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ScheduleEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&mut self, event: ScheduleEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Forwards events over a bounded channel; drops them when the subscriber lags.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: Sender<ScheduleEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver a subscriber reads from.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ScheduleEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn record(&mut self, event: ScheduleEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!(?event, "event channel full, dropping event"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
