//! Message-passing dispatcher backed by dedicated OS threads.
//!
//! The control loop hands requests to a bounded queue and returns at once;
//! worker threads launch them through an inner dispatcher and publish a
//! [`DispatchOutcome`] per request on a completion channel. Nothing polls:
//! workers block on `recv` and exit when the sender is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::core::{Dispatcher, EngineError, OperationKind};

/// Result of one pooled launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Sequence number assigned at submission.
    pub request_id: u64,
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
    /// Whether the inner dispatcher accepted the launch.
    pub accepted: bool,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Worker threads.
    pub worker_count: usize,
    /// Requests queued.
    pub submitted: u64,
    /// Requests the inner dispatcher accepted.
    pub completed: u64,
    /// Requests the inner dispatcher refused.
    pub failed: u64,
    /// Requests refused because the queue was full or shut down.
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

struct Request {
    request_id: u64,
    kind: OperationKind,
    host_id: String,
    target_id: String,
    threads: u32,
    delay_msec: u64,
}

/// Dispatcher that launches through a worker pool.
///
/// `dispatch` returns true once the request is queued; the launch result
/// arrives later on [`PooledDispatcher::outcomes`].
pub struct PooledDispatcher {
    config: DispatchConfig,
    request_tx: Mutex<Option<Sender<Request>>>,
    outcome_rx: Receiver<DispatchOutcome>,
    counters: Arc<Counters>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl PooledDispatcher {
    /// Start `config.worker_count` workers launching through `inner`.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` for invalid settings, `EngineError::Io`
    /// if a worker thread cannot be spawned.
    pub fn new<D>(config: DispatchConfig, inner: D) -> Result<Self, EngineError>
    where
        D: Dispatcher + 'static,
    {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let (request_tx, request_rx) = bounded::<Request>(config.max_queue_depth);
        let (outcome_tx, outcome_rx) = bounded::<DispatchOutcome>(config.max_queue_depth);
        let inner = Arc::new(inner);
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = spawn_worker(
                worker_id,
                request_rx.clone(),
                outcome_tx.clone(),
                Arc::clone(&inner),
                Arc::clone(&counters),
                config.thread_stack_size,
            )?;
            workers.push(worker);
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "dispatch pool started"
        );

        Ok(Self {
            config,
            request_tx: Mutex::new(Some(request_tx)),
            outcome_rx,
            counters,
            shutdown,
            workers: Mutex::new(workers),
            next_id: AtomicU64::new(0),
        })
    }

    /// Completion channel; each queued request yields one outcome unless the
    /// channel was full when it completed.
    #[must_use]
    pub fn outcomes(&self) -> Receiver<DispatchOutcome> {
        self.outcome_rx.clone()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            worker_count: self.config.worker_count,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting requests, let workers drain the queue, and join them.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down dispatch pool");
        self.request_tx.lock().take();

        let mut workers = self.workers.lock();
        for (worker_id, worker) in workers.drain(..).enumerate() {
            if worker.join().is_err() {
                warn!(worker_id, "dispatch worker panicked");
            }
        }
    }
}

impl Dispatcher for PooledDispatcher {
    fn dispatch(
        &self,
        kind: OperationKind,
        host_id: &str,
        target_id: &str,
        threads: u32,
        delay_msec: u64,
    ) -> bool {
        let guard = self.request_tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let request = Request {
            request_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            host_id: host_id.to_string(),
            target_id: target_id.to_string(),
            threads,
            delay_msec,
        };
        match tx.try_send(request) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(request)) => {
                warn!(request_id = request.request_id, host_id, target_id, "dispatch queue full");
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl Drop for PooledDispatcher {
    fn drop(&mut self) {
        // Workers exit on their own once the sender is gone.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.request_tx.lock().take();
            debug!("dispatch pool dropped without shutdown, detaching workers");
        }
    }
}

fn spawn_worker<D>(
    worker_id: usize,
    request_rx: Receiver<Request>,
    outcome_tx: Sender<DispatchOutcome>,
    inner: Arc<D>,
    counters: Arc<Counters>,
    stack_size: usize,
) -> Result<JoinHandle<()>, EngineError>
where
    D: Dispatcher + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("batch-dispatch-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "dispatch worker started");
            while let Ok(request) = request_rx.recv() {
                let accepted = inner.dispatch(
                    request.kind,
                    &request.host_id,
                    &request.target_id,
                    request.threads,
                    request.delay_msec,
                );
                if accepted {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                let outcome = DispatchOutcome {
                    request_id: request.request_id,
                    kind: request.kind,
                    host_id: request.host_id,
                    target_id: request.target_id,
                    threads: request.threads,
                    delay_msec: request.delay_msec,
                    accepted,
                };
                if let Err(TrySendError::Full(outcome)) = outcome_tx.try_send(outcome) {
                    debug!(worker_id, request_id = outcome.request_id, "outcome channel full, dropping outcome");
                }
            }
            debug!(worker_id, "dispatch worker exiting");
        })?;
    Ok(handle)
}
