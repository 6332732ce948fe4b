//! Real-time batch executor.
//!
//! A single cooperative loop walks the pending batches once per pass. A
//! batch is pending until its scheduling window opens, then fires whenever
//! all of its actions can be placed on the host pool at once. Each firing
//! consumes one repeat; a batch retires when its repeats run out or its
//! window closes. Between passes the loop sleeps until the next relevant
//! instant, pulled earlier by the drift compensator.
//!
//! Capacity taken by a firing is not handed back when the operations finish;
//! hosts are re-measured by the next planning run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::capacity::HostPool;
use crate::core::dispatch::Dispatcher;
use crate::core::drift::DriftCompensator;
use crate::core::events::{EventSink, ScheduleEvent};
use crate::core::model::{Batch, Host, OperationKind};

/// Source of time for the executor, in milliseconds.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time.
    fn now_ms(&self) -> u64;

    /// Suspend until `deadline_ms`. Returns at once for past deadlines.
    async fn sleep_until(&self, deadline_ms: u64);
}

/// Outcome counters of one executor run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// Passes over the pending batches.
    pub passes: u64,
    /// Successful firings.
    pub fired: u64,
    /// Firing attempts that did not fit the host pool.
    pub skipped: u64,
    /// Batches retired because their window closed.
    pub expired: u64,
    /// Batches retired after their last repeat.
    pub exhausted: u64,
    /// Threads accepted by the dispatcher.
    pub dispatched_threads: u64,
    /// Placements the dispatcher refused.
    pub failed_dispatches: u64,
    /// Actions dropped for having an unknown kind.
    pub unknown_actions: u64,
    /// Drift offset when the run ended.
    pub drift_offset_ms: f64,
    /// Projected finish of the last dispatched operation, relative to loop start.
    pub execution_end_ms: u64,
}

struct Tracked {
    batch: Batch,
    next_fire: u64,
}

enum Firing {
    Fired(u64),
    Skipped,
    Failed(u64),
}

/// Drives composed batches against a clock, a host pool, and a dispatcher.
pub struct Executor<C, D> {
    clock: C,
    dispatcher: D,
    pool: HostPool,
    interval_ms: u64,
    drift: DriftCompensator,
    events: Option<Box<dyn EventSink>>,
}

impl<C: Clock, D: Dispatcher> Executor<C, D> {
    /// Create an executor owning the host capacity of `hosts`.
    pub fn new(clock: C, dispatcher: D, hosts: Vec<Host>, interval_ms: u64, drift_alpha: f64) -> Self {
        Self {
            clock,
            dispatcher,
            pool: HostPool::new(hosts),
            interval_ms: interval_ms.max(1),
            drift: DriftCompensator::new(drift_alpha),
            events: None,
        }
    }

    /// Attach an event sink.
    #[must_use]
    pub fn with_events(mut self, sink: Box<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Host capacity as left by the runs so far.
    pub const fn host_pool(&self) -> &HostPool {
        &self.pool
    }

    /// Give back the hosts.
    pub fn into_hosts(self) -> Vec<Host> {
        self.pool.hosts().to_vec()
    }

    /// Run until every batch has retired, then wait out the projected finish
    /// of the last dispatched operation.
    pub async fn run(&mut self, batches: Vec<Batch>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let start = self.clock.now_ms();
        let widest = batches.iter().map(|b| b.actions.len()).max().unwrap_or(0).max(1);
        let spacing = (widest as u64).saturating_mul(self.interval_ms);

        let mut pending = Vec::with_capacity(batches.len());
        for batch in batches {
            if let Some(tracked) = self.admit(batch, &mut report) {
                pending.push(tracked);
            }
        }
        info!(batches = pending.len(), spacing, "executor started");

        let mut execution_end = 0_u64;
        let mut next_pass = 0_u64;
        while !pending.is_empty() {
            let wake = self.drift.adjust(next_pass);
            self.clock.sleep_until(start.saturating_add(wake)).await;
            let now = self.clock.now_ms().saturating_sub(start);
            self.drift.observe(next_pass, now);
            report.passes += 1;

            let mut next = u64::MAX;
            let mut index = 0;
            while index < pending.len() {
                let tracked = &mut pending[index];
                let batch = &tracked.batch;

                if now < batch.scheduling_start_time {
                    next = next.min(batch.scheduling_start_time);
                    index += 1;
                    continue;
                }
                if now >= batch.scheduling_end_time {
                    debug!(target_id = %batch.target_id, repeat_left = batch.repeat_count, "batch expired");
                    report.expired += 1;
                    let retired = pending.swap_remove(index);
                    self.emit(ScheduleEvent::BatchExpired {
                        target_id: retired.batch.target_id,
                        repeat_left: retired.batch.repeat_count,
                        at_ms: now,
                    });
                    continue;
                }
                if tracked.next_fire > now {
                    next = next.min(tracked.next_fire);
                    index += 1;
                    continue;
                }

                let firing = Self::fire(
                    &mut self.pool,
                    &self.dispatcher,
                    &mut self.events,
                    &mut report,
                    &tracked.batch,
                    now,
                );
                tracked.next_fire = now.saturating_add(spacing);
                match firing {
                    Firing::Fired(threads) | Firing::Failed(threads) if threads > 0 => {
                        let projected = now
                            .saturating_add(tracked.batch.max_duration)
                            .saturating_add(spacing);
                        execution_end = execution_end.max(projected);
                    }
                    _ => {}
                }
                if let Firing::Fired(threads) = firing {
                    tracked.batch.repeat_count -= 1;
                    report.fired += 1;
                    let repeat_left = tracked.batch.repeat_count;
                    info!(target_id = %tracked.batch.target_id, threads, repeat_left, at_ms = now, "batch fired");
                    let target_id = tracked.batch.target_id.clone();
                    self.emit(ScheduleEvent::BatchFired {
                        target_id: target_id.clone(),
                        threads,
                        repeat_left,
                        at_ms: now,
                    });
                    if repeat_left == 0 {
                        report.exhausted += 1;
                        pending.swap_remove(index);
                        self.emit(ScheduleEvent::BatchExhausted { target_id, at_ms: now });
                        continue;
                    }
                }
                next = next.min(pending[index].next_fire);
                index += 1;
            }

            let drift_offset_ms = self.drift.offset_ms();
            self.emit(ScheduleEvent::PassCompleted {
                pass: report.passes,
                at_ms: now,
                pending: pending.len(),
                drift_offset_ms,
            });
            next_pass = next;
        }

        debug!(execution_end, "waiting for in-flight operations");
        self.clock.sleep_until(start.saturating_add(execution_end)).await;
        report.execution_end_ms = execution_end;
        report.drift_offset_ms = self.drift.offset_ms();
        self.emit(ScheduleEvent::RunFinished { execution_end_ms: execution_end });
        info!(
            passes = report.passes,
            fired = report.fired,
            skipped = report.skipped,
            expired = report.expired,
            exhausted = report.exhausted,
            "executor finished"
        );
        report
    }

    /// Drop unknown actions and batches with nothing left to do.
    fn admit(&mut self, mut batch: Batch, report: &mut ExecutionReport) -> Option<Tracked> {
        let mut action_index = 0;
        batch.actions.retain(|action| {
            let keep = action.kind != OperationKind::Unknown;
            if !keep {
                warn!(target_id = %batch.target_id, action_index, "unknown operation kind, skipping action");
                report.unknown_actions += 1;
                if let Some(sink) = self.events.as_mut() {
                    sink.record(ScheduleEvent::UnknownAction {
                        target_id: batch.target_id.clone(),
                        action_index,
                    });
                }
            }
            action_index += 1;
            keep
        });

        if batch.repeat_count == 0 || batch.total_threads() == 0 {
            debug!(target_id = %batch.target_id, "nothing to fire, retiring batch");
            report.exhausted += 1;
            self.emit(ScheduleEvent::BatchExhausted {
                target_id: batch.target_id,
                at_ms: 0,
            });
            return None;
        }
        Some(Tracked { batch, next_fire: 0 })
    }

    fn fire(
        pool: &mut HostPool,
        dispatcher: &D,
        events: &mut Option<Box<dyn EventSink>>,
        report: &mut ExecutionReport,
        batch: &Batch,
        now: u64,
    ) -> Firing {
        let Some(placements) = pool.try_place(&batch.actions) else {
            report.skipped += 1;
            let (threads, available) = (batch.total_threads(), pool.available());
            debug!(target_id = %batch.target_id, threads, available, "batch skipped, not enough capacity");
            if let Some(sink) = events.as_mut() {
                sink.record(ScheduleEvent::BatchSkipped {
                    target_id: batch.target_id.clone(),
                    threads,
                    available,
                    at_ms: now,
                });
            }
            return Firing::Skipped;
        };

        let mut dispatched = 0_u64;
        let mut failed = false;
        for placement in &placements {
            let action = &batch.actions[placement.action_index];
            let delay = u64::try_from(action.offset_msec).unwrap_or(0);
            if dispatcher.dispatch(action.kind, &placement.host_id, &batch.target_id, placement.threads, delay) {
                dispatched += u64::from(placement.threads);
                continue;
            }
            warn!(
                target_id = %batch.target_id,
                host_id = %placement.host_id,
                kind = %action.kind,
                threads = placement.threads,
                "dispatch failed"
            );
            failed = true;
            report.failed_dispatches += 1;
            pool.release(placement);
            if let Some(sink) = events.as_mut() {
                sink.record(ScheduleEvent::DispatchFailed {
                    target_id: batch.target_id.clone(),
                    host_id: placement.host_id.clone(),
                    kind: action.kind,
                    threads: placement.threads,
                });
            }
        }
        report.dispatched_threads += dispatched;
        if failed {
            Firing::Failed(dispatched)
        } else {
            Firing::Fired(dispatched)
        }
    }

    fn emit(&mut self, event: ScheduleEvent) {
        if let Some(sink) = self.events.as_mut() {
            sink.record(event);
        }
    }
}
