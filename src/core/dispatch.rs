//! Fire-and-forget dispatch of timed remote operations.

use std::sync::Arc;

use crate::core::model::OperationKind;

/// Launches operations on hosts.
///
/// A dispatch only reports whether the launch was accepted. What happens to
/// the operation afterwards is not tracked.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_batch_scheduler::core::{Dispatcher, OperationKind};
///
/// struct Echo;
///
/// impl Dispatcher for Echo {
///     fn dispatch(&self, kind: OperationKind, host_id: &str, target_id: &str, threads: u32, delay_msec: u64) -> bool {
///         println!("{kind} x{threads} on {host_id} -> {target_id} in {delay_msec}ms");
///         true
///     }
/// }
/// ```
pub trait Dispatcher: Send + Sync {
    /// Launch `threads` threads of `kind` on `host_id` against `target_id`,
    /// delayed by `delay_msec`. Returns false when the launch failed.
    fn dispatch(
        &self,
        kind: OperationKind,
        host_id: &str,
        target_id: &str,
        threads: u32,
        delay_msec: u64,
    ) -> bool;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn dispatch(
        &self,
        kind: OperationKind,
        host_id: &str,
        target_id: &str,
        threads: u32,
        delay_msec: u64,
    ) -> bool {
        (**self).dispatch(kind, host_id, target_id, threads, delay_msec)
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn dispatch(
        &self,
        kind: OperationKind,
        host_id: &str,
        target_id: &str,
        threads: u32,
        delay_msec: u64,
    ) -> bool {
        (**self).dispatch(kind, host_id, target_id, threads, delay_msec)
    }
}
