//! Single-owner host capacity pool used by the executor.
//!
//! Placement walks hosts in a fixed order and greedily takes
//! `min(available, remaining)` from each. A batch is placed as a whole: either
//! every action finds its full thread count or the pool is left unchanged.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::model::{Host, HostId, ThreadAction};

/// Threads of one action committed on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Index of the action within its batch.
    pub action_index: usize,
    /// Host the threads run on.
    pub host_id: HostId,
    /// Threads taken from that host.
    pub threads: u32,
}

/// Capacity ledger over a fixed, ordered set of hosts.
#[derive(Debug, Clone)]
pub struct HostPool {
    hosts: Vec<Host>,
}

impl HostPool {
    /// Take ownership of the hosts; their order is the placement order.
    #[must_use]
    pub const fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    /// Current host states.
    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Free threads across every host.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.hosts.iter().map(|h| u64::from(h.capacity_available)).sum()
    }

    /// Threads across every host when idle.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.hosts.iter().map(|h| u64::from(h.capacity_total)).sum()
    }

    /// Place every action of a batch, or nothing.
    ///
    /// Returns `None` when any action cannot be fully placed. Zero-amount
    /// actions produce no placements.
    pub fn try_place(&mut self, actions: &[ThreadAction]) -> Option<Vec<Placement>> {
        let mut free: Vec<u32> = self.hosts.iter().map(|h| h.capacity_available).collect();
        let mut plan = Vec::new();

        for (action_index, action) in actions.iter().enumerate() {
            let mut remaining = action.amount;
            for (slot, host) in free.iter_mut().zip(&self.hosts) {
                if remaining == 0 {
                    break;
                }
                let take = (*slot).min(remaining);
                if take == 0 {
                    continue;
                }
                *slot -= take;
                remaining -= take;
                plan.push(Placement {
                    action_index,
                    host_id: host.id.clone(),
                    threads: take,
                });
            }
            if remaining > 0 {
                debug!(action_index, missing = remaining, "batch does not fit host pool");
                return None;
            }
        }

        for (host, left) in self.hosts.iter_mut().zip(free) {
            host.capacity_available = left;
        }
        Some(plan)
    }

    /// Return a placement's threads to its host, never above its total.
    pub fn release(&mut self, placement: &Placement) {
        if let Some(host) = self.hosts.iter_mut().find(|h| h.id == placement.host_id) {
            host.capacity_available = host
                .capacity_available
                .saturating_add(placement.threads)
                .min(host.capacity_total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::OperationKind;

    fn action(amount: u32) -> ThreadAction {
        ThreadAction {
            kind: OperationKind::Suppress,
            amount,
            offset_msec: 0,
        }
    }

    #[test]
    fn test_greedy_in_host_order() {
        let mut pool = HostPool::new(vec![Host::new("a", 10), Host::new("b", 10)]);
        let plan = pool.try_place(&[action(14)]).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!((plan[0].host_id.as_str(), plan[0].threads), ("a", 10));
        assert_eq!((plan[1].host_id.as_str(), plan[1].threads), ("b", 4));
        assert_eq!(pool.available(), 6);
    }

    #[test]
    fn test_partial_fit_leaves_pool_untouched() {
        let mut pool = HostPool::new(vec![Host::new("a", 10), Host::new("b", 5)]);
        assert!(pool.try_place(&[action(8), action(8)]).is_none());
        assert_eq!(pool.available(), 15);
        assert!(pool.hosts().iter().all(|h| h.capacity_available == h.capacity_total));
    }

    #[test]
    fn test_release_caps_at_total() {
        let mut pool = HostPool::new(vec![Host::new("a", 10)]);
        let plan = pool.try_place(&[action(4)]).unwrap();
        pool.release(&plan[0]);
        pool.release(&plan[0]);
        assert_eq!(pool.available(), 10);
    }

    #[test]
    fn test_zero_amount_places_nothing() {
        let mut pool = HostPool::new(vec![Host::new("a", 0)]);
        assert_eq!(pool.try_place(&[action(0)]), Some(Vec::new()));
    }
}
