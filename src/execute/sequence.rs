//! Per-target sequence numbers for superseding in-flight requests.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// A submission slot: the latest ticket for a target wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub target: String,
    pub seq: u64,
}

/// Issues tickets and tells whether a ticket is still the latest for its
/// target. Responses carrying an outdated ticket are stale.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    counter: AtomicU64,
    latest: DashMap<String, u64>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket, superseding any earlier one for the same target.
    pub fn issue(&self, target: &str) -> Ticket {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.insert(target.to_string(), seq);
        Ticket {
            target: target.to_string(),
            seq,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest
            .get(&ticket.target)
            .is_some_and(|latest| *latest == ticket.seq)
    }

    /// Forget a target; all of its outstanding tickets become stale.
    pub fn retire(&self, target: &str) {
        self.latest.remove(target);
    }
}
