//! Retry bookkeeping
//!
//! Attempts are counted per batch identity. The budget decides when a batch
//! triggers a session reconnect and when it is dropped for good.

use dashmap::DashMap;

use crate::batch::BatchId;

/// What to do with a batch after a retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Put it back on the fallback queue unchanged
    Requeue,
    /// Re-establish the session, then requeue
    ReconnectThenRequeue,
    /// Give up on the batch
    Drop,
}

/// Attempt counters keyed by batch identity
pub(crate) struct RetryTracker {
    attempts: DashMap<BatchId, u32>,
    budget: u32,
}

impl RetryTracker {
    pub(crate) fn new(budget: u32) -> Self {
        Self {
            attempts: DashMap::new(),
            budget,
        }
    }

    /// Count a failed attempt and decide what happens next
    ///
    /// The entry is removed when the batch is dropped.
    pub(crate) fn record_failure(&self, id: BatchId) -> (u32, RetryDecision) {
        let attempts = {
            let mut entry = self.attempts.entry(id).or_insert(0);
            *entry += 1;
            *entry
        };

        let decision = decide(attempts, self.budget);
        if decision == RetryDecision::Drop {
            self.attempts.remove(&id);
        }
        (attempts, decision)
    }

    /// Forget a batch after it was acknowledged
    pub(crate) fn clear(&self, id: BatchId) {
        self.attempts.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self, id: BatchId) -> u32 {
        self.attempts.get(&id).map(|v| *v).unwrap_or(0)
    }

    /// Batches with at least one failed attempt still tracked
    pub(crate) fn len(&self) -> usize {
        self.attempts.len()
    }
}

fn decide(attempts: u32, budget: u32) -> RetryDecision {
    match attempts.cmp(&budget) {
        std::cmp::Ordering::Less => RetryDecision::Requeue,
        std::cmp::Ordering::Equal => RetryDecision::ReconnectThenRequeue,
        std::cmp::Ordering::Greater => RetryDecision::Drop,
    }
}
