//! Per-cycle concurrency gate
//!
//! Counts the appends a drain cycle has issued and lets the drainer wait,
//! with a bound, until all of them have completed. Each registration hands
//! out a [`GatePermit`]; dropping the permit marks the append complete, so
//! every completion path releases the gate exactly once, including panics
//! and aborted tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

pub(crate) struct CycleGate {
    registered: AtomicUsize,
    pending: AtomicUsize,
    idle: Notify,
}

impl CycleGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            registered: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    /// Register one in-flight append
    pub(crate) fn register(self: &Arc<Self>) -> GatePermit {
        self.registered.fetch_add(1, Ordering::AcqRel);
        self.pending.fetch_add(1, Ordering::AcqRel);
        GatePermit {
            gate: Arc::clone(self),
        }
    }

    /// Appends registered in this cycle so far
    pub(crate) fn registered(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    /// Appends not yet completed
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn arrive(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            // stores a permit if the drainer is not waiting yet
            self.idle.notify_one();
        }
    }

    /// Wait until every registered append has completed
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub(crate) async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.pending() > 0 {
                self.idle.notified().await;
            }
        })
        .await
        .is_ok()
    }
}

/// Marks one registered append as complete when dropped
pub(crate) struct GatePermit {
    gate: Arc<CycleGate>,
}

impl GatePermit {
    pub(crate) fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.arrive();
    }
}
