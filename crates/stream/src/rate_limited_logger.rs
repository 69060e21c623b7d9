//! Rate-limited rejection logging
//!
//! A caller that keeps putting rows into a processor that is not accepting
//! them would otherwise produce one error line per call. This logs at most
//! once per interval and reports how many rejections were folded into it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub(crate) struct RateLimitedLogger {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    /// Rows rejected since the last log line
    pending_rows: AtomicU64,
    total_rows: AtomicU64,
}

impl RateLimitedLogger {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            pending_rows: AtomicU64::new(0),
            total_rows: AtomicU64::new(0),
        }
    }

    /// Record rejected rows and log if the interval has passed
    ///
    /// Returns true if a line was written.
    pub(crate) fn rejected(&self, destination: &str, reason: &str, rows: u64) -> bool {
        self.pending_rows.fetch_add(rows, Ordering::Relaxed);
        self.total_rows.fetch_add(rows, Ordering::Relaxed);

        if !self.should_log() {
            return false;
        }

        let pending = self.pending_rows.swap(0, Ordering::Relaxed);
        let total = self.total_rows.load(Ordering::Relaxed);
        tracing::error!(
            destination = %destination,
            reason = %reason,
            rows = pending,
            total_rejected = total,
            "rows rejected"
        );
        true
    }

    fn should_log(&self) -> bool {
        let mut last = self.last_log_time.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_rows(&self) -> u64 {
        self.pending_rows.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn total_rows(&self) -> u64 {
        self.total_rows.load(Ordering::Relaxed)
    }
}
