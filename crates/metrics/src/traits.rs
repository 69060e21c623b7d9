//! Metrics provider traits
//!
//! Stream processors expose their counters through `StreamMetricsProvider`
//! so the reporter can collect them without knowing the concrete types.
//!
//! # Design
//!
//! - Traits use `&self` for zero-copy metric access
//! - All providers are `Send + Sync` for thread-safe collection
//! - Metric structs use atomics internally, so no locks needed

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics for one stream processor (one destination)
///
/// Updated from the drain loop and from completion tasks concurrently.
/// All fields use atomics for lock-free updates.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Rows accepted into the accept queue
    pub rows_accepted: AtomicU64,
    /// Rows rejected by `put` (processor not running or empty row)
    pub rows_rejected: AtomicU64,
    /// Append calls issued (including retries)
    pub batches_appended: AtomicU64,
    /// Rows acknowledged by the write service
    pub rows_processed: AtomicU64,
    /// Estimated bytes acknowledged by the write service
    pub bytes_processed: AtomicU64,
    /// Appends that failed at the transport level
    pub append_failures: AtomicU64,
    /// Appends acknowledged with an error in the response body
    pub server_errors: AtomicU64,
    /// Batches requeued onto the fallback queue
    pub retries: AtomicU64,
    /// Session re-establishments after repeated failures
    pub reconnects: AtomicU64,
    /// Batches dropped permanently
    pub batches_dropped: AtomicU64,
    /// Rows lost with dropped batches
    pub rows_dropped: AtomicU64,
    /// Drain cycles whose completion wait timed out
    pub cycle_timeouts: AtomicU64,
}

impl StreamMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            rows_accepted: AtomicU64::new(0),
            rows_rejected: AtomicU64::new(0),
            batches_appended: AtomicU64::new(0),
            rows_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            append_failures: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            rows_dropped: AtomicU64::new(0),
            cycle_timeouts: AtomicU64::new(0),
        }
    }

    /// Record rows accepted into the queue
    #[inline]
    pub fn record_accepted(&self, rows: u64) {
        self.rows_accepted.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record rows rejected by `put`
    #[inline]
    pub fn record_rejected(&self, rows: u64) {
        self.rows_rejected.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record an append call
    #[inline]
    pub fn record_appended(&self) {
        self.batches_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acknowledged append
    #[inline]
    pub fn record_processed(&self, rows: u64, bytes: u64) {
        self.rows_processed.fetch_add(rows, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a transport failure
    #[inline]
    pub fn record_failure(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error reported inside a successful response
    #[inline]
    pub fn record_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch requeued for retry
    #[inline]
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reconnect
    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped batch
    #[inline]
    pub fn record_dropped(&self, rows: u64) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.rows_dropped.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record a timed out drain cycle
    #[inline]
    pub fn record_cycle_timeout(&self) {
        self.cycle_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    #[inline]
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            rows_accepted: self.rows_accepted.load(Ordering::Relaxed),
            rows_rejected: self.rows_rejected.load(Ordering::Relaxed),
            batches_appended: self.batches_appended.load(Ordering::Relaxed),
            rows_processed: self.rows_processed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
            cycle_timeouts: self.cycle_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of stream metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StreamMetricsSnapshot {
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub batches_appended: u64,
    pub rows_processed: u64,
    pub bytes_processed: u64,
    pub append_failures: u64,
    pub server_errors: u64,
    pub retries: u64,
    pub reconnects: u64,
    pub batches_dropped: u64,
    pub rows_dropped: u64,
    pub cycle_timeouts: u64,
}

/// Per-stream metrics reporting configuration
#[derive(Debug, Clone, Copy)]
pub struct StreamMetricsConfig {
    /// Whether reporting is enabled for this stream
    pub enabled: bool,
    /// Reporting interval for this stream
    pub interval: Duration,
}

impl Default for StreamMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

/// Trait for stream processors to provide metrics to the reporter
pub trait StreamMetricsProvider: Send + Sync {
    /// Destination this stream writes to (`project.dataset.table`)
    fn stream_id(&self) -> &str;

    /// Get per-stream metrics configuration
    fn metrics_config(&self) -> StreamMetricsConfig;

    /// Get a snapshot of current metrics
    fn snapshot(&self) -> StreamMetricsSnapshot;
}
