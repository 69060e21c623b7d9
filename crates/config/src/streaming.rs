//! Streaming engine configuration
//!
//! Scheduling, batching and retry settings for the per-destination stream
//! processors. Every field has a default, so an empty `[streaming]` section
//! (or no section at all) yields a working engine.

use serde::Deserialize;
use std::time::Duration;

/// Default delay between scheduled drain cycles
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

/// Default delay before the first scheduled drain cycle
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Default number of drain cycles allowed to run at once across destinations
pub const DEFAULT_POOL_SIZE: usize = 200;

/// Default estimated-size ceiling for one append request
pub const DEFAULT_MAX_BATCH_BYTES: usize = 8_000_000;

/// Default number of appends registered per drain cycle before the drainer waits
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default bound on waiting for a cycle's appends to complete
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(600);

/// Default bound on `force_flush_all` and manager shutdown
pub const DEFAULT_FLUSH_ALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Default pause between reconnect attempts
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Default number of failed attempts before a batch is dropped
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Streaming engine configuration
///
/// # Example
///
/// ```toml
/// [streaming]
/// enabled = true
/// delay = "30s"
/// pool_size = 200
/// max_batch_bytes = 8000000
/// max_in_flight = 64
/// completion_timeout = "10m"
/// reconnect_backoff = "1m"
/// retry_budget = 3
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Whether streaming ingestion is enabled
    /// Default: true
    pub enabled: bool,

    /// Fixed delay between scheduled drain cycles of one destination
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Delay before the first scheduled drain cycle
    /// Default: 2s
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum concurrently running drain cycles across all destinations
    /// Default: 200
    pub pool_size: usize,

    /// Estimated byte ceiling for one batch
    /// Default: 8000000
    pub max_batch_bytes: usize,

    /// Appends registered per cycle before the drainer stops drawing batches
    /// Default: 64
    pub max_in_flight: usize,

    /// How long a drain cycle waits for its outstanding appends
    /// Default: 10m
    #[serde(with = "humantime_serde")]
    pub completion_timeout: Duration,

    /// Bound on flushing every destination at once
    /// Default: 10m
    #[serde(with = "humantime_serde")]
    pub flush_all_timeout: Duration,

    /// Pause between attempts to re-establish a lost session
    /// Default: 1m
    #[serde(with = "humantime_serde")]
    pub reconnect_backoff: Duration,

    /// Failed attempts tolerated per batch; the last one triggers a reconnect
    /// Default: 3
    pub retry_budget: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: DEFAULT_DELAY,
            initial_delay: DEFAULT_INITIAL_DELAY,
            pool_size: DEFAULT_POOL_SIZE,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            flush_all_timeout: DEFAULT_FLUSH_ALL_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}
