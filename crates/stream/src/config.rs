//! Runtime settings for processors and the manager
//!
//! Built from `tributary_config` sections, or directly with the `with_*`
//! builders in tests and embedded use.

use std::time::Duration;

use tributary_config::{
    Config, DEFAULT_COMPLETION_TIMEOUT, DEFAULT_DELAY, DEFAULT_FLUSH_ALL_TIMEOUT,
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_IN_FLIGHT, DEFAULT_POOL_SIZE,
    DEFAULT_RECONNECT_BACKOFF, DEFAULT_RETRY_BUDGET, StreamingConfig,
};
use tributary_metrics::StreamMetricsConfig;

/// Minimum interval between repeated rejection logs for one processor
pub const DEFAULT_REJECT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Settings for one stream processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Estimated byte ceiling per batch
    pub max_batch_bytes: usize,
    /// Appends registered per drain cycle before the drainer waits
    pub max_in_flight: usize,
    /// Bound on waiting for a cycle's appends
    pub completion_timeout: Duration,
    /// Pause between failed reconnect attempts
    pub reconnect_backoff: Duration,
    /// Failed attempts before a batch is dropped
    pub retry_budget: u32,
    /// Minimum interval between rejection log lines
    pub reject_log_interval: Duration,
    /// Metrics reporting for this processor
    pub metrics: StreamMetricsConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            retry_budget: DEFAULT_RETRY_BUDGET,
            reject_log_interval: DEFAULT_REJECT_LOG_INTERVAL,
            metrics: StreamMetricsConfig::default(),
        }
    }
}

impl ProcessorConfig {
    #[must_use]
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: StreamMetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }
}

impl From<&StreamingConfig> for ProcessorConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            max_batch_bytes: config.max_batch_bytes,
            max_in_flight: config.max_in_flight,
            completion_timeout: config.completion_timeout,
            reconnect_backoff: config.reconnect_backoff,
            retry_budget: config.retry_budget,
            ..Self::default()
        }
    }
}

/// Settings for the streaming manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Fixed delay between scheduled drain cycles
    pub delay: Duration,
    /// Delay before a new processor's first scheduled cycle
    pub initial_delay: Duration,
    /// Drain cycles allowed to run at once across destinations
    pub pool_size: usize,
    /// Bound on `force_flush_all` and `shutdown`
    pub flush_all_timeout: Duration,
    /// Settings applied to every processor the manager creates
    pub processor: ProcessorConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            initial_delay: DEFAULT_INITIAL_DELAY,
            pool_size: DEFAULT_POOL_SIZE,
            flush_all_timeout: DEFAULT_FLUSH_ALL_TIMEOUT,
            processor: ProcessorConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Build from a loaded configuration file
    pub fn from_config(config: &Config) -> Self {
        let streaming = &config.streaming;
        let processor = ProcessorConfig::from(streaming).with_metrics(StreamMetricsConfig {
            enabled: config.metrics.enabled,
            interval: config.metrics.interval,
        });

        Self {
            delay: streaming.delay,
            initial_delay: streaming.initial_delay,
            pool_size: streaming.pool_size,
            flush_all_timeout: streaming.flush_all_timeout,
            processor,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    #[must_use]
    pub fn with_flush_all_timeout(mut self, timeout: Duration) -> Self {
        self.flush_all_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_processor(mut self, processor: ProcessorConfig) -> Self {
        self.processor = processor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.delay, Duration::from_secs(30));
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.pool_size, 200);
        assert_eq!(config.processor.max_batch_bytes, 8_000_000);
        assert_eq!(config.processor.max_in_flight, 64);
        assert_eq!(config.processor.retry_budget, 3);
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_str(
            r#"
[metrics]
enabled = false
interval = "5s"

[streaming]
delay = "1s"
max_in_flight = 4
retry_budget = 2
"#,
        )
        .unwrap();

        let manager = ManagerConfig::from_config(&config);
        assert_eq!(manager.delay, Duration::from_secs(1));
        assert_eq!(manager.processor.max_in_flight, 4);
        assert_eq!(manager.processor.retry_budget, 2);
        assert!(!manager.processor.metrics.enabled);
        assert_eq!(manager.processor.metrics.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = ManagerConfig::default()
            .with_delay(Duration::from_millis(100))
            .with_pool_size(2)
            .with_processor(ProcessorConfig::default().with_max_batch_bytes(10));

        assert_eq!(config.delay, Duration::from_millis(100));
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.processor.max_batch_bytes, 10);
    }
}
