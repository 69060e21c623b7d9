//! Metrics handle for stream processors

use std::sync::Arc;

use tributary_metrics::{
    StreamMetrics, StreamMetricsConfig, StreamMetricsProvider, StreamMetricsSnapshot,
};

/// Handle for reporting a processor's metrics
///
/// Holds an `Arc` to the counters, so it stays valid after the processor is
/// closed and deregistered.
#[derive(Clone)]
pub struct ProcessorMetricsHandle {
    id: String,
    metrics: Arc<StreamMetrics>,
    config: StreamMetricsConfig,
}

impl ProcessorMetricsHandle {
    pub(crate) fn new(id: String, metrics: Arc<StreamMetrics>, config: StreamMetricsConfig) -> Self {
        Self {
            id,
            metrics,
            config,
        }
    }
}

impl StreamMetricsProvider for ProcessorMetricsHandle {
    fn stream_id(&self) -> &str {
        &self.id
    }

    fn metrics_config(&self) -> StreamMetricsConfig {
        self.config
    }

    fn snapshot(&self) -> StreamMetricsSnapshot {
        self.metrics.snapshot()
    }
}
