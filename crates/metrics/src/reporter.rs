//! Per-stream metrics reporter
//!
//! Reports metrics for individual stream processors at their configured
//! intervals. One reporter task runs per destination.

use crate::{
    HumanFormatter, JsonFormatter, StreamMetricsProvider, StreamMetricsSnapshot,
    format::MetricsFormatter,
};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tributary_config::MetricsFormat;
use tracing::info;

/// Per-stream metrics reporter
///
/// Spawn one of these for each stream processor that has metrics enabled.
pub struct StreamReporter {
    stream: Arc<dyn StreamMetricsProvider>,
    formatter: Box<dyn MetricsFormatter>,
    previous: Option<StreamMetricsSnapshot>,
}

impl StreamReporter {
    /// Create a new stream reporter
    pub fn new(stream: Arc<dyn StreamMetricsProvider>, format: MetricsFormat) -> Self {
        let formatter: Box<dyn MetricsFormatter> = match format {
            MetricsFormat::Human => Box::new(HumanFormatter::new()),
            MetricsFormat::Json => Box::new(JsonFormatter::new()),
        };

        Self {
            stream,
            formatter,
            previous: None,
        }
    }

    /// Run the reporter until cancellation
    pub async fn run(mut self, cancel: CancellationToken) {
        let config = self.stream.metrics_config();

        if !config.enabled {
            return;
        }

        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick completes immediately
        ticker.tick().await;

        info!(
            stream = self.stream.stream_id(),
            interval_secs = config.interval.as_secs(),
            "stream metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    let line = self.report(config.interval);
                    info!("{}", line);
                }
            }
        }
    }

    /// Render current metrics and remember them for the next delta
    fn report(&mut self, report_interval: Duration) -> String {
        let snapshot = self.stream.snapshot();
        let delta = match &self.previous {
            Some(prev) => delta_since(&snapshot, prev),
            None => snapshot,
        };

        let output = self.formatter.format_stream(
            self.stream.stream_id(),
            &snapshot,
            &delta,
            report_interval.as_secs(),
        );

        self.previous = Some(snapshot);
        output
    }
}

fn delta_since(current: &StreamMetricsSnapshot, prev: &StreamMetricsSnapshot) -> StreamMetricsSnapshot {
    StreamMetricsSnapshot {
        rows_accepted: current.rows_accepted.saturating_sub(prev.rows_accepted),
        rows_rejected: current.rows_rejected.saturating_sub(prev.rows_rejected),
        batches_appended: current.batches_appended.saturating_sub(prev.batches_appended),
        rows_processed: current.rows_processed.saturating_sub(prev.rows_processed),
        bytes_processed: current.bytes_processed.saturating_sub(prev.bytes_processed),
        append_failures: current.append_failures.saturating_sub(prev.append_failures),
        server_errors: current.server_errors.saturating_sub(prev.server_errors),
        retries: current.retries.saturating_sub(prev.retries),
        reconnects: current.reconnects.saturating_sub(prev.reconnects),
        batches_dropped: current.batches_dropped.saturating_sub(prev.batches_dropped),
        rows_dropped: current.rows_dropped.saturating_sub(prev.rows_dropped),
        cycle_timeouts: current.cycle_timeouts.saturating_sub(prev.cycle_timeouts),
    }
}

/// Spawn stream reporters for all streams with metrics enabled
pub fn spawn_stream_reporters(
    streams: Vec<Arc<dyn StreamMetricsProvider>>,
    format: MetricsFormat,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    streams
        .into_iter()
        .filter(|stream| stream.metrics_config().enabled)
        .map(|stream| {
            let reporter = StreamReporter::new(stream, format);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                reporter.run(cancel).await;
            })
        })
        .collect()
}
