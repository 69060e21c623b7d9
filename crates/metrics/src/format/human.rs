//! Human-readable metrics formatter
//!
//! # Example Output
//!
//! ```text
//! [stream:proj.ds.events] period: 60s | rows: 1.2M (+250.0K) | bytes: 45.3 MB | queued-fail: 0 | dropped: 0
//! ```

use super::{MetricsFormatter, format_bytes, format_count};
use crate::StreamMetricsSnapshot;
use std::fmt::Write;

/// Human-readable metrics formatter
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter;

impl HumanFormatter {
    /// Create a new human formatter
    pub fn new() -> Self {
        Self
    }
}

impl MetricsFormatter for HumanFormatter {
    fn format_stream(
        &self,
        stream_id: &str,
        snapshot: &StreamMetricsSnapshot,
        delta: &StreamMetricsSnapshot,
        interval_secs: u64,
    ) -> String {
        let mut output = format!(
            "[stream:{}] period: {}s | rows: {} (+{}) | bytes: {} | appends: {}",
            stream_id,
            interval_secs,
            format_count(snapshot.rows_processed),
            format_count(delta.rows_processed),
            format_bytes(snapshot.bytes_processed),
            format_count(snapshot.batches_appended),
        );

        if snapshot.append_failures > 0 || snapshot.server_errors > 0 {
            let _ = write!(
                output,
                " | failures: {} | server errors: {} | retries: {} | reconnects: {}",
                snapshot.append_failures,
                snapshot.server_errors,
                snapshot.retries,
                snapshot.reconnects,
            );
        }

        if snapshot.batches_dropped > 0 {
            let _ = write!(
                output,
                " | dropped: {} batches ({} rows)",
                snapshot.batches_dropped, snapshot.rows_dropped,
            );
        }

        if snapshot.rows_rejected > 0 {
            let _ = write!(output, " | rejected: {}", snapshot.rows_rejected);
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_healthy_stream() {
        let snapshot = StreamMetricsSnapshot {
            rows_processed: 1_500_000,
            bytes_processed: 2048,
            batches_appended: 12,
            ..Default::default()
        };
        let delta = StreamMetricsSnapshot {
            rows_processed: 1500,
            ..Default::default()
        };

        let out = HumanFormatter::new().format_stream("p.d.t", &snapshot, &delta, 60);
        assert!(out.starts_with("[stream:p.d.t]"));
        assert!(out.contains("rows: 1.5M (+1.5K)"));
        assert!(out.contains("bytes: 2.0 KB"));
        assert!(!out.contains("failures"));
        assert!(!out.contains("dropped"));
    }

    #[test]
    fn test_format_unhealthy_stream() {
        let snapshot = StreamMetricsSnapshot {
            append_failures: 4,
            retries: 3,
            reconnects: 1,
            batches_dropped: 1,
            rows_dropped: 250,
            rows_rejected: 7,
            ..Default::default()
        };

        let out = HumanFormatter::new().format_stream("p.d.t", &snapshot, &snapshot, 10);
        assert!(out.contains("failures: 4"));
        assert!(out.contains("reconnects: 1"));
        assert!(out.contains("dropped: 1 batches (250 rows)"));
        assert!(out.contains("rejected: 7"));
    }
}
