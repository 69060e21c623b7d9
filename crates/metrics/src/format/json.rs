//! One JSON object per report, totals flattened next to the period fields
//!
//! ```json
//! {"type":"stream","stream_id":"proj.ds.events","period_secs":60,"rows_processed":1200000,...}
//! ```

use super::MetricsFormatter;
use crate::StreamMetricsSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct StreamReportJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    stream_id: &'a str,
    period_secs: u64,
    rows_in_period: u64,
    #[serde(flatten)]
    totals: &'a StreamMetricsSnapshot,
}

impl MetricsFormatter for JsonFormatter {
    fn format_stream(
        &self,
        stream_id: &str,
        snapshot: &StreamMetricsSnapshot,
        delta: &StreamMetricsSnapshot,
        interval_secs: u64,
    ) -> String {
        let json = StreamReportJson {
            report_type: "stream",
            stream_id,
            period_secs: interval_secs,
            rows_in_period: delta.rows_processed,
            totals: snapshot,
        };

        // counters only, so serialization cannot fail in practice
        serde_json::to_string(&json).unwrap_or_default()
    }
}
