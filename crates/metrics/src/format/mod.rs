//! Report formatters
//!
//! A formatter renders one destination's counters into a single line.
//! [`HumanFormatter`] is for terminals, [`JsonFormatter`] for log pipelines.

mod human;
mod json;

pub use human::HumanFormatter;
pub use json::JsonFormatter;

use crate::StreamMetricsSnapshot;

pub trait MetricsFormatter: Send + Sync {
    /// Render one report for `stream_id`
    ///
    /// `snapshot` holds the running totals and `delta` the change since the
    /// previous report (the totals themselves on the first report).
    fn format_stream(
        &self,
        stream_id: &str,
        snapshot: &StreamMetricsSnapshot,
        delta: &StreamMetricsSnapshot,
        interval_secs: u64,
    ) -> String;
}

const BYTE_UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];
const COUNT_UNITS: [(u64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];

/// Scale `value` by the largest unit it reaches, one decimal place
fn scaled(value: u64, units: &[(u64, &str)], separator: &str) -> Option<String> {
    units
        .iter()
        .find(|(size, _)| value >= *size)
        .map(|(size, unit)| format!("{:.1}{separator}{unit}", value as f64 / *size as f64))
}

/// Binary byte sizes: `512 B`, `1.5 KB`, `8.0 MB`
pub fn format_bytes(bytes: u64) -> String {
    scaled(bytes, &BYTE_UNITS, " ").unwrap_or_else(|| format!("{bytes} B"))
}

/// Decimal row counts: `999`, `250.0K`, `1.3M`
pub fn format_count(count: u64) -> String {
    scaled(count, &COUNT_UNITS, "").unwrap_or_else(|| count.to_string())
}
