//! `[metrics]` section: periodic per-destination throughput reports

use std::time::Duration;

use serde::Deserialize;

/// How reports are rendered
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// One readable line per destination
    #[default]
    Human,
    /// One JSON object per destination
    Json,
}

/// Metrics reporting settings
///
/// Applies to every stream processor; each one reports on its own timer.
///
/// ```toml
/// [metrics]
/// enabled = true
/// interval = "30s"
/// format = "json"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Time between two reports of the same destination
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    pub format: MetricsFormat,
}

impl MetricsConfig {
    /// Reporting interval, or `None` when reporting is off
    pub fn report_interval(&self) -> Option<Duration> {
        self.enabled.then_some(self.interval)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            format: MetricsFormat::default(),
        }
    }
}
