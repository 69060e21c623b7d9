//! Configuration validation
//!
//! Rejects settings that would stall the streaming engine or make the
//! metrics reporter spin.

use std::time::Duration;

use crate::Config;
use crate::error::{ConfigError, Result};

/// Shortest metrics interval accepted while reporting is enabled
const MIN_METRICS_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) fn validate_config(config: &Config) -> Result<()> {
    validate_streaming(config)?;
    validate_metrics(config)
}

fn validate_streaming(config: &Config) -> Result<()> {
    let s = &config.streaming;

    let counts = [
        ("pool_size", s.pool_size),
        ("max_batch_bytes", s.max_batch_bytes),
        ("max_in_flight", s.max_in_flight),
        ("retry_budget", s.retry_budget as usize),
    ];
    if let Some((field, _)) = counts.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::invalid("streaming", *field, "must be at least 1"));
    }

    let durations = [
        ("delay", s.delay),
        ("completion_timeout", s.completion_timeout),
        ("flush_all_timeout", s.flush_all_timeout),
    ];
    if let Some((field, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
        return Err(ConfigError::invalid("streaming", *field, "must be greater than 0"));
    }

    Ok(())
}

fn validate_metrics(config: &Config) -> Result<()> {
    let m = &config.metrics;
    if m.enabled && m.interval < MIN_METRICS_INTERVAL {
        return Err(ConfigError::invalid(
            "metrics",
            "interval",
            format!("must be at least {MIN_METRICS_INTERVAL:?} when reporting is enabled"),
        ));
    }
    Ok(())
}
