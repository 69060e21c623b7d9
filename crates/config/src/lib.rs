//! Tributary Configuration
//!
//! One TOML file with three optional sections. Anything left out keeps its
//! default, so an empty file is a working configuration. Values are checked
//! on load and a bad file is rejected as a whole.
//!
//! ```
//! use tributary_config::Config;
//!
//! let config: Config = "[streaming]\ndelay = \"10s\"".parse().unwrap();
//! assert_eq!(config.streaming.delay.as_secs(), 10);
//! assert_eq!(config.streaming.retry_budget, 3);
//! ```
//!
//! See `configs/config.toml` for every key with its default.

mod error;
mod logging;
mod metrics;
mod streaming;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use metrics::{MetricsConfig, MetricsFormat};
pub use streaming::{
    DEFAULT_COMPLETION_TIMEOUT, DEFAULT_DELAY, DEFAULT_FLUSH_ALL_TIMEOUT, DEFAULT_INITIAL_DELAY,
    DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_IN_FLIGHT, DEFAULT_POOL_SIZE, DEFAULT_RECONNECT_BACKOFF,
    DEFAULT_RETRY_BUDGET, StreamingConfig,
};

use serde::Deserialize;

/// Root of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[log]`
    pub log: LogConfig,

    /// `[metrics]`
    pub metrics: MetricsConfig,

    /// `[streaming]`: scheduling, batching and retries
    pub streaming: StreamingConfig,
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        fs::read_to_string(path)
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .parse()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        validation::validate_config(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_file_is_valid() {
        let config = Config::from_str("").unwrap();
        assert!(config.streaming.enabled);
        assert_eq!(config.streaming.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_sections_override_defaults() {
        let toml = r#"
[log]
level = "debug"
format = "json"

[metrics]
enabled = false
interval = "5s"

[streaming]
delay = "15s"
pool_size = 32
max_batch_bytes = 4000000
"#;
        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.interval, Duration::from_secs(5));
        assert_eq!(config.streaming.delay, Duration::from_secs(15));
        assert_eq!(config.streaming.pool_size, 32);
        assert_eq!(config.streaming.max_batch_bytes, 4_000_000);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = Config::from_str(include_str!("../../../configs/config.toml")).unwrap();
        let defaults = StreamingConfig::default();

        assert_eq!(config.streaming.delay, defaults.delay);
        assert_eq!(config.streaming.completion_timeout, defaults.completion_timeout);
        assert_eq!(config.streaming.retry_budget, defaults.retry_budget);
        assert_eq!(config.metrics.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let result = Config::from_str("[streaming\ndelay = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[streaming]\nmax_in_flight = 8").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.streaming.max_in_flight, 8);
    }

    #[test]
    fn test_from_missing_file() {
        let result = Config::from_file("/nonexistent/tributary.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
