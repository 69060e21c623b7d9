//! `[log]` section: verbosity and output format of the engine's own logs

use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Name as understood by `tracing` filter directives
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain lines for terminals
    #[default]
    Console,
    /// One JSON object per event, for log shippers
    Json,
}

/// Logging settings
///
/// ```toml
/// [log]
/// level = "debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LogConfig {
    /// Filter directive for the subscriber
    ///
    /// A non-empty override (usually a CLI flag) wins over the configured
    /// level and may be a full directive such as `info,tributary_stream=debug`.
    pub fn directive(&self, override_level: Option<&str>) -> String {
        match override_level.map(str::trim) {
            Some(level) if !level.is_empty() => level.to_string(),
            _ => self.level.to_string(),
        }
    }
}
