//! Configuration errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout this crate
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Why a configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range
    #[error("{section}.{field} {message}")]
    Invalid {
        section: &'static str,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            section,
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_names_the_key() {
        let err = ConfigError::invalid("streaming", "max_in_flight", "must be at least 1");
        assert_eq!(err.to_string(), "streaming.max_in_flight must be at least 1");
    }

    #[test]
    fn test_read_error_names_the_file() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/tributary.toml"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/tributary.toml: denied");
    }
}
