//! Stream engine errors
//!
//! Per-append failures never surface here: they are handled by the
//! completion callback. These errors cover lifecycle misuse, registry
//! lookups and session initialization.

use std::time::Duration;

use crate::channel::ChannelError;

/// Errors returned by stream processors and the streaming manager
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Drain requested before the write session was opened
    #[error("stream processor for {0} is not initialized")]
    NotInitialized(String),

    /// Operation on a processor that has been closed
    #[error("stream processor for {0} is closed")]
    Closed(String),

    /// The manager was shut down and takes no new destinations
    #[error("streaming manager is shut down")]
    ShutDown,

    /// No processor registered for the destination
    #[error("no stream processor registered for {0}")]
    ProcessorNotFound(String),

    /// Destination string is not `project.dataset.table`
    #[error("invalid destination '{0}': expected project.dataset.table")]
    InvalidDestination(String),

    /// Opening or rotating the write session failed
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Flushing did not finish within the configured bound
    #[error("flush did not complete within {0:?}")]
    FlushTimeout(Duration),

    /// Constructed outside a tokio runtime without an explicit handle
    #[error("no tokio runtime available to schedule stream processors")]
    NoRuntime,
}

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;
