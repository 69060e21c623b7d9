//! Append channel capability
//!
//! A channel owns the live write session for one destination. The engine
//! only needs three operations from it: open (or rotate) the session, issue
//! a non-blocking append, and release the session.
//!
//! Each processor gets its own channel from a [`ChannelFactory`]; channels
//! are never shared between processors.

mod jsonl;

pub use jsonl::{JsonLinesChannel, JsonLinesChannelFactory};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tonic::Code;

use crate::batch::Batch;
use crate::destination::Destination;

/// Status codes that are worth retrying
pub const RETRYABLE_CODES: [Code; 6] = [
    Code::Internal,
    Code::Aborted,
    Code::Cancelled,
    Code::FailedPrecondition,
    Code::DeadlineExceeded,
    Code::Unavailable,
];

/// Write session for one destination
#[async_trait]
pub trait AppendChannel: Send + Sync {
    /// Close any prior session and open a fresh one
    async fn initialize(&self, destination: &Destination) -> Result<(), ChannelError>;

    /// Submit a batch without waiting for the result
    fn append(&self, batch: &Batch) -> BoxFuture<'static, Result<AppendResponse, AppendError>>;

    /// Release the session
    async fn close(&self);
}

/// Creates one channel per processor
pub trait ChannelFactory: Send + Sync {
    fn create(&self, destination: &Destination) -> Arc<dyn AppendChannel>;
}

/// Acknowledgement for an append
#[derive(Debug, Clone, Default)]
pub struct AppendResponse {
    /// Offset assigned by the service, when it reports one
    pub offset: Option<i64>,
    /// Error reported inside an otherwise successful response
    pub error: Option<ServerError>,
}

impl AppendResponse {
    pub fn ok(offset: i64) -> Self {
        Self {
            offset: Some(offset),
            error: None,
        }
    }

    pub fn with_error(code: Code, message: impl Into<String>) -> Self {
        Self {
            offset: None,
            error: Some(ServerError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Error carried in a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: Code,
    pub message: String,
}

/// Per-row failure detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Index of the row within its batch
    pub index: usize,
    pub message: String,
}

/// Failure of a single append
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppendError {
    /// The service rejected the append with a status
    #[error("append failed with status {code:?}: {message}")]
    Status {
        code: Code,
        message: String,
        row_errors: Vec<RowError>,
    },

    /// Rows could not be serialized for submission
    #[error("failed to serialize {} row(s) for append", .row_errors.len())]
    Serialization { row_errors: Vec<RowError> },

    /// Transport failure without a status
    #[error("append transport error: {0}")]
    Transport(String),

    /// The drain cycle gave up waiting for completion
    #[error("append did not complete within {0:?}")]
    Timeout(Duration),
}

impl AppendError {
    pub fn status(code: Code, message: impl Into<String>) -> Self {
        AppendError::Status {
            code,
            message: message.into(),
            row_errors: Vec::new(),
        }
    }

    pub fn code(&self) -> Option<Code> {
        match self {
            AppendError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn row_errors(&self) -> &[RowError] {
        match self {
            AppendError::Status { row_errors, .. } | AppendError::Serialization { row_errors } => {
                row_errors
            }
            _ => &[],
        }
    }

    /// How the engine reacts to this failure
    pub fn class(&self) -> FailureClass {
        match self {
            AppendError::Status {
                code: Code::InvalidArgument,
                ..
            }
            | AppendError::Serialization { .. } => FailureClass::InvalidRows,
            AppendError::Status { code, .. } if RETRYABLE_CODES.contains(code) => {
                FailureClass::Retryable
            }
            AppendError::Status { .. } => FailureClass::Fatal,
            AppendError::Transport(_) | AppendError::Timeout(_) => FailureClass::Retryable,
        }
    }
}

/// Classification of a failed append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rows are malformed; never retried
    InvalidRows,
    /// Transient; goes through the retry policy
    Retryable,
    /// Logged and not retried
    Fatal,
}

/// Errors opening or using a write session
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to open write session for {destination}: {message}")]
    Connect {
        destination: String,
        message: String,
    },

    #[error("write session is closed")]
    Closed,

    #[error("write session i/o error: {0}")]
    Io(#[from] std::io::Error),
}
