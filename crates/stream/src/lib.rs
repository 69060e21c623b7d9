//! Tributary - Stream
//!
//! Buffered, batched writes into an append-only warehouse write service.
//!
//! # Architecture
//!
//! Producers hand rows to a [`StreamProcessor`] (one per destination table),
//! which queues them and drains them in cycles: rows are packed into batches
//! under a byte ceiling, appended without waiting, and their outcomes handled
//! on completion tasks. Failed batches go to a fallback queue that is drained
//! ahead of new rows. The [`StreamingManager`] owns one processor per
//! destination and runs each on a fixed-delay schedule.
//!
//! ```text
//! put_row_for_table ──► [StreamingManager] ──► [StreamProcessor]
//!                                                │ accept queue
//!                                                │ fallback queue
//!                                                ▼
//!                              drain cycle ──► [AppendChannel] ──► write service
//!                                                ▲
//!                            completion tasks ───┘ (retry, reconnect, drop)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tributary_stream::{Destination, JsonLinesChannelFactory, StreamingManager};
//!
//! let factory = Arc::new(JsonLinesChannelFactory::new("/var/lib/tributary"));
//! let manager = StreamingManager::builder(factory).build()?;
//!
//! let events: Destination = "proj.analytics.events".parse()?;
//! manager.put_row_for_table(&events, row).await?;
//! manager.force_flush_all().await?;
//! manager.shutdown().await?;
//! ```

// =============================================================================
// Data model
// =============================================================================

pub mod batch;
pub mod destination;
pub mod row;

// =============================================================================
// Write path
// =============================================================================

/// Append channels: the write-service seam and a JSON-lines implementation
pub mod channel;

/// Per-destination buffered writer
pub mod processor;

/// Registry and scheduler of processors
pub mod manager;

mod gate;
mod retry;

// =============================================================================
// Extension points and support
// =============================================================================

pub mod callback;
pub mod config;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod testing;

mod rate_limited_logger;

pub use batch::{Batch, BatchId};
pub use callback::{CompletionHandler, NoopCompletionHandler};
pub use channel::{
    AppendChannel, AppendError, AppendResponse, ChannelError, ChannelFactory, FailureClass,
    JsonLinesChannel, JsonLinesChannelFactory, RETRYABLE_CODES, RowError, ServerError,
};
pub use config::{ManagerConfig, ProcessorConfig};
pub use destination::Destination;
pub use error::{Result, StreamError};
pub use hooks::{AppendHandle, Hooks, PostAppendHook, PreAppendHook, StreamFailedHook};
pub use manager::{StreamStatistics, StreamingManager, StreamingManagerBuilder};
pub use metrics::ProcessorMetricsHandle;
pub use processor::{CycleReport, ProcessorState, StreamProcessor, StreamProcessorBuilder};
pub use row::{Record, Row, Value};
