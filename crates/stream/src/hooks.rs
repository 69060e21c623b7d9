//! Append extension points
//!
//! - [`PreAppendHook`]: sees (and may edit) each batch before submission
//! - [`PostAppendHook`]: sees each in-flight append right after submission
//! - [`StreamFailedHook`]: told about batches the engine gives up on
//!
//! Closures with the matching signature implement the traits directly.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::task::AbortHandle;

use crate::batch::{Batch, BatchId};
use crate::channel::AppendError;

/// Runs before a batch is appended
pub trait PreAppendHook: Send + Sync {
    fn before_append(&self, destination: &str, batch: &mut Batch);
}

/// Runs after a batch has been submitted
pub trait PostAppendHook: Send + Sync {
    /// `processed_rows` is the processor's running count of acknowledged rows
    fn after_append(&self, append: &AppendHandle, processed_rows: &AtomicU64);
}

/// Runs when a batch is rejected for good
pub trait StreamFailedHook: Send + Sync {
    fn on_stream_failed(&self, error: &AppendError, batch: &Batch);
}

impl<F> PreAppendHook for F
where
    F: Fn(&str, &mut Batch) + Send + Sync,
{
    fn before_append(&self, destination: &str, batch: &mut Batch) {
        self(destination, batch)
    }
}

impl<F> PostAppendHook for F
where
    F: Fn(&AppendHandle, &AtomicU64) + Send + Sync,
{
    fn after_append(&self, append: &AppendHandle, processed_rows: &AtomicU64) {
        self(append, processed_rows)
    }
}

impl<F> StreamFailedHook for F
where
    F: Fn(&AppendError, &Batch) + Send + Sync,
{
    fn on_stream_failed(&self, error: &AppendError, batch: &Batch) {
        self(error, batch)
    }
}

/// View of one in-flight append
#[derive(Debug, Clone)]
pub struct AppendHandle {
    batch_id: BatchId,
    rows: usize,
    bytes: usize,
    task: AbortHandle,
}

impl AppendHandle {
    pub(crate) fn new(batch_id: BatchId, rows: usize, bytes: usize, task: AbortHandle) -> Self {
        Self {
            batch_id,
            rows,
            bytes,
            task,
        }
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Estimated bytes submitted
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Whether the completion callback has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Hooks attached to a processor
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) pre_append: Vec<Arc<dyn PreAppendHook>>,
    pub(crate) post_append: Vec<Arc<dyn PostAppendHook>>,
    pub(crate) stream_failed: Vec<Arc<dyn StreamFailedHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pre_append(mut self, hook: impl PreAppendHook + 'static) -> Self {
        self.pre_append.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_post_append(mut self, hook: impl PostAppendHook + 'static) -> Self {
        self.post_append.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_stream_failed(mut self, hook: impl StreamFailedHook + 'static) -> Self {
        self.stream_failed.push(Arc::new(hook));
        self
    }

    pub(crate) fn before_append(&self, destination: &str, batch: &mut Batch) {
        for hook in &self.pre_append {
            hook.before_append(destination, batch);
        }
    }

    pub(crate) fn after_append(&self, append: &AppendHandle, processed_rows: &AtomicU64) {
        for hook in &self.post_append {
            hook.after_append(append, processed_rows);
        }
    }

    pub(crate) fn stream_failed(&self, error: &AppendError, batch: &Batch) {
        for hook in &self.stream_failed {
            hook.on_stream_failed(error, batch);
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_append", &self.pre_append.len())
            .field("post_append", &self.post_append.len())
            .field("stream_failed", &self.stream_failed.len())
            .finish()
    }
}
