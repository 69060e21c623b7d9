//! Completion handlers
//!
//! User code observes append outcomes through [`CompletionHandler`]. The
//! engine's own bookkeeping (counters, gate release, retries) runs in a
//! fixed wrapper around it, so a handler cannot skip it.

use crate::batch::Batch;
use crate::channel::{AppendError, AppendResponse};

/// Observer for the outcome of each append
///
/// All methods default to no-ops. They run on the completion task, so they
/// should return quickly.
pub trait CompletionHandler: Send + Sync {
    /// The append was acknowledged without error
    fn on_success(&self, _response: &AppendResponse, _batch: &Batch) {}

    /// The append was acknowledged but the response carries an error
    fn on_success_with_error(&self, _response: &AppendResponse, _batch: &Batch) {}

    /// The append failed
    fn on_failure(&self, _error: &AppendError, _batch: &Batch) {}
}

/// Handler that ignores every outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompletionHandler;

impl CompletionHandler for NoopCompletionHandler {}
