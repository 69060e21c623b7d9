//! Append completion handling
//!
//! Every append gets one completion task. It updates counters, applies the
//! retry policy, calls the user's [`CompletionHandler`] and releases the
//! cycle gate exactly once through its permit.
//!
//! For failures the permit is released only after the retry decision has
//! been applied, so a drained cycle never hides a batch that is about to
//! land on the fallback queue.
//!
//! [`CompletionHandler`]: crate::callback::CompletionHandler

use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{ProcessorState, Shared};
use crate::batch::Batch;
use crate::channel::{AppendError, AppendResponse, FailureClass};
use crate::gate::GatePermit;
use crate::retry::RetryDecision;

pub(super) async fn complete(
    shared: Arc<Shared>,
    batch: Arc<Batch>,
    response: BoxFuture<'static, Result<AppendResponse, AppendError>>,
    permit: GatePermit,
) {
    match response.await {
        Ok(response) => match &response.error {
            None => {
                shared
                    .metrics
                    .record_processed(batch.len() as u64, batch.estimated_size() as u64);
                shared.retries.clear(batch.id());
                permit.release();

                tracing::trace!(
                    destination = %shared.name,
                    batch_id = %batch.id(),
                    rows = batch.len(),
                    offset = ?response.offset,
                    "append acknowledged"
                );
                shared.handler.on_success(&response, &batch);
            }
            Some(server_error) => {
                shared.metrics.record_server_error();
                shared.retries.clear(batch.id());
                permit.release();

                tracing::warn!(
                    destination = %shared.name,
                    batch_id = %batch.id(),
                    rows = batch.len(),
                    code = ?server_error.code,
                    error = %server_error.message,
                    "append acknowledged with error"
                );
                shared.handler.on_success_with_error(&response, &batch);
            }
        },
        Err(error) => {
            shared.metrics.record_failure();
            shared.handler.on_failure(&error, &batch);

            match error.class() {
                FailureClass::InvalidRows => {
                    log_invalid_rows(&shared, &batch, &error);
                    give_up(&shared, &batch, &error);
                }
                FailureClass::Retryable => {
                    retry_batch(&shared, batch, &error).await;
                }
                FailureClass::Fatal => {
                    tracing::error!(
                        destination = %shared.name,
                        batch_id = %batch.id(),
                        rows = batch.len(),
                        error = %error,
                        "append failed with a non-retryable status"
                    );
                    give_up(&shared, &batch, &error);
                }
            }

            permit.release();
        }
    }
}

/// Apply the retry policy to a batch that failed transiently
pub(super) async fn retry_batch(shared: &Shared, batch: Arc<Batch>, error: &AppendError) {
    let (attempts, decision) = shared.retries.record_failure(batch.id());

    match decision {
        RetryDecision::Requeue => {
            tracing::warn!(
                destination = %shared.name,
                batch_id = %batch.id(),
                attempt = attempts,
                error = %error,
                "append failed, requeueing batch"
            );
            shared.metrics.record_retry();
            shared.queues.requeue(batch);
        }
        RetryDecision::ReconnectThenRequeue => {
            tracing::warn!(
                destination = %shared.name,
                batch_id = %batch.id(),
                attempt = attempts,
                error = %error,
                "append failed repeatedly, restoring write session"
            );
            reconnect(shared).await;
            shared.metrics.record_retry();
            shared.queues.requeue(batch);
        }
        RetryDecision::Drop => {
            tracing::error!(
                destination = %shared.name,
                batch_id = %batch.id(),
                attempts,
                error = %error,
                "skip {} rows after exhausting retries",
                batch.len()
            );
            give_up(shared, &batch, error);
        }
    }
}

fn give_up(shared: &Shared, batch: &Batch, error: &AppendError) {
    shared.retries.clear(batch.id());
    shared.metrics.record_dropped(batch.len() as u64);
    shared.hooks.stream_failed(error, batch);
}

/// Close the session and reopen it, backing off until it succeeds
async fn reconnect(shared: &Shared) {
    shared.metrics.record_reconnect();
    shared.channel.close().await;

    let backoff = shared.config.reconnect_backoff;
    loop {
        if shared.state() == ProcessorState::Closed {
            tracing::warn!(
                destination = %shared.name,
                "processor closed, abandoning reconnect"
            );
            return;
        }

        match shared.channel.initialize(&shared.destination).await {
            Ok(()) => {
                tracing::info!(destination = %shared.name, "write session restored");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    destination = %shared.name,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "failed to restore write session, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

fn log_invalid_rows(shared: &Shared, batch: &Batch, error: &AppendError) {
    let row_errors = error.row_errors();
    if row_errors.is_empty() {
        tracing::error!(
            destination = %shared.name,
            batch_id = %batch.id(),
            rows = batch.len(),
            error = %error,
            "append rejected as invalid"
        );
        return;
    }

    for row_error in row_errors {
        let row = batch
            .records()
            .get(row_error.index)
            .and_then(|record| serde_json::to_string(record).ok())
            .unwrap_or_default();

        tracing::error!(
            destination = %shared.name,
            batch_id = %batch.id(),
            index = row_error.index,
            error = %row_error.message,
            row = %row,
            "invalid row"
        );
    }
}
