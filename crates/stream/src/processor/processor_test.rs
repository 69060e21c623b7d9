use super::*;
use crate::channel::{AppendResponse, RowError};
use crate::testing::{MockChannel, MockOutcome, mock_row, mock_rows};
use std::sync::atomic::AtomicU64;
use tonic::Code;

fn processor(channel: &MockChannel, config: ProcessorConfig) -> StreamProcessor {
    processor_with(channel, config, Hooks::default(), Arc::new(NoopCompletionHandler))
}

fn processor_with(
    channel: &MockChannel,
    config: ProcessorConfig,
    hooks: Hooks,
    handler: Arc<dyn CompletionHandler>,
) -> StreamProcessor {
    StreamProcessor::builder(Destination::new("p", "d", "t"), Arc::new(channel.clone()))
        .config(config)
        .hooks(hooks)
        .handler(handler)
        .build()
        .unwrap()
}

async fn running(channel: &MockChannel, config: ProcessorConfig) -> StreamProcessor {
    let p = processor(channel, config);
    p.initialize().await.unwrap();
    p
}

/// One row per batch
fn single_row_batches() -> ProcessorConfig {
    ProcessorConfig::default().with_max_batch_bytes(1)
}

#[derive(Default)]
struct CountingHandler {
    success: AtomicUsize,
    with_error: AtomicUsize,
    failure: AtomicUsize,
}

impl CompletionHandler for CountingHandler {
    fn on_success(&self, _response: &AppendResponse, _batch: &Batch) {
        self.success.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success_with_error(&self, _response: &AppendResponse, _batch: &Batch) {
        self.with_error.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failure(&self, _error: &AppendError, _batch: &Batch) {
        self.failure.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_failed_hook(hooks: Hooks) -> (Hooks, Arc<AtomicUsize>) {
    let failed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failed);
    let hooks = hooks.with_stream_failed(move |_error: &AppendError, _batch: &Batch| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (hooks, failed)
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_put_before_initialize_is_rejected() {
    let channel = MockChannel::new();
    let p = processor(&channel, ProcessorConfig::default());

    assert_eq!(p.state(), ProcessorState::Uninitialized);
    assert_eq!(p.put_one(mock_row(1, 10)), 0);
    assert_eq!(p.accept_queue_len(), 0);
    assert_eq!(p.metrics().rows_rejected, 1);
}

#[tokio::test]
async fn test_run_before_initialize_errors() {
    let channel = MockChannel::new();
    let p = processor(&channel, ProcessorConfig::default());

    assert!(matches!(p.run().await, Err(StreamError::NotInitialized(_))));
    assert!(matches!(
        p.force_flush().await,
        Err(StreamError::NotInitialized(_))
    ));
}

#[tokio::test]
async fn test_initialize_failure_propagates() {
    let channel = MockChannel::new();
    channel.fail_initialize(1);
    let p = processor(&channel, ProcessorConfig::default());

    assert!(matches!(p.initialize().await, Err(StreamError::Channel(_))));
    assert!(!p.is_initialized());

    p.initialize().await.unwrap();
    assert!(p.is_initialized());
    assert!(!p.is_stopped());
}

#[tokio::test]
async fn test_reinitialize_rotates_session() {
    let channel = MockChannel::new();
    let p = running(&channel, ProcessorConfig::default()).await;

    p.initialize().await.unwrap();
    assert_eq!(channel.initialize_calls(), 2);
    assert_eq!(p.state(), ProcessorState::Running);
}

#[tokio::test]
async fn test_close_flushes_then_closes_channel() {
    let channel = MockChannel::new();
    let p = running(&channel, ProcessorConfig::default()).await;
    assert_eq!(p.put_batch(mock_rows(3)), 3);

    p.close().await.unwrap();

    assert_eq!(p.state(), ProcessorState::Closed);
    assert_eq!(p.metrics().rows_processed, 3);
    assert_eq!(channel.close_calls(), 1);
    assert!(p.is_stopped());

    assert_eq!(p.put_one(mock_row(9, 10)), 0);
    assert!(matches!(p.run().await, Err(StreamError::Closed(_))));

    // closing twice does nothing
    p.close().await.unwrap();
    assert_eq!(channel.close_calls(), 1);
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_put_and_run_appends_in_order() {
    let channel = MockChannel::new();
    let p = running(&channel, ProcessorConfig::default()).await;

    assert_eq!(p.put_batch(mock_rows(5)), 5);
    assert_eq!(p.accept_queue_len(), 5);

    p.run().await.unwrap();

    let appends = channel.appends();
    assert_eq!(appends.len(), 1);
    assert_eq!(appends[0].rows, 5);
    assert_eq!(p.accept_queue_len(), 0);
    assert_eq!(p.metrics().rows_processed, 5);
    assert_eq!(p.metrics().rows_accepted, 5);
}

#[tokio::test]
async fn test_empty_rows_are_rejected() {
    let channel = MockChannel::new();
    let p = running(&channel, ProcessorConfig::default()).await;

    let accepted = p.put_batch(vec![mock_row(1, 10), Row::new(), mock_row(2, 10)]);
    assert_eq!(accepted, 2);
    assert_eq!(p.accept_queue_len(), 2);
    assert_eq!(p.metrics().rows_rejected, 1);

    assert_eq!(p.put_one(Row::new()), 0);
    assert_eq!(p.metrics().rows_rejected, 2);
}

#[tokio::test]
async fn test_run_on_empty_queues_appends_nothing() {
    let channel = MockChannel::new();
    let p = running(&channel, ProcessorConfig::default()).await;

    p.run().await.unwrap();
    assert_eq!(channel.append_count(), 0);
}

// =============================================================================
// Force flush
// =============================================================================

#[tokio::test]
async fn test_put_during_force_flush_is_rejected() {
    let channel = MockChannel::new();
    channel.hold();
    let p = Arc::new(running(&channel, ProcessorConfig::default()).await);
    p.put_one(mock_row(1, 10));

    let flusher = {
        let p = Arc::clone(&p);
        tokio::spawn(async move { p.force_flush().await })
    };

    while channel.append_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(p.state(), ProcessorState::ForceFlushing);
    assert!(p.is_stopped());

    assert_eq!(p.put_one(mock_row(2, 10)), 0);
    assert_eq!(p.accept_queue_len(), 0);
    assert_eq!(p.metrics().rows_rejected, 1);

    // scheduled cycles step aside while flushing
    p.run().await.unwrap();

    channel.release();
    flusher.await.unwrap().unwrap();

    assert_eq!(p.state(), ProcessorState::Running);
    assert_eq!(p.metrics().rows_processed, 1);
    assert_eq!(p.put_one(mock_row(3, 10)), 1);
}

#[tokio::test]
async fn test_force_flush_drains_everything_and_is_idempotent() {
    let channel = MockChannel::new();
    let config = single_row_batches().with_max_in_flight(4);
    let p = running(&channel, config).await;
    p.put_batch(mock_rows(10));

    p.force_flush().await.unwrap();
    assert_eq!(p.accept_queue_len(), 0);
    assert_eq!(p.fallback_queue_len(), 0);
    assert_eq!(channel.append_count(), 10);

    p.force_flush().await.unwrap();
    assert_eq!(channel.append_count(), 10);
    assert_eq!(p.state(), ProcessorState::Running);
}

// =============================================================================
// In-flight ceiling
// =============================================================================

#[tokio::test]
async fn test_drainer_stops_at_in_flight_ceiling() {
    let channel = MockChannel::new();
    channel.hold();
    let config = single_row_batches().with_max_in_flight(64);
    let p = Arc::new(running(&channel, config).await);
    assert_eq!(p.put_batch(mock_rows(70)), 70);

    let runner = {
        let p = Arc::clone(&p);
        tokio::spawn(async move { p.run().await })
    };

    while channel.append_count() < 64 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(channel.append_count(), 64);
    assert!(!runner.is_finished());
    assert_eq!(p.accept_queue_len(), 6);

    channel.release();
    runner.await.unwrap().unwrap();
    assert_eq!(p.metrics().rows_processed, 64);

    p.run().await.unwrap();
    assert_eq!(channel.append_count(), 70);
    assert_eq!(p.metrics().rows_processed, 70);
}

// =============================================================================
// Completion outcomes
// =============================================================================

#[tokio::test]
async fn test_every_outcome_releases_the_gate() {
    let channel = MockChannel::new();
    channel.script([
        MockOutcome::Success,
        MockOutcome::ServerError(Code::Internal, "partial".into()),
        MockOutcome::InvalidRows(vec![RowError {
            index: 0,
            message: "bad type".into(),
        }]),
        MockOutcome::Status(Code::PermissionDenied),
        MockOutcome::Transport("connection reset".into()),
    ]);

    let handler = Arc::new(CountingHandler::default());
    let (hooks, failed) = counting_failed_hook(Hooks::default());
    let config = single_row_batches().with_completion_timeout(Duration::from_secs(5));
    let p = processor_with(&channel, config, hooks, handler.clone());
    p.initialize().await.unwrap();
    p.put_batch(mock_rows(5));

    p.run().await.unwrap();

    let m = p.metrics();
    assert_eq!(m.cycle_timeouts, 0);
    assert_eq!(m.batches_appended, 5);
    assert_eq!(m.rows_processed, 1);
    assert_eq!(m.server_errors, 1);
    assert_eq!(m.append_failures, 3);
    assert_eq!(m.batches_dropped, 2);
    assert_eq!(m.retries, 1);

    assert_eq!(handler.success.load(Ordering::SeqCst), 1);
    assert_eq!(handler.with_error.load(Ordering::SeqCst), 1);
    assert_eq!(handler.failure.load(Ordering::SeqCst), 3);

    // invalid rows and the fatal status are given up on
    assert_eq!(failed.load(Ordering::SeqCst), 2);
    // only the transport failure is retried
    assert_eq!(p.fallback_queue_len(), 1);
    assert_eq!(p.pending_retries(), 1);
}

#[tokio::test]
async fn test_four_unavailable_failures_reconnect_once_then_drop() {
    let channel = MockChannel::new();
    channel.script((0..4).map(|_| MockOutcome::Status(Code::Unavailable)));

    let (hooks, failed) = counting_failed_hook(Hooks::default());
    let p = processor_with(
        &channel,
        ProcessorConfig::default(),
        hooks,
        Arc::new(NoopCompletionHandler),
    );
    p.initialize().await.unwrap();
    p.put_batch(mock_rows(10));

    p.force_flush().await.unwrap();

    let appends = channel.appends();
    assert_eq!(appends.len(), 4);
    assert!(appends.iter().all(|a| a.batch_id == appends[0].batch_id));

    // one initial session plus one reconnect
    assert_eq!(channel.initialize_calls(), 2);
    assert_eq!(channel.close_calls(), 1);

    let m = p.metrics();
    assert_eq!(m.reconnects, 1);
    assert_eq!(m.retries, 3);
    assert_eq!(m.batches_dropped, 1);
    assert_eq!(m.rows_dropped, 10);
    assert_eq!(m.rows_processed, 0);

    assert_eq!(failed.load(Ordering::SeqCst), 1);
    assert_eq!(p.pending_retries(), 0);
    assert_eq!(p.fallback_queue_len(), 0);
}

#[tokio::test]
async fn test_retried_batch_succeeds_and_clears_counter() {
    let channel = MockChannel::new();
    channel.script([
        MockOutcome::Status(Code::Aborted),
        MockOutcome::Status(Code::DeadlineExceeded),
    ]);
    let p = running(&channel, ProcessorConfig::default()).await;
    p.put_batch(mock_rows(4));

    p.force_flush().await.unwrap();

    assert_eq!(channel.append_count(), 3);
    assert_eq!(channel.initialize_calls(), 1);
    assert_eq!(p.metrics().rows_processed, 4);
    assert_eq!(p.pending_retries(), 0);
}

#[tokio::test]
async fn test_retried_batch_rejected_as_invalid_clears_counter() {
    let channel = MockChannel::new();
    channel.script([
        MockOutcome::Status(Code::Unavailable),
        MockOutcome::InvalidRows(vec![]),
    ]);
    let p = running(&channel, ProcessorConfig::default()).await;
    p.put_batch(mock_rows(3));

    p.force_flush().await.unwrap();

    assert_eq!(channel.append_count(), 2);
    let m = p.metrics();
    assert_eq!(m.batches_dropped, 1);
    assert_eq!(m.rows_dropped, 3);
    assert_eq!(p.fallback_queue_len(), 0);
    assert_eq!(p.pending_retries(), 0);
}

#[tokio::test]
async fn test_retried_batch_fatal_status_clears_counter() {
    let channel = MockChannel::new();
    channel.script([
        MockOutcome::Status(Code::Unavailable),
        MockOutcome::Status(Code::PermissionDenied),
    ]);
    let p = running(&channel, ProcessorConfig::default()).await;
    p.put_batch(mock_rows(2));

    p.force_flush().await.unwrap();

    assert_eq!(p.metrics().batches_dropped, 1);
    assert_eq!(p.pending_retries(), 0);
}

#[tokio::test]
async fn test_retried_batch_acknowledged_with_error_clears_counter() {
    let channel = MockChannel::new();
    channel.script([
        MockOutcome::Status(Code::Unavailable),
        MockOutcome::ServerError(Code::Internal, "partial".into()),
    ]);
    let p = running(&channel, ProcessorConfig::default()).await;
    p.put_batch(mock_rows(2));

    p.force_flush().await.unwrap();

    assert_eq!(channel.append_count(), 2);
    assert_eq!(p.metrics().server_errors, 1);
    assert_eq!(p.fallback_queue_len(), 0);
    assert_eq!(p.pending_retries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backs_off_until_session_opens() {
    let channel = MockChannel::new();
    let config = ProcessorConfig::default()
        .with_retry_budget(1)
        .with_reconnect_backoff(Duration::from_secs(60));
    let p = running(&channel, config).await;

    channel.fail_initialize(2);
    channel.script([MockOutcome::Status(Code::Unavailable)]);
    p.put_one(mock_row(1, 10));

    p.run().await.unwrap();

    // initial + two failed attempts + the one that worked
    assert_eq!(channel.initialize_calls(), 4);
    assert_eq!(channel.close_calls(), 1);
    assert_eq!(p.metrics().reconnects, 1);
    assert_eq!(p.fallback_queue_len(), 1);

    p.run().await.unwrap();
    assert_eq!(p.metrics().rows_processed, 1);
    assert_eq!(p.pending_retries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_timeout_retries_last_batch() {
    let channel = MockChannel::new();
    channel.hold();
    let config = ProcessorConfig::default().with_completion_timeout(Duration::from_secs(1));
    let p = running(&channel, config).await;
    p.put_one(mock_row(1, 10));

    p.run().await.unwrap();

    assert_eq!(p.metrics().cycle_timeouts, 1);
    assert_eq!(p.fallback_queue_len(), 1);
    assert_eq!(p.pending_retries(), 1);

    channel.release();
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(p.metrics().rows_processed, 1);
    assert_eq!(p.pending_retries(), 0);
}

// =============================================================================
// Hooks
// =============================================================================

#[tokio::test]
async fn test_pre_append_hook_can_edit_batch() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let seen_by_hook = Arc::clone(&seen);
    let hooks = Hooks::new().with_pre_append(move |destination: &str, batch: &mut Batch| {
        seen_by_hook.lock().push(destination.to_string());
        batch
            .records_mut()
            .retain(|r| matches!(r.get("id"), Some(crate::row::Value::Int(id)) if id % 2 == 0));
        batch.refresh_size();
    });

    let channel = MockChannel::new();
    let p = processor_with(
        &channel,
        ProcessorConfig::default(),
        hooks,
        Arc::new(NoopCompletionHandler),
    );
    p.initialize().await.unwrap();
    p.put_batch(mock_rows(4));

    p.run().await.unwrap();

    assert_eq!(seen.lock().as_slice(), ["p.d.t"]);
    assert_eq!(channel.appends()[0].rows, 2);
    assert_eq!(p.metrics().rows_processed, 2);
}

#[tokio::test]
async fn test_post_append_hook_sees_each_append() {
    let rows_seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rows_seen);
    let hooks = Hooks::new().with_post_append(
        move |append: &AppendHandle, _processed: &AtomicU64| {
            counter.fetch_add(append.rows(), Ordering::SeqCst);
        },
    );

    let channel = MockChannel::new();
    let p = processor_with(
        &channel,
        single_row_batches(),
        hooks,
        Arc::new(NoopCompletionHandler),
    );
    p.initialize().await.unwrap();
    p.put_batch(mock_rows(3));

    p.run().await.unwrap();
    assert_eq!(rows_seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_metrics_handle_reports_processor_counters() {
    use tributary_metrics::StreamMetricsProvider;

    let channel = MockChannel::new();
    let p = running(&channel, ProcessorConfig::default()).await;
    let handle = p.metrics_handle();
    p.put_batch(mock_rows(2));
    p.run().await.unwrap();

    assert_eq!(handle.stream_id(), "p.d.t");
    assert_eq!(handle.snapshot().rows_processed, 2);
}
