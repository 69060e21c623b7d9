//! Stream processor
//!
//! One processor per destination. It owns the accept queue, the fallback
//! queue and the write channel, and turns queued rows into appends in drain
//! cycles.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Running --force_flush--> ForceFlushing
//!                                  ^                          │
//!                                  └──────(queues drained)────┘
//! Running --close--> Closed
//! ```
//!
//! # Drain cycle
//!
//! Batches are drawn (fallback first), passed through pre-append hooks,
//! appended without waiting, and registered with a per-cycle gate. Drawing
//! stops once `max_in_flight` appends are registered or both queues are
//! empty; the cycle then waits for the registered appends, bounded by
//! `completion_timeout`. Cycles of one processor never overlap.
//!
//! Outcomes are handled on completion tasks (see `completion`), never by
//! the caller of `put_*`.

mod completion;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tributary_metrics::{StreamMetrics, StreamMetricsSnapshot};

use crate::batch::{Batch, BatchQueues};
use crate::callback::{CompletionHandler, NoopCompletionHandler};
use crate::channel::{AppendChannel, AppendError};
use crate::config::ProcessorConfig;
use crate::destination::Destination;
use crate::error::{Result, StreamError};
use crate::gate::CycleGate;
use crate::hooks::{AppendHandle, Hooks};
use crate::metrics::ProcessorMetricsHandle;
use crate::rate_limited_logger::RateLimitedLogger;
use crate::retry::RetryTracker;
use crate::row::{Record, Row};

/// Processor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessorState {
    Uninitialized = 0,
    Running = 1,
    ForceFlushing = 2,
    Closed = 3,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProcessorState::Running,
            2 => ProcessorState::ForceFlushing,
            3 => ProcessorState::Closed,
            _ => ProcessorState::Uninitialized,
        }
    }

    fn rejection_reason(self) -> &'static str {
        match self {
            ProcessorState::Uninitialized => "processor not initialized",
            ProcessorState::Running => "accepting",
            ProcessorState::ForceFlushing => "force flush in progress",
            ProcessorState::Closed => "processor closed",
        }
    }
}

/// Summary of one drain cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub batches: usize,
    pub rows: usize,
    pub bytes: usize,
    pub elapsed: Duration,
    /// Whether the completion wait ran out
    pub timed_out: bool,
}

/// State shared with completion tasks
pub(crate) struct Shared {
    pub(crate) destination: Destination,
    pub(crate) name: String,
    pub(crate) channel: Arc<dyn AppendChannel>,
    pub(crate) queues: BatchQueues,
    pub(crate) retries: RetryTracker,
    pub(crate) metrics: Arc<StreamMetrics>,
    pub(crate) handler: Arc<dyn CompletionHandler>,
    pub(crate) hooks: Hooks,
    pub(crate) config: ProcessorConfig,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ProcessorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Buffered writer for one destination
pub struct StreamProcessor {
    shared: Arc<Shared>,
    /// Exclusive section for puts and state transitions
    ingest: parking_lot::Mutex<()>,
    /// Serializes drain cycles
    drain: tokio::sync::Mutex<()>,
    /// Concurrent `force_flush` calls in progress
    flushers: AtomicUsize,
    runtime: Handle,
    rejections: RateLimitedLogger,
}

impl StreamProcessor {
    /// Start building a processor for `destination` writing through `channel`
    pub fn builder(
        destination: Destination,
        channel: Arc<dyn AppendChannel>,
    ) -> StreamProcessorBuilder {
        StreamProcessorBuilder {
            destination,
            channel,
            config: ProcessorConfig::default(),
            handler: Arc::new(NoopCompletionHandler),
            hooks: Hooks::default(),
            runtime: None,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.shared.destination
    }

    /// Destination in `project.dataset.table` form
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ProcessorState {
        self.shared.state()
    }

    /// Whether a write session is open
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state(),
            ProcessorState::Running | ProcessorState::ForceFlushing
        )
    }

    /// Whether puts are currently rejected
    pub fn is_stopped(&self) -> bool {
        self.state() != ProcessorState::Running
    }

    pub fn accept_queue_len(&self) -> usize {
        self.shared.queues.accept_len()
    }

    pub fn fallback_queue_len(&self) -> usize {
        self.shared.queues.fallback_len()
    }

    /// Batches with failed attempts that are still being retried
    pub fn pending_retries(&self) -> usize {
        self.shared.retries.len()
    }

    pub fn metrics(&self) -> StreamMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> ProcessorMetricsHandle {
        ProcessorMetricsHandle::new(
            self.shared.name.clone(),
            Arc::clone(&self.shared.metrics),
            self.shared.config.metrics,
        )
    }

    /// Open (or rotate) the write session
    ///
    /// Moves an uninitialized or closed processor to `Running`. Channel
    /// errors are returned to the caller and not retried.
    pub async fn initialize(&self) -> Result<()> {
        self.shared
            .channel
            .initialize(&self.shared.destination)
            .await?;

        {
            let _ingest = self.ingest.lock();
            if matches!(
                self.state(),
                ProcessorState::Uninitialized | ProcessorState::Closed
            ) {
                self.shared.set_state(ProcessorState::Running);
            }
        }

        tracing::info!(destination = %self.shared.name, "write session initialized");
        Ok(())
    }

    /// Queue one row; returns the number of rows accepted (0 or 1)
    pub fn put_one(&self, row: Row) -> usize {
        self.put_batch(std::iter::once(row))
    }

    /// Queue rows; returns the number of rows accepted
    ///
    /// Rows are rejected, with a rate-limited error log, while the processor
    /// is not `Running`. Empty rows are always rejected. Nothing here ever
    /// fails the caller.
    pub fn put_batch<I>(&self, rows: I) -> usize
    where
        I: IntoIterator<Item = Row>,
    {
        let state = self.state();
        if state != ProcessorState::Running {
            let count = rows.into_iter().count();
            self.reject(state.rejection_reason(), count);
            return 0;
        }

        let mut records = Vec::new();
        let mut empty = 0;
        for row in rows {
            if row.is_empty() {
                empty += 1;
            } else {
                records.push(Record::encode(row));
            }
        }

        if empty > 0 {
            self.reject("empty row", empty);
        }
        if records.is_empty() {
            return 0;
        }

        let accepted = records.len();
        {
            let _ingest = self.ingest.lock();
            let state = self.state();
            if state != ProcessorState::Running {
                self.reject(state.rejection_reason(), accepted);
                return 0;
            }
            self.shared.queues.push_records(records);
        }

        self.shared.metrics.record_accepted(accepted as u64);
        accepted
    }

    fn reject(&self, reason: &str, rows: usize) {
        if rows == 0 {
            return;
        }
        self.shared.metrics.record_rejected(rows as u64);
        self.rejections.rejected(&self.shared.name, reason, rows as u64);
    }

    /// Run one scheduled drain cycle
    ///
    /// Skipped (with a debug log) while a force flush is in progress.
    pub async fn run(&self) -> Result<()> {
        match self.state() {
            ProcessorState::Uninitialized => {
                Err(StreamError::NotInitialized(self.shared.name.clone()))
            }
            ProcessorState::Closed => Err(StreamError::Closed(self.shared.name.clone())),
            ProcessorState::ForceFlushing => {
                tracing::debug!(
                    destination = %self.shared.name,
                    "force flush in progress, skipping scheduled cycle"
                );
                Ok(())
            }
            ProcessorState::Running => {
                self.drain_cycle().await;
                Ok(())
            }
        }
    }

    /// Stop accepting rows and drain both queues completely
    ///
    /// Runs cycles until the accept and fallback queues are empty, then
    /// accepts rows again. Calling it on drained queues is a no-op.
    pub async fn force_flush(&self) -> Result<()> {
        {
            let _ingest = self.ingest.lock();
            match self.state() {
                ProcessorState::Uninitialized => {
                    return Err(StreamError::NotInitialized(self.shared.name.clone()));
                }
                ProcessorState::Closed => {
                    return Err(StreamError::Closed(self.shared.name.clone()));
                }
                ProcessorState::Running | ProcessorState::ForceFlushing => {
                    self.flushers.fetch_add(1, Ordering::SeqCst);
                    self.shared.set_state(ProcessorState::ForceFlushing);
                }
            }
        }

        let _flushing = FlushGuard { processor: self };
        let started = Instant::now();
        let mut cycles = 0usize;
        while !self.shared.queues.is_empty() {
            let report = self.drain_cycle().await;
            cycles += 1;
            if report.timed_out {
                tracing::debug!(
                    destination = %self.shared.name,
                    cycle = cycles,
                    "forced cycle timed out, continuing"
                );
            }
        }

        tracing::debug!(
            destination = %self.shared.name,
            cycles,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "force flush complete"
        );
        Ok(())
    }

    fn finish_flush(&self) {
        let _ingest = self.ingest.lock();
        if self.flushers.fetch_sub(1, Ordering::SeqCst) == 1
            && self.state() == ProcessorState::ForceFlushing
        {
            self.shared.set_state(ProcessorState::Running);
        }
    }

    /// Flush everything, then release the write session
    pub async fn close(&self) -> Result<()> {
        match self.state() {
            ProcessorState::Closed => return Ok(()),
            ProcessorState::Uninitialized => {}
            ProcessorState::Running | ProcessorState::ForceFlushing => {
                self.force_flush().await?;
            }
        }

        {
            let _ingest = self.ingest.lock();
            self.shared.set_state(ProcessorState::Closed);
        }

        self.shared.channel.close().await;
        tracing::info!(destination = %self.shared.name, "stream processor closed");
        Ok(())
    }

    async fn drain_cycle(&self) -> CycleReport {
        let _drain = self.drain.lock().await;
        let mut report = CycleReport::default();

        if self.shared.queues.is_empty() {
            return report;
        }

        let gate = CycleGate::new();
        let started = Instant::now();
        let mut last: Option<Arc<Batch>> = None;

        while gate.registered() < self.shared.config.max_in_flight {
            let Some(mut batch) = self.shared.queues.next_batch() else {
                break;
            };

            self.shared.hooks.before_append(&self.shared.name, &mut batch);
            if batch.is_empty() {
                continue;
            }

            let batch = Arc::new(batch);
            let response = self.shared.channel.append(&batch);
            self.shared.metrics.record_appended();
            let permit = gate.register();

            report.batches += 1;
            report.rows += batch.len();
            report.bytes += batch.estimated_size();

            let task = self.runtime.spawn(completion::complete(
                Arc::clone(&self.shared),
                Arc::clone(&batch),
                response,
                permit,
            ));

            let handle = AppendHandle::new(
                batch.id(),
                batch.len(),
                batch.estimated_size(),
                task.abort_handle(),
            );
            self.shared
                .hooks
                .after_append(&handle, &self.shared.metrics.rows_processed);

            last = Some(batch);
        }

        let timeout = self.shared.config.completion_timeout;
        if !gate.wait_idle(timeout).await {
            report.timed_out = true;
            self.shared.metrics.record_cycle_timeout();
            tracing::warn!(
                destination = %self.shared.name,
                pending = gate.pending(),
                timeout_secs = timeout.as_secs(),
                "appends did not complete in time, retrying last batch"
            );
            if let Some(batch) = last {
                completion::retry_batch(&self.shared, batch, &AppendError::Timeout(timeout)).await;
            }
        }

        report.elapsed = started.elapsed();
        let millis = report.elapsed.as_millis().max(1) as u64;
        tracing::info!(
            destination = %self.shared.name,
            batches = report.batches,
            rows = report.rows,
            bytes = report.bytes,
            millis,
            rows_per_ms = report.rows as f64 / millis as f64,
            "records flushed"
        );

        report
    }
}

/// Leaves `ForceFlushing` when a flush ends, including when it is dropped early
struct FlushGuard<'a> {
    processor: &'a StreamProcessor,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.processor.finish_flush();
    }
}

/// Builder for [`StreamProcessor`]
pub struct StreamProcessorBuilder {
    destination: Destination,
    channel: Arc<dyn AppendChannel>,
    config: ProcessorConfig,
    handler: Arc<dyn CompletionHandler>,
    hooks: Hooks,
    runtime: Option<Handle>,
}

impl StreamProcessorBuilder {
    #[must_use]
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Runtime completion tasks are spawned on
    ///
    /// Defaults to the runtime `build` is called from.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<StreamProcessor> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| StreamError::NoRuntime)?,
        };

        let shared = Shared {
            name: self.destination.to_string(),
            destination: self.destination,
            channel: self.channel,
            queues: BatchQueues::new(self.config.max_batch_bytes),
            retries: RetryTracker::new(self.config.retry_budget),
            metrics: Arc::new(StreamMetrics::new()),
            handler: self.handler,
            hooks: self.hooks,
            state: AtomicU8::new(ProcessorState::Uninitialized as u8),
            config: self.config,
        };

        Ok(StreamProcessor {
            rejections: RateLimitedLogger::new(shared.config.reject_log_interval),
            shared: Arc::new(shared),
            ingest: parking_lot::Mutex::new(()),
            drain: tokio::sync::Mutex::new(()),
            flushers: AtomicUsize::new(0),
            runtime,
        })
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod processor_test;
