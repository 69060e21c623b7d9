//! Streaming manager
//!
//! Keeps one [`StreamProcessor`] per destination and drives their drain
//! cycles on a fixed-delay schedule.
//!
//! # Scheduling
//!
//! Each registered processor gets a scheduler task: wait `initial_delay`,
//! then run a cycle, wait `delay`, repeat. Cycles across all destinations
//! share a semaphore of `pool_size` permits. Every scheduler listens on a
//! child of the manager's cancellation token.
//!
//! ```text
//! put_row_for_table(dest) ──► registry[dest] ──► StreamProcessor
//!                                   │
//!                 scheduler ────────┘  (semaphore permit per cycle)
//! ```

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tributary_metrics::StreamMetricsProvider;

use crate::callback::{CompletionHandler, NoopCompletionHandler};
use crate::channel::ChannelFactory;
use crate::config::ManagerConfig;
use crate::destination::Destination;
use crate::error::{Result, StreamError};
use crate::hooks::Hooks;
use crate::processor::StreamProcessor;
use crate::row::Row;

/// Point-in-time view of one registered processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatistics {
    pub name: String,
    pub accept_queue_size: usize,
    pub fallback_queue_size: usize,
    pub initialized: bool,
    pub stopped: bool,
}

struct ManagedProcessor {
    processor: Arc<StreamProcessor>,
    cancel: CancellationToken,
    schedule: JoinHandle<()>,
}

/// Registry and scheduler of stream processors
pub struct StreamingManager {
    processors: DashMap<Destination, ManagedProcessor>,
    factory: Arc<dyn ChannelFactory>,
    config: ManagerConfig,
    hooks: Hooks,
    handler: Arc<dyn CompletionHandler>,
    runtime: Handle,
    pool: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl StreamingManager {
    pub fn builder(factory: Arc<dyn ChannelFactory>) -> StreamingManagerBuilder {
        StreamingManagerBuilder {
            factory,
            config: ManagerConfig::default(),
            hooks: Hooks::default(),
            handler: Arc::new(NoopCompletionHandler),
            runtime: None,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Registered processor for `destination`, if any
    pub fn get(&self, destination: &Destination) -> Option<Arc<StreamProcessor>> {
        self.processors
            .get(destination)
            .map(|managed| Arc::clone(&managed.processor))
    }

    /// Number of registered processors
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    fn build_processor(&self, destination: &Destination) -> Result<StreamProcessor> {
        StreamProcessor::builder(destination.clone(), self.factory.create(destination))
            .config(self.config.processor.clone())
            .hooks(self.hooks.clone())
            .handler(Arc::clone(&self.handler))
            .runtime(self.runtime.clone())
            .build()
    }

    /// Get the processor for `destination`, creating and scheduling it if absent
    ///
    /// A new processor is initialized before it is registered; if two
    /// callers race, the loser's processor is closed and the registered one
    /// returned. Fails with [`StreamError::ShutDown`] once the manager has
    /// been shut down.
    pub async fn create_stream_processor(
        &self,
        destination: &Destination,
    ) -> Result<Arc<StreamProcessor>> {
        if let Some(existing) = self.get(destination) {
            return Ok(existing);
        }
        if self.cancel.is_cancelled() {
            return Err(StreamError::ShutDown);
        }

        let processor = Arc::new(self.build_processor(destination)?);
        processor.initialize().await?;

        let raced = match self.processors.entry(destination.clone()) {
            Entry::Occupied(entry) => Some(Ok(Arc::clone(&entry.get().processor))),
            Entry::Vacant(_) if self.cancel.is_cancelled() => Some(Err(StreamError::ShutDown)),
            Entry::Vacant(entry) => {
                let cancel = self.cancel.child_token();
                let schedule = self.runtime.spawn(schedule(
                    Arc::clone(&processor),
                    Arc::clone(&self.pool),
                    self.config.clone(),
                    cancel.clone(),
                ));
                entry.insert(ManagedProcessor {
                    processor: Arc::clone(&processor),
                    cancel,
                    schedule,
                });
                None
            }
        };

        match raced {
            Some(outcome) => {
                processor.close().await?;
                outcome
            }
            None => {
                tracing::info!(destination = %destination, "stream processor registered");
                Ok(processor)
            }
        }
    }

    /// An initialized processor that is neither registered nor scheduled
    ///
    /// The caller drives it and must close it.
    pub async fn standalone_stream_processor(
        &self,
        destination: &Destination,
    ) -> Result<Arc<StreamProcessor>> {
        let processor = Arc::new(self.build_processor(destination)?);
        processor.initialize().await?;
        Ok(processor)
    }

    /// Run `f` against a standalone processor, closing it afterwards
    ///
    /// The processor is closed whether `f` succeeds or not; the first error
    /// (from `f`, then from close) is returned.
    pub async fn execute_once_on_standalone<F, Fut, T>(
        &self,
        destination: &Destination,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<StreamProcessor>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let processor = self.standalone_stream_processor(destination).await?;
        let result = f(Arc::clone(&processor)).await;
        let closed = processor.close().await;

        let value = result?;
        closed?;
        Ok(value)
    }

    /// Like [`execute_once_on_standalone`], routing any error to `on_error`
    ///
    /// [`execute_once_on_standalone`]: Self::execute_once_on_standalone
    pub async fn execute_once_on_standalone_or_else<F, Fut, T, E>(
        &self,
        destination: &Destination,
        f: F,
        on_error: E,
    ) -> Option<T>
    where
        F: FnOnce(Arc<StreamProcessor>) -> Fut,
        Fut: Future<Output = Result<T>>,
        E: FnOnce(StreamError),
    {
        match self.execute_once_on_standalone(destination, f).await {
            Ok(value) => Some(value),
            Err(e) => {
                on_error(e);
                None
            }
        }
    }

    /// Queue rows for `destination`, creating its processor if needed
    pub async fn put_batch_for_table<I>(&self, destination: &Destination, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Row>,
    {
        let processor = self.create_stream_processor(destination).await?;
        Ok(processor.put_batch(rows))
    }

    /// Queue one row for `destination`, creating its processor if needed
    pub async fn put_row_for_table(&self, destination: &Destination, row: Row) -> Result<usize> {
        let processor = self.create_stream_processor(destination).await?;
        Ok(processor.put_one(row))
    }

    pub async fn force_flush_stream_for_table(&self, destination: &Destination) -> Result<()> {
        let processor = self
            .get(destination)
            .ok_or_else(|| StreamError::ProcessorNotFound(destination.to_string()))?;
        processor.force_flush().await
    }

    /// Force flush every registered processor concurrently
    ///
    /// Per-processor errors are logged. Fails with `FlushTimeout` if the
    /// flushes do not finish within `flush_all_timeout`.
    pub async fn force_flush_all(&self) -> Result<()> {
        let processors = self.snapshot();
        let timeout = self.config.flush_all_timeout;

        let flushes = join_all(processors.iter().map(|p| async move {
            if let Err(e) = p.force_flush().await {
                tracing::warn!(destination = %p.name(), error = %e, "force flush failed");
            }
        }));

        tokio::time::timeout(timeout, flushes)
            .await
            .map_err(|_| StreamError::FlushTimeout(timeout))?;

        tracing::info!(processors = processors.len(), "all streams flushed");
        Ok(())
    }

    /// Close the processor for `destination` and deregister it
    ///
    /// Returns `false` if nothing was registered.
    pub async fn flush_stream_and_close(&self, destination: &Destination) -> Result<bool> {
        let Some((_, managed)) = self.processors.remove(destination) else {
            tracing::debug!(destination = %destination, "no stream processor to close");
            return Ok(false);
        };

        managed.cancel.cancel();
        managed.processor.close().await?;
        if let Err(e) = managed.schedule.await {
            tracing::warn!(destination = %destination, error = %e, "scheduler task failed");
        }
        Ok(true)
    }

    /// Flush the processor for `destination`, then rotate its session
    pub async fn flush_stream_and_reinitialize(&self, destination: &Destination) -> Result<()> {
        let Some(processor) = self.get(destination) else {
            tracing::warn!(
                destination = %destination,
                "no stream processor to reinitialize"
            );
            return Ok(());
        };

        processor.force_flush().await?;
        processor.initialize().await
    }

    /// Statistics for every registered processor, ordered by name
    pub fn statistics(&self) -> Vec<StreamStatistics> {
        let mut stats: Vec<_> = self
            .processors
            .iter()
            .map(|entry| {
                let p = &entry.value().processor;
                StreamStatistics {
                    name: p.name().to_string(),
                    accept_queue_size: p.accept_queue_len(),
                    fallback_queue_size: p.fallback_queue_len(),
                    initialized: p.is_initialized(),
                    stopped: p.is_stopped(),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Metrics handles of every registered processor
    pub fn metrics_handles(&self) -> Vec<Arc<dyn StreamMetricsProvider>> {
        self.processors
            .iter()
            .map(|entry| {
                Arc::new(entry.value().processor.metrics_handle()) as Arc<dyn StreamMetricsProvider>
            })
            .collect()
    }

    /// Close every processor and stop all schedules
    ///
    /// Bounded by `flush_all_timeout`; processors still flushing when it
    /// expires are abandoned and `FlushTimeout` is returned.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();

        let keys: Vec<Destination> = self.processors.iter().map(|e| e.key().clone()).collect();
        let managed: Vec<ManagedProcessor> = keys
            .iter()
            .filter_map(|key| self.processors.remove(key).map(|(_, m)| m))
            .collect();

        let count = managed.len();
        let timeout = self.config.flush_all_timeout;
        let closes = join_all(managed.into_iter().map(|m| async move {
            if let Err(e) = m.processor.close().await {
                tracing::warn!(destination = %m.processor.name(), error = %e, "close failed");
            }
            if let Err(e) = m.schedule.await {
                tracing::warn!(
                    destination = %m.processor.name(),
                    error = %e,
                    "scheduler task failed"
                );
            }
        }));

        tokio::time::timeout(timeout, closes)
            .await
            .map_err(|_| StreamError::FlushTimeout(timeout))?;

        tracing::info!(processors = count, "streaming manager shut down");
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<StreamProcessor>> {
        self.processors
            .iter()
            .map(|entry| Arc::clone(&entry.value().processor))
            .collect()
    }
}

/// Fixed-delay drain loop for one processor
async fn schedule(
    processor: Arc<StreamProcessor>,
    pool: Arc<Semaphore>,
    config: ManagerConfig,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(config.initial_delay) => {}
    }

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = Arc::clone(&pool).acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            return;
        };

        if let Err(e) = processor.run().await {
            tracing::warn!(destination = %processor.name(), error = %e, "scheduled cycle failed");
        }
        drop(permit);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(config.delay) => {}
        }
    }
}

/// Builder for [`StreamingManager`]
pub struct StreamingManagerBuilder {
    factory: Arc<dyn ChannelFactory>,
    config: ManagerConfig,
    hooks: Hooks,
    handler: Arc<dyn CompletionHandler>,
    runtime: Option<Handle>,
}

impl StreamingManagerBuilder {
    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Hooks attached to every processor the manager creates
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Runtime for schedulers and completion tasks
    ///
    /// Defaults to the runtime `build` is called from.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<StreamingManager> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| StreamError::NoRuntime)?,
        };

        Ok(StreamingManager {
            processors: DashMap::new(),
            factory: self.factory,
            pool: Arc::new(Semaphore::new(self.config.pool_size)),
            config: self.config,
            hooks: self.hooks,
            handler: self.handler,
            runtime,
            cancel: CancellationToken::new(),
        })
    }
}
