//! Testing utilities
//!
//! Scripted in-memory channels for exercising processors and the manager
//! without a write service.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::Code;

use crate::batch::{Batch, BatchId};
use crate::channel::{
    AppendChannel, AppendError, AppendResponse, ChannelError, ChannelFactory, RowError,
};
use crate::destination::Destination;
use crate::row::{Row, Value};

/// Scripted result of one append
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Acknowledged without error
    Success,
    /// Acknowledged with an error in the response body
    ServerError(Code, String),
    /// Failed with a status
    Status(Code),
    /// Failed with a status carrying row errors
    InvalidRows(Vec<RowError>),
    /// Failed without a status
    Transport(String),
}

/// What the mock saw for one append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendRecord {
    pub batch_id: BatchId,
    pub rows: usize,
    pub bytes: usize,
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<MockOutcome>>,
    appends: Mutex<Vec<AppendRecord>>,
    initialize_calls: AtomicUsize,
    close_calls: AtomicUsize,
    initialize_failures: AtomicUsize,
    offset: AtomicI64,
    hold: Mutex<Option<CancellationToken>>,
}

/// In-memory append channel with scripted outcomes
///
/// Appends succeed unless an outcome was scripted for them. Clones share
/// state, so a test can keep one clone while a processor owns another.
#[derive(Clone, Default)]
pub struct MockChannel {
    state: Arc<MockState>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next appends, in order
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.state.script.lock().extend(outcomes);
    }

    /// Make the next `n` initialize calls fail
    pub fn fail_initialize(&self, n: usize) {
        self.state.initialize_failures.store(n, Ordering::SeqCst);
    }

    /// Keep append futures pending until [`MockChannel::release`]
    pub fn hold(&self) {
        *self.state.hold.lock() = Some(CancellationToken::new());
    }

    /// Complete every held append and stop holding
    pub fn release(&self) {
        if let Some(token) = self.state.hold.lock().take() {
            token.cancel();
        }
    }

    pub fn appends(&self) -> Vec<AppendRecord> {
        self.state.appends.lock().clone()
    }

    pub fn append_count(&self) -> usize {
        self.state.appends.lock().len()
    }

    pub fn initialize_calls(&self) -> usize {
        self.state.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppendChannel for MockChannel {
    async fn initialize(&self, destination: &Destination) -> Result<(), ChannelError> {
        self.state.initialize_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .state
            .initialize_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChannelError::Connect {
                destination: destination.to_string(),
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }

    fn append(&self, batch: &Batch) -> BoxFuture<'static, Result<AppendResponse, AppendError>> {
        self.state.appends.lock().push(AppendRecord {
            batch_id: batch.id(),
            rows: batch.len(),
            bytes: batch.estimated_size(),
        });

        let outcome = self
            .state
            .script
            .lock()
            .pop_front()
            .unwrap_or(MockOutcome::Success);
        let offset = self
            .state
            .offset
            .fetch_add(batch.len() as i64, Ordering::SeqCst);
        let hold = self.state.hold.lock().clone();

        async move {
            if let Some(token) = hold {
                token.cancelled().await;
            }
            match outcome {
                MockOutcome::Success => Ok(AppendResponse::ok(offset)),
                MockOutcome::ServerError(code, message) => {
                    Ok(AppendResponse::with_error(code, message))
                }
                MockOutcome::Status(code) => Err(AppendError::status(code, "scripted status")),
                MockOutcome::InvalidRows(row_errors) => Err(AppendError::Status {
                    code: Code::InvalidArgument,
                    message: "scripted invalid rows".into(),
                    row_errors,
                }),
                MockOutcome::Transport(message) => Err(AppendError::Transport(message)),
            }
        }
        .boxed()
    }

    async fn close(&self) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out [`MockChannel`]s and remembering them per destination
#[derive(Clone, Default)]
pub struct MockChannelFactory {
    channels: Arc<Mutex<Vec<(Destination, MockChannel)>>>,
}

impl MockChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent channel created for `destination`
    pub fn channel(&self, destination: &Destination) -> Option<MockChannel> {
        self.channels
            .lock()
            .iter()
            .rev()
            .find(|(dest, _)| dest == destination)
            .map(|(_, channel)| channel.clone())
    }

    /// Channels created so far
    pub fn created(&self) -> usize {
        self.channels.lock().len()
    }
}

impl ChannelFactory for MockChannelFactory {
    fn create(&self, destination: &Destination) -> Arc<dyn AppendChannel> {
        let channel = MockChannel::new();
        self.channels
            .lock()
            .push((destination.clone(), channel.clone()));
        Arc::new(channel)
    }
}

/// A row with an integer `id` and a string `name` of `name_len` characters
pub fn mock_row(id: i64, name_len: usize) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::Int(id));
    row.insert("name".to_string(), Value::String("n".repeat(name_len)));
    row
}

/// `n` rows of roughly 40 estimated bytes each
pub fn mock_rows(n: usize) -> Vec<Row> {
    (0..n as i64).map(|id| mock_row(id, 34)).collect()
}
