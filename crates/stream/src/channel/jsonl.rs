//! JSON-lines development channel
//!
//! Appends every batch as JSON lines to `<dir>/<project>.<dataset>.<table>.jsonl`.
//! Lets the engine run end to end without the remote write service.
//!
//! Offsets are the running row count of the session, so a reader can tell
//! where each batch starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tonic::Code;

use super::{
    AppendChannel, AppendError, AppendResponse, ChannelError, ChannelFactory, RowError,
};
use crate::batch::Batch;
use crate::destination::Destination;

/// File-backed append channel
pub struct JsonLinesChannel {
    dir: PathBuf,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
    offset: Arc<AtomicI64>,
}

impl JsonLinesChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: Arc::new(Mutex::new(None)),
            offset: Arc::new(AtomicI64::new(0)),
        }
    }

    /// File a destination is written to
    pub fn path_for(dir: &Path, destination: &Destination) -> PathBuf {
        dir.join(format!("{destination}.jsonl"))
    }

    fn encode(batch: &Batch) -> Result<Vec<u8>, AppendError> {
        let mut buf = Vec::with_capacity(batch.estimated_size() * 2);
        let mut row_errors = Vec::new();

        for (index, record) in batch.records().iter().enumerate() {
            match serde_json::to_writer(&mut buf, record) {
                Ok(()) => buf.push(b'\n'),
                Err(e) => row_errors.push(RowError {
                    index,
                    message: e.to_string(),
                }),
            }
        }

        if row_errors.is_empty() {
            Ok(buf)
        } else {
            Err(AppendError::Serialization { row_errors })
        }
    }
}

#[async_trait]
impl AppendChannel for JsonLinesChannel {
    async fn initialize(&self, destination: &Destination) -> Result<(), ChannelError> {
        let mut writer = self.writer.lock().await;

        if let Some(mut previous) = writer.take() {
            previous.flush().await?;
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = Self::path_for(&self.dir, destination);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ChannelError::Connect {
                destination: destination.to_string(),
                message: format!("{}: {e}", path.display()),
            })?;

        tracing::debug!(
            destination = %destination,
            path = %path.display(),
            "json-lines session opened"
        );

        *writer = Some(BufWriter::new(file));
        self.offset.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn append(&self, batch: &Batch) -> BoxFuture<'static, Result<AppendResponse, AppendError>> {
        let encoded = match Self::encode(batch) {
            Ok(buf) => buf,
            Err(e) => return futures_util::future::ready(Err(e)).boxed(),
        };

        write_lines(
            Arc::clone(&self.writer),
            Arc::clone(&self.offset),
            encoded,
            batch.len() as i64,
        )
        .boxed()
    }

    async fn close(&self) {
        if let Some(mut file) = self.writer.lock().await.take()
            && let Err(e) = file.shutdown().await
        {
            tracing::warn!(error = %e, "failed to flush json-lines session on close");
        }
    }
}

async fn write_lines(
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
    offset: Arc<AtomicI64>,
    encoded: Vec<u8>,
    rows: i64,
) -> Result<AppendResponse, AppendError> {
    let mut guard = writer.lock().await;
    let Some(file) = guard.as_mut() else {
        return Err(AppendError::status(
            Code::FailedPrecondition,
            "json-lines session is not open",
        ));
    };

    file.write_all(&encoded)
        .await
        .map_err(|e| AppendError::Transport(e.to_string()))?;
    file.flush()
        .await
        .map_err(|e| AppendError::Transport(e.to_string()))?;

    Ok(AppendResponse::ok(offset.fetch_add(rows, Ordering::Relaxed)))
}

/// Creates a [`JsonLinesChannel`] per destination, all under one directory
#[derive(Debug, Clone)]
pub struct JsonLinesChannelFactory {
    dir: PathBuf,
}

impl JsonLinesChannelFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ChannelFactory for JsonLinesChannelFactory {
    fn create(&self, _destination: &Destination) -> Arc<dyn AppendChannel> {
        Arc::new(JsonLinesChannel::new(self.dir.clone()))
    }
}

#[cfg(test)]
#[path = "jsonl_test.rs"]
mod jsonl_test;
