//! Batches and the two pending queues
//!
//! Rows wait in the accept queue until a drain cycle packs them into a
//! [`Batch`]. Batches that fail with a retryable error go to the fallback
//! queue and are always drawn before new rows.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

use crate::row::Record;

/// Stable identity of a batch across retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered group of records submitted in one append
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    records: Vec<Record>,
    estimated_size: usize,
}

impl Batch {
    fn new(id: BatchId, records: Vec<Record>, estimated_size: usize) -> Self {
        Self {
            id,
            records,
            estimated_size,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Mutable access for pre-append hooks
    ///
    /// Call [`Batch::refresh_size`] after changing records.
    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// Recompute the estimated size from the current records
    pub fn refresh_size(&mut self) {
        self.estimated_size = self.records.iter().map(Record::estimated_size).sum();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Estimated encoded size in bytes
    pub fn estimated_size(&self) -> usize {
        self.estimated_size
    }
}

/// Accept queue, fallback queue and the batch packer over them
pub(crate) struct BatchQueues {
    accept: Mutex<VecDeque<Record>>,
    fallback: SegQueue<Arc<Batch>>,
    next_id: AtomicU64,
    max_batch_bytes: usize,
}

impl BatchQueues {
    pub(crate) fn new(max_batch_bytes: usize) -> Self {
        Self {
            accept: Mutex::new(VecDeque::new()),
            fallback: SegQueue::new(),
            next_id: AtomicU64::new(0),
            max_batch_bytes,
        }
    }

    pub(crate) fn push_records(&self, records: Vec<Record>) {
        self.accept.lock().extend(records);
    }

    pub(crate) fn requeue(&self, batch: Arc<Batch>) {
        self.fallback.push(batch);
    }

    pub(crate) fn accept_len(&self) -> usize {
        self.accept.lock().len()
    }

    pub(crate) fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fallback.is_empty() && self.accept.lock().is_empty()
    }

    /// Draw the next batch, fallback first
    ///
    /// Fallback batches are returned whole. Otherwise records are taken from
    /// the accept queue while the running size stays within the ceiling; the
    /// record that would overflow it stays at the head of the queue. A record
    /// larger than the ceiling on its own becomes a single-record batch.
    /// Returns `None` when both queues are empty.
    ///
    /// Callers must serialize draws (the processor's drain lock does).
    pub(crate) fn next_batch(&self) -> Option<Batch> {
        if let Some(batch) = self.fallback.pop() {
            return Some(Arc::unwrap_or_clone(batch));
        }

        let mut records = Vec::new();
        let mut size = 0usize;

        loop {
            // lock per record so puts are not blocked by a large draw
            let Some(record) = self.accept.lock().pop_front() else {
                break;
            };

            let record_size = record.estimated_size();
            if !records.is_empty() && size + record_size > self.max_batch_bytes {
                self.accept.lock().push_front(record);
                break;
            }

            size += record_size;
            records.push(record);

            if size >= self.max_batch_bytes {
                break;
            }
        }

        if records.is_empty() {
            return None;
        }

        let id = BatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Some(Batch::new(id, records, size))
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
