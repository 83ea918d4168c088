//! Bounded queue of whole report records
//!
//! Capacity is counted in payload bytes. A record is either queued entirely
//! or not at all, and is dequeued entirely; there is no partial access.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

struct QueueInner {
    records: VecDeque<Bytes>,
    /// Payload bytes currently queued
    used: usize,
    total_queued: u64,
    total_rejected: u64,
}

/// Outcome of [`RecordQueue::pop_fitting`]
#[derive(Debug, PartialEq, Eq)]
pub enum PopResult {
    Record(Bytes),
    Empty,
    /// Head record is larger than the caller's limit; it was left queued
    TooLarge { needed: usize },
}

/// Byte-bounded FIFO of immutable records
pub struct RecordQueue {
    name: &'static str,
    capacity: usize,
    inner: Mutex<QueueInner>,
}

impl RecordQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            inner: Mutex::new(QueueInner {
                records: VecDeque::new(),
                used: 0,
                total_queued: 0,
                total_rejected: 0,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `record` if it fits, otherwise hand it back untouched
    pub fn push(&self, record: Bytes) -> Result<(), Bytes> {
        let mut inner = self.inner();
        if self.capacity - inner.used < record.len() {
            inner.total_rejected += 1;
            return Err(record);
        }

        inner.used += record.len();
        inner.total_queued += 1;
        trace!(
            "{} queue: +{} bytes ({} records, {}/{} bytes)",
            self.name,
            record.len(),
            inner.records.len() + 1,
            inner.used,
            self.capacity
        );
        inner.records.push_back(record);
        Ok(())
    }

    /// Dequeue the oldest record
    pub fn pop(&self) -> Option<Bytes> {
        let mut inner = self.inner();
        let record = inner.records.pop_front()?;
        inner.used -= record.len();
        Some(record)
    }

    /// Dequeue the oldest record only if it is at most `limit` bytes
    pub fn pop_fitting(&self, limit: usize) -> PopResult {
        let mut inner = self.inner();
        match inner.records.front().map(Bytes::len) {
            None => PopResult::Empty,
            Some(needed) if needed > limit => PopResult::TooLarge { needed },
            Some(_) => match inner.records.pop_front() {
                Some(record) => {
                    inner.used -= record.len();
                    PopResult::Record(record)
                }
                None => PopResult::Empty,
            },
        }
    }

    /// Length of the oldest record
    pub fn peek_len(&self) -> Option<usize> {
        self.inner().records.front().map(Bytes::len)
    }

    pub fn is_empty(&self) -> bool {
        self.inner().records.is_empty()
    }

    /// No byte of capacity left
    pub fn is_full(&self) -> bool {
        self.inner().used >= self.capacity
    }

    /// Free payload bytes
    pub fn available(&self) -> usize {
        self.capacity - self.inner().used
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.inner().records.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything queued, returning the number of records dropped
    pub fn clear(&self) -> usize {
        let mut inner = self.inner();
        let count = inner.records.len();
        inner.records.clear();
        inner.used = 0;
        count
    }

    /// (records queued, records rejected for lack of space)
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner();
        (inner.total_queued, inner.total_rejected)
    }
}
