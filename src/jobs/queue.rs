//! In-process FIFO job queue.
//!
//! Multiple producers (API intake, WebSocket audio intake) push dispatch
//! records; multiple consumers (the worker pool) pop them. Removal happens
//! under one mutex, so a record is observed by exactly one consumer. Idle
//! consumers park on a [`tokio::sync::Notify`] instead of polling, and a
//! bounded `dequeue` timeout keeps worker loops responsive to shutdown.

use crate::jobs::job::DispatchRecord;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// FIFO queue of transcription dispatch records.
///
/// ## Concurrency:
/// - `enqueue` and `dequeue` may be called from any number of tasks
/// - A record is handed to at most one consumer
/// - `dequeue` suspends without consuming CPU while the queue is empty
pub struct JobQueue {
    items: Mutex<VecDeque<DispatchRecord>>,
    available: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Append a dispatch record and wake one idle consumer.
    pub async fn enqueue(&self, record: DispatchRecord) {
        self.items.lock().await.push_back(record);
        self.available.notify_one();
    }

    /// Pop the oldest record, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout. Never fails: queue pressure degrades to
    /// "no job available", which the worker loop treats as an idle poll.
    pub async fn dequeue(&self, timeout: Duration) -> Option<DispatchRecord> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking the queue so a notify that
            // lands between the check and the await is not lost.
            let notified = self.available.notified();

            {
                let mut items = self.items.lock().await;
                if let Some(record) = items.pop_front() {
                    // notify_one does not accumulate permits, so pass the
                    // wakeup along if more work is waiting behind this record.
                    if !items.is_empty() {
                        self.available.notify_one();
                    }
                    return Some(record);
                }
            }

            let remaining = deadline.checked_duration_since(Instant::now())?;
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Current queue depth.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
