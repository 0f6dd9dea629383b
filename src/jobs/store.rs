//! Job status store with retention-window expiry.
//!
//! Status records live behind a reader-writer lock and become unobservable
//! once their retention window (24h by default) passes: a soft delete, never
//! an explicit one. The store also fronts the FIFO queue so that intake is a
//! single call: write the status record, then enqueue the dispatch record.

use crate::jobs::job::{DispatchRecord, Job, JobStatus};
use crate::jobs::queue::JobQueue;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Internal record: the job plus its expiry deadline.
#[derive(Debug, Clone)]
struct StoredJob {
    job: Job,
    expires_at: DateTime<Utc>,
}

impl StoredJob {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time pipeline statistics.
///
/// The snapshot is not linearizable with concurrent writers; counts may lag
/// by in-flight transitions, which is acceptable for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub processing_jobs: usize,
    pub queued_jobs: usize,
    pub queue_size: usize,
}

/// Keyed job status records plus the FIFO work queue.
///
/// ## Thread Safety:
/// All mutations go through the internal lock, so status updates are atomic
/// per job id; there is no read-then-write window for two workers to race on
/// the same record. The queue has its own synchronization.
pub struct JobStore {
    records: RwLock<HashMap<String, StoredJob>>,
    queue: JobQueue,
    ttl: ChronoDuration,
}

impl JobStore {
    /// Create a store whose records expire `ttl` after creation.
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            queue: JobQueue::new(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(24)),
        }
    }

    /// Create a queued job and hand its dispatch record to the queue.
    ///
    /// The status record is written first; the in-process enqueue cannot fail
    /// after that point, so no partially-created job is ever observable.
    pub async fn create(&self, meeting_id: &str, filename: &str, webhook_url: &str) -> String {
        let job_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let job = Job {
            job_id: job_id.clone(),
            meeting_id: meeting_id.to_string(),
            filename: filename.to_string(),
            status: JobStatus::Queued,
            created_at: now,
            completed_at: None,
            error_message: None,
        };

        {
            let mut records = self.records.write().unwrap();
            records.insert(
                job_id.clone(),
                StoredJob {
                    job,
                    expires_at: now + self.ttl,
                },
            );
        }

        self.queue
            .enqueue(DispatchRecord {
                job_id: job_id.clone(),
                meeting_id: meeting_id.to_string(),
                filename: filename.to_string(),
                webhook_url: webhook_url.to_string(),
            })
            .await;

        info!(
            "Queued transcription job {} for meeting {}, file {}",
            job_id, meeting_id, filename
        );

        job_id
    }

    /// Look up a job's status. Unknown and expired jobs are both `None`.
    pub fn get_status(&self, job_id: &str) -> Option<Job> {
        let records = self.records.read().unwrap();
        let stored = records.get(job_id)?;
        if stored.is_expired(Utc::now()) {
            return None;
        }
        Some(stored.job.clone())
    }

    /// Update a job's status. Best-effort telemetry: unknown, expired, and
    /// already-terminal jobs are ignored rather than treated as errors.
    ///
    /// The first transition into a terminal state stamps `completed_at`;
    /// a terminal record never moves again.
    pub fn update_status(&self, job_id: &str, status: JobStatus, error_message: Option<String>) {
        let mut records = self.records.write().unwrap();
        let Some(stored) = records.get_mut(job_id) else {
            debug!("Status update for unknown job {} ignored", job_id);
            return;
        };
        if stored.is_expired(Utc::now()) || stored.job.status.is_terminal() {
            return;
        }

        stored.job.status = status;
        if let Some(message) = error_message {
            stored.job.error_message = Some(message);
        }
        if status.is_terminal() && stored.job.completed_at.is_none() {
            stored.job.completed_at = Some(Utc::now());
        }
    }

    /// Pop the next dispatch record, waiting up to `timeout`.
    pub async fn dequeue(&self, timeout: Duration) -> Option<DispatchRecord> {
        self.queue.dequeue(timeout).await
    }

    /// Current queue depth.
    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Snapshot of job counts by status plus queue depth.
    pub async fn stats(&self) -> JobStats {
        let queue_size = self.queue.len().await;
        let now = Utc::now();

        let records = self.records.read().unwrap();
        let mut stats = JobStats {
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            processing_jobs: 0,
            queued_jobs: 0,
            queue_size,
        };

        for stored in records.values() {
            if stored.is_expired(now) {
                continue;
            }
            stats.total_jobs += 1;
            match stored.job.status {
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
                JobStatus::Processing => stats.processing_jobs += 1,
                JobStatus::Queued => stats.queued_jobs += 1,
            }
        }

        stats
    }

    /// Drop expired records. Called periodically by the janitor task; expiry
    /// is also enforced lazily on every read, so this only reclaims memory.
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, stored| !stored.is_expired(now));
        let removed = before - records.len();
        if removed > 0 {
            debug!("Pruned {} expired job records", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new(Duration::from_secs(86_400))
    }

    #[tokio::test]
    async fn test_create_writes_queued_record_and_enqueues() {
        let store = store();
        let job_id = store.create("m1", "chunk1.webm", "http://cb/x").await;

        let job = store.get_status(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.meeting_id, "m1");
        assert!(job.completed_at.is_none());
        assert!(job.error_message.is_none());

        let dispatch = store.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(dispatch.job_id, job_id);
        assert_eq!(dispatch.webhook_url, "http://cb/x");
    }

    #[tokio::test]
    async fn test_terminal_transition_stamps_completed_at_once() {
        let store = store();
        let job_id = store.create("m1", "a.webm", "http://cb/x").await;

        store.update_status(&job_id, JobStatus::Processing, None);
        let job = store.get_status(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.completed_at.is_none());

        store.update_status(&job_id, JobStatus::Completed, None);
        let job = store.get_status(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let first_stamp = job.completed_at.expect("terminal status sets completed_at");

        // A terminal record never moves again, in status or timestamp
        store.update_status(&job_id, JobStatus::Failed, Some("late error".to_string()));
        let job = store.get_status(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(first_stamp));
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failed_transition_captures_error_message() {
        let store = store();
        let job_id = store.create("m1", "a.webm", "http://cb/x").await;

        store.update_status(
            &job_id,
            JobStatus::Failed,
            Some("Audio file not found: a.webm".to_string()),
        );

        let job = store.get_status(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        assert!(job.error_message.unwrap().contains("not found"));
    }

    #[test]
    fn test_update_unknown_job_is_noop() {
        let store = store();
        // Must not panic or create a record
        store.update_status("missing", JobStatus::Completed, None);
        assert!(store.get_status("missing").is_none());
    }

    #[tokio::test]
    async fn test_records_expire_after_ttl() {
        let store = JobStore::new(Duration::from_millis(30));
        let job_id = store.create("m1", "a.webm", "http://cb/x").await;
        assert!(store.get_status(&job_id).is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get_status(&job_id).is_none());

        // Sweep reclaims the record itself
        assert_eq!(store.prune_expired(), 1);
        assert_eq!(store.stats().await.total_jobs, 0);
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let store = store();
        let a = store.create("m1", "a.webm", "http://cb/x").await;
        let b = store.create("m1", "b.webm", "http://cb/x").await;
        let c = store.create("m2", "c.webm", "http://cb/x").await;
        let _d = store.create("m2", "d.webm", "http://cb/x").await;

        store.update_status(&a, JobStatus::Processing, None);
        store.update_status(&b, JobStatus::Completed, None);
        store.update_status(&c, JobStatus::Failed, Some("boom".to_string()));

        let stats = store.stats().await;
        assert_eq!(stats.total_jobs, 4);
        assert_eq!(stats.processing_jobs, 1);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 1);
        assert_eq!(stats.queued_jobs, 1);
        assert_eq!(stats.queue_size, 4);
    }
}
