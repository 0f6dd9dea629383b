//! Transcription worker pool.
//!
//! A fixed number of workers run the same loop: block on the queue with a
//! short timeout, mark the job processing, run the blocking transcription
//! call on the blocking pool, record the terminal status, then attempt the
//! webhook exactly once. A worker never exits on error: any failure inside
//! one job's processing is logged and the worker moves on to the next job.

use crate::audio::storage;
use crate::jobs::job::{DispatchRecord, JobResultPayload, JobStatus};
use crate::jobs::store::JobStore;
use crate::jobs::webhook::WebhookNotifier;
use crate::transcription::{TranscribeError, Transcriber, TranscriptionOutput};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Handle to the spawned worker tasks.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Each worker owns nothing exclusively; all state
    /// is shared through the store, the transcriber, and the notifier.
    pub fn spawn(
        count: usize,
        store: Arc<JobStore>,
        transcriber: Arc<dyn Transcriber>,
        notifier: Arc<WebhookNotifier>,
        shared_audio_path: PathBuf,
        dequeue_timeout: Duration,
    ) -> Self {
        let handles = (1..=count)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    store: store.clone(),
                    transcriber: transcriber.clone(),
                    notifier: notifier.clone(),
                    shared_audio_path: shared_audio_path.clone(),
                    dequeue_timeout,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self { handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Abort all worker tasks. Used on shutdown; in-flight blocking
    /// transcription calls finish on the blocking pool but their results are
    /// discarded.
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

struct Worker {
    worker_id: usize,
    store: Arc<JobStore>,
    transcriber: Arc<dyn Transcriber>,
    notifier: Arc<WebhookNotifier>,
    shared_audio_path: PathBuf,
    dequeue_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        info!("Starting transcription worker {}", self.worker_id);
        loop {
            if let Some(dispatch) = self.store.dequeue(self.dequeue_timeout).await {
                self.process_job(dispatch).await;
            }
        }
    }

    /// Process one job end to end. Every outcome, success or failure, ends
    /// with a terminal status and a single webhook attempt.
    async fn process_job(&self, dispatch: DispatchRecord) {
        info!(
            "Worker {}: Starting transcription job {} for meeting {}, file {}",
            self.worker_id, dispatch.job_id, dispatch.meeting_id, dispatch.filename
        );
        self.store
            .update_status(&dispatch.job_id, JobStatus::Processing, None);

        let started = Instant::now();
        let result = self.transcribe(&dispatch).await;
        let processing_time = started.elapsed().as_secs_f64();

        let payload = match result {
            Ok(output) => {
                self.store
                    .update_status(&dispatch.job_id, JobStatus::Completed, None);
                info!(
                    "Worker {}: Transcription job {} completed in {:.2}s",
                    self.worker_id, dispatch.job_id, processing_time
                );
                JobResultPayload::completed(
                    &dispatch,
                    output.text,
                    output.confidence,
                    processing_time,
                )
            }
            Err(err) => {
                let error_message = err.to_string();
                error!(
                    "Worker {}: Transcription job {} failed: {}",
                    self.worker_id, dispatch.job_id, error_message
                );
                self.store.update_status(
                    &dispatch.job_id,
                    JobStatus::Failed,
                    Some(error_message.clone()),
                );
                JobResultPayload::failed(&dispatch, error_message, processing_time)
            }
        };

        // Exactly one delivery attempt; the outcome never touches job status
        let delivered = self
            .notifier
            .deliver(&dispatch.webhook_url, &payload)
            .await;
        if !delivered {
            warn!(
                "Worker {}: Job {} finished as {} but webhook delivery failed",
                self.worker_id,
                dispatch.job_id,
                payload.status.as_str()
            );
        }
    }

    /// Resolve the audio artifact and run the blocking transcription call on
    /// the blocking pool, so only this worker stalls for its duration.
    async fn transcribe(
        &self,
        dispatch: &DispatchRecord,
    ) -> Result<TranscriptionOutput, TranscribeError> {
        let audio_path = storage::chunk_path(
            &self.shared_audio_path,
            &dispatch.meeting_id,
            &dispatch.filename,
        );

        if !audio_path.exists() {
            return Err(TranscribeError::AudioNotFound(audio_path));
        }

        let transcriber = self.transcriber.clone();
        tokio::task::spawn_blocking(move || transcriber.transcribe(&audio_path))
            .await
            .map_err(|join_err| {
                TranscribeError::Api(format!("transcription task aborted: {}", join_err))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::path::Path;
    use std::sync::Mutex;

    /// Deterministic transcriber for pool tests.
    struct MockTranscriber {
        result: Result<String, String>,
    }

    impl Transcriber for MockTranscriber {
        fn transcribe(&self, _audio_path: &Path) -> Result<TranscriptionOutput, TranscribeError> {
            match &self.result {
                Ok(text) => Ok(TranscriptionOutput {
                    text: text.clone(),
                    confidence: 0.9,
                }),
                Err(message) => Err(TranscribeError::Api(message.clone())),
            }
        }
    }

    /// Webhook receiver that records every payload it is handed.
    async fn spawn_receiver(received: Arc<Mutex<Vec<JobResultPayload>>>) -> anyhow::Result<String> {
        let server = HttpServer::new(move || {
            let received = received.clone();
            App::new().route(
                "/hook",
                web::post().to(move |body: web::Json<JobResultPayload>| {
                    let received = received.clone();
                    async move {
                        received.lock().unwrap().push(body.into_inner());
                        HttpResponse::Ok().finish()
                    }
                }),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))?;

        let addr = server.addrs()[0];
        tokio::spawn(server.run());
        Ok(format!("http://{}/hook", addr))
    }

    async fn wait_for_terminal(store: &JobStore, job_id: &str) -> JobStatus {
        for _ in 0..100 {
            if let Some(job) = store.get_status(job_id) {
                if job.status.is_terminal() {
                    return job.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} never reached a terminal status", job_id);
    }

    fn write_chunk(root: &Path, meeting_id: &str, filename: &str) {
        let dir = root.join(meeting_id).join("audio");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), b"webm-bytes").unwrap();
    }

    #[actix_web::test]
    async fn test_worker_completes_job_and_delivers_webhook() {
        let tmp = tempfile::tempdir().unwrap();
        write_chunk(tmp.path(), "m1", "chunk1.webm");

        let received = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_receiver(received.clone()).await.unwrap();

        let store = Arc::new(JobStore::new(Duration::from_secs(3600)));
        let pool = WorkerPool::spawn(
            2,
            store.clone(),
            Arc::new(MockTranscriber {
                result: Ok("hello world".to_string()),
            }),
            Arc::new(WebhookNotifier::new(Duration::from_secs(5))),
            tmp.path().to_path_buf(),
            Duration::from_millis(100),
        );

        let job_id = store.create("m1", "chunk1.webm", &url).await;
        let status = wait_for_terminal(&store, &job_id).await;
        assert_eq!(status, JobStatus::Completed);

        // The webhook can lag the status write by a beat
        for _ in 0..100 {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let payloads = received.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].job_id, job_id);
        assert_eq!(payloads[0].status, JobStatus::Completed);
        assert_eq!(payloads[0].transcription_text.as_deref(), Some("hello world"));
        assert!(payloads[0].confidence.is_some());

        pool.shutdown();
    }

    #[actix_web::test]
    async fn test_missing_audio_fails_job_with_not_found_message() {
        let tmp = tempfile::tempdir().unwrap();
        // No chunk written: the artifact is missing

        let received = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_receiver(received.clone()).await.unwrap();

        let store = Arc::new(JobStore::new(Duration::from_secs(3600)));
        let pool = WorkerPool::spawn(
            1,
            store.clone(),
            Arc::new(MockTranscriber {
                result: Ok("never reached".to_string()),
            }),
            Arc::new(WebhookNotifier::new(Duration::from_secs(5))),
            tmp.path().to_path_buf(),
            Duration::from_millis(100),
        );

        let job_id = store.create("m1", "missing.webm", &url).await;
        let status = wait_for_terminal(&store, &job_id).await;
        assert_eq!(status, JobStatus::Failed);

        let job = store.get_status(&job_id).unwrap();
        assert!(job.error_message.unwrap().contains("not found"));

        for _ in 0..100 {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let payloads = received.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].status, JobStatus::Failed);
        assert!(payloads[0].transcription_text.is_none());

        pool.shutdown();
    }

    #[actix_web::test]
    async fn test_webhook_failure_does_not_downgrade_completed_job() {
        let tmp = tempfile::tempdir().unwrap();
        write_chunk(tmp.path(), "m1", "chunk1.webm");

        let store = Arc::new(JobStore::new(Duration::from_secs(3600)));
        let pool = WorkerPool::spawn(
            1,
            store.clone(),
            Arc::new(MockTranscriber {
                result: Ok("hello world".to_string()),
            }),
            Arc::new(WebhookNotifier::new(Duration::from_secs(1))),
            tmp.path().to_path_buf(),
            Duration::from_millis(100),
        );

        // Nothing listens here: delivery will fail
        let job_id = store.create("m1", "chunk1.webm", "http://127.0.0.1:9/hook").await;
        let status = wait_for_terminal(&store, &job_id).await;
        assert_eq!(status, JobStatus::Completed);

        // Give the failed delivery time to (not) do anything, then re-check
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.get_status(&job_id).unwrap().status,
            JobStatus::Completed
        );

        pool.shutdown();
    }

    /// A transcription error terminates the job without poisoning the worker:
    /// the same worker must pick up and complete the next job.
    #[actix_web::test]
    async fn test_worker_survives_job_failure() {
        let tmp = tempfile::tempdir().unwrap();
        write_chunk(tmp.path(), "m1", "bad.webm");
        write_chunk(tmp.path(), "m1", "good.webm");

        let received = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_receiver(received.clone()).await.unwrap();

        let store = Arc::new(JobStore::new(Duration::from_secs(3600)));

        // First job fails at the API, second succeeds; one worker handles both
        struct FlakyTranscriber {
            calls: Mutex<usize>,
        }
        impl Transcriber for FlakyTranscriber {
            fn transcribe(
                &self,
                _audio_path: &Path,
            ) -> Result<TranscriptionOutput, TranscribeError> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    Err(TranscribeError::Api("upstream 500".to_string()))
                } else {
                    Ok(TranscriptionOutput {
                        text: "recovered".to_string(),
                        confidence: 0.9,
                    })
                }
            }
        }

        let pool = WorkerPool::spawn(
            1,
            store.clone(),
            Arc::new(FlakyTranscriber {
                calls: Mutex::new(0),
            }),
            Arc::new(WebhookNotifier::new(Duration::from_secs(5))),
            tmp.path().to_path_buf(),
            Duration::from_millis(100),
        );

        let bad = store.create("m1", "bad.webm", &url).await;
        let good = store.create("m1", "good.webm", &url).await;

        assert_eq!(wait_for_terminal(&store, &bad).await, JobStatus::Failed);
        assert_eq!(wait_for_terminal(&store, &good).await, JobStatus::Completed);

        let bad_job = store.get_status(&bad).unwrap();
        assert!(bad_job.error_message.unwrap().contains("upstream 500"));

        pool.shutdown();
    }
}
