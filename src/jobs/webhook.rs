//! Webhook delivery for transcription results.
//!
//! Delivery is at-most-once: a single POST with a bounded timeout, no retry,
//! no backoff, no queueing of failed deliveries. Success is strictly HTTP 200.
//! The caller (a worker) proceeds regardless of the outcome; job status
//! reflects the transcription result, never the delivery result.

use crate::jobs::job::JobResultPayload;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{error, info};

/// Fire-and-forget HTTP notifier for job results.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Build a notifier whose every delivery attempt is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    /// POST the result payload to `url`.
    ///
    /// Returns `true` only for an HTTP 200 response. Every other outcome
    /// (non-200 status, network error, timeout) is logged and reported as
    /// `false`; nothing is retried.
    pub async fn deliver(&self, url: &str, payload: &JobResultPayload) -> bool {
        match self.client.post(url).json(payload).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Webhook sent successfully to {}", url);
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("Webhook failed: {} - {}", status, body);
                false
            }
            Err(err) => {
                error!("Error sending webhook to {}: {}", url, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::DispatchRecord;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn payload() -> JobResultPayload {
        let dispatch = DispatchRecord {
            job_id: "job1".to_string(),
            meeting_id: "m1".to_string(),
            filename: "chunk1.webm".to_string(),
            webhook_url: String::new(),
        };
        JobResultPayload::completed(&dispatch, "hello world".to_string(), 0.9, 1.0)
    }

    /// Spin up a local receiver that answers with the given status code and
    /// counts hits; returns its URL.
    async fn spawn_receiver(
        status: u16,
        hits: Arc<AtomicUsize>,
    ) -> anyhow::Result<String> {
        let server = HttpServer::new(move || {
            let hits = hits.clone();
            App::new().route(
                "/hook",
                web::post().to(move |body: web::Json<JobResultPayload>| {
                    let hits = hits.clone();
                    async move {
                        let _ = body;
                        hits.fetch_add(1, Ordering::SeqCst);
                        HttpResponse::build(
                            actix_web::http::StatusCode::from_u16(status).unwrap(),
                        )
                        .finish()
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

    #[actix_web::test]
    async fn test_deliver_succeeds_on_200() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_receiver(200, hits.clone()).await.unwrap();

        let notifier = WebhookNotifier::new(Duration::from_secs(5));
        assert!(notifier.deliver(&url, &payload()).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_deliver_fails_on_non_200_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_receiver(500, hits.clone()).await.unwrap();

        let notifier = WebhookNotifier::new(Duration::from_secs(5));
        assert!(!notifier.deliver(&url, &payload()).await);
        // At-most-once: exactly one attempt, even on failure
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_deliver_fails_on_connection_error() {
        // Nothing listens on this port
        let notifier = WebhookNotifier::new(Duration::from_secs(1));
        assert!(!notifier.deliver("http://127.0.0.1:9/hook", &payload()).await);
    }
}
