//! # Application State Management
//!
//! Shared state that every HTTP handler, WebSocket actor, and worker can
//! reach. This follows one pattern throughout: `Arc` for shared ownership,
//! `RwLock` for many-readers/one-writer access, and short critical sections
//! that clone data out rather than holding locks across awaits.
//!
//! The pipeline components (job store, meeting store, connection manager) are
//! owned here and handed to handlers via `web::Data`, never as ambient
//! globals.

use crate::config::AppConfig;
use crate::connections::ConnectionManager;
use crate::jobs::JobStore;
use crate::meetings::MeetingStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be partially updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Transcription job status records and work queue
    pub jobs: Arc<JobStore>,

    /// Meeting metadata and running transcripts
    pub meetings: Arc<MeetingStore>,

    /// Live viewer connection registry
    pub connections: Arc<ConnectionManager>,

    /// HTTP request metrics (updated by middleware on every request)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, safe to share directly)
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP traffic.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Requests currently being processed
    pub in_flight: u64,

    /// Detailed metrics for each API endpoint
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint performance metrics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        jobs: Arc<JobStore>,
        meetings: Arc<MeetingStore>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            jobs,
            meetings,
            connections,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately so other tasks aren't blocked;
    /// `AppConfig` is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Webhook callback URL handed to jobs created by this server.
    pub fn webhook_url(&self) -> String {
        self.config.read().unwrap().webhook_url()
    }

    pub fn request_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
        metrics.in_flight += 1;
    }

    pub fn request_finished(&self) {
        let mut metrics = self.metrics.write().unwrap();
        // Underflow guard: a restart mid-request would otherwise panic here
        if metrics.in_flight > 0 {
            metrics.in_flight -= 1;
        }
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones the data so the lock isn't held while the response serializes.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            in_flight: metrics.in_flight,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
