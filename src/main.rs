//! # Meeting Transcribe Backend - Main Application Entry Point
//!
//! This is the main entry point for the meeting transcription web server.
//! It sets up an Actix-web HTTP server with the following key features:
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML files + environment variables)
//! - **state**: Shared application state (stores, registries, metrics)
//! - **jobs**: Job queue, status store, worker pool, and webhook notifier
//! - **connections**: Per-meeting viewer registry with capped admission
//! - **meetings**: Meeting metadata and running transcripts
//! - **audio**: Chunk persistence on the shared storage volume
//! - **transcription**: The external speech-to-text call behind a trait seam
//! - **websocket**: The per-connection socket actor
//! - **handlers**: HTTP request handlers for API endpoints
//! - **health / middleware / error**: Monitoring, request plumbing, error types
//!
//! ## Runtime Shape:
//! One process hosts the ingestion API, the N transcription workers, and all
//! live socket actors as independent tasks sharing process memory. Workers
//! deliver results back to this server's own webhook endpoint, which updates
//! the transcript and fans notifications out to viewers.

mod audio;
mod config;
mod connections;
mod error;
mod handlers;
mod health;
mod jobs;
mod meetings;
mod middleware;
mod state;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use connections::ConnectionManager;
use jobs::{JobStore, WebhookNotifier, WorkerPool};
use meetings::MeetingStore;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::WhisperApiTranscriber;

/// Global shutdown signal set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Bound on one speech-to-text API call. Long recordings transcribe slowly,
/// so this is far looser than the webhook timeout.
const TRANSCRIPTION_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// How often expired job records are swept out of the status store.
const JOB_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!(
        "Starting meeting-transcribe-backend v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Configuration loaded: {}:{}, {} workers",
        config.server.host, config.server.port, config.transcription.worker_count
    );

    // The shared audio volume is this process's one hard infrastructure
    // dependency: refuse to start without it. Per-operation storage errors
    // during steady state are handled where they occur.
    audio::storage::ensure_root(&config.transcription.shared_audio_path).with_context(|| {
        format!(
            "Shared audio storage unavailable at {}",
            config.transcription.shared_audio_path.display()
        )
    })?;

    let jobs = Arc::new(JobStore::new(Duration::from_secs(config.limits.job_ttl_secs)));
    let meetings = Arc::new(MeetingStore::new());
    let connections = Arc::new(ConnectionManager::new(
        config.limits.max_connections_per_meeting,
    ));

    let transcriber = Arc::new(WhisperApiTranscriber::new(
        config.transcription.api_endpoint.clone(),
        config.transcription.api_key.clone(),
        TRANSCRIPTION_REQUEST_TIMEOUT,
    ));
    let notifier = Arc::new(WebhookNotifier::new(Duration::from_secs(
        config.transcription.webhook_timeout_secs,
    )));

    let worker_pool = WorkerPool::spawn(
        config.transcription.worker_count,
        jobs.clone(),
        transcriber,
        notifier,
        config.transcription.shared_audio_path.clone(),
        Duration::from_secs(config.transcription.dequeue_timeout_secs),
    );
    info!("Spawned {} transcription workers", worker_pool.worker_count());

    spawn_job_sweeper(jobs.clone());

    let app_state = AppState::new(config.clone(), jobs, meetings, connections);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/meetings", web::post().to(handlers::create_meeting))
                    .route("/meetings", web::get().to(handlers::list_meetings))
                    .route("/meetings/{meeting_id}", web::get().to(handlers::get_meeting))
                    .route(
                        "/meetings/{meeting_id}",
                        web::delete().to(handlers::delete_meeting),
                    )
                    .route("/transcribe", web::post().to(handlers::submit_transcription))
                    .route("/jobs/{job_id}", web::get().to(handlers::get_job_status))
                    .route("/stats", web::get().to(handlers::get_stats))
                    .route(
                        "/webhooks/transcription",
                        web::post().to(handlers::transcription_webhook),
                    ),
            )
            .route("/health", web::get().to(health::health_check))
            .route(
                "/ws/meetings/{meeting_id}",
                web::get().to(websocket::meeting_websocket),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    worker_pool.shutdown();
    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_transcribe_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Periodically drop job records whose retention window has passed. Reads
/// already treat expired records as absent; the sweep just reclaims memory.
fn spawn_job_sweeper(jobs: Arc<JobStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(JOB_SWEEP_INTERVAL);
        // The first tick fires immediately; skip it
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = jobs.prune_expired();
            if removed > 0 {
                info!("Job sweeper removed {} expired records", removed);
            }
        }
    });
}

/// Listen for SIGTERM/SIGINT and flip the global shutdown flag, so the server
/// can finish in-flight requests instead of stopping mid-response.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
