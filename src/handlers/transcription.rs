//! Transcription intake and status endpoints.
//!
//! `POST /api/v1/transcribe` accepts a job for an already-materialized audio
//! artifact. The file-existence check lives here, on the API side, not in the
//! queue: a request for a missing artifact is an input error reported
//! synchronously, and no job is ever created for it.

use crate::audio::storage;
use crate::error::{AppError, AppResult};
use crate::jobs::JobStatus;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request to queue one audio file for transcription.
#[derive(Debug, Deserialize)]
pub struct TranscriptionRequest {
    pub meeting_id: String,
    pub filename: String,
    pub webhook_url: String,
}

/// Response for an accepted transcription job.
#[derive(Debug, Serialize)]
pub struct TranscriptionAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub queue_position: usize,
}

/// Status response for one job.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// POST /api/v1/transcribe
pub async fn submit_transcription(
    request: web::Json<TranscriptionRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();

    if request.meeting_id.is_empty() || request.filename.is_empty() {
        return Err(AppError::ValidationError(
            "meeting_id and filename must not be empty".to_string(),
        ));
    }
    if request.webhook_url.is_empty() {
        return Err(AppError::ValidationError(
            "webhook_url must not be empty".to_string(),
        ));
    }

    let config = state.get_config();
    let audio_path = storage::chunk_path(
        &config.transcription.shared_audio_path,
        &request.meeting_id,
        &request.filename,
    );
    if !audio_path.exists() {
        return Err(AppError::NotFound(format!(
            "Audio file not found: {}",
            request.filename
        )));
    }

    let job_id = state
        .jobs
        .create(&request.meeting_id, &request.filename, &request.webhook_url)
        .await;
    let queue_position = state.jobs.queue_len().await;

    info!(
        "Accepted transcription request for meeting {}, file {} (job {})",
        request.meeting_id, request.filename, job_id
    );

    Ok(HttpResponse::Accepted().json(TranscriptionAccepted {
        job_id,
        status: JobStatus::Queued,
        message: format!("Audio file {} queued for transcription", request.filename),
        queue_position,
    }))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job_status(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job_id = path.into_inner();

    match state.jobs.get_status(&job_id) {
        Some(job) => Ok(HttpResponse::Ok().json(JobStatusResponse {
            job_id: job.job_id,
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            error_message: job.error_message,
        })),
        None => Err(AppError::NotFound("Job not found".to_string())),
    }
}

/// GET /api/v1/stats
pub async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.jobs.stats().await)
}
