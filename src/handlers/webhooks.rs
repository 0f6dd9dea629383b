//! Webhook receiver for transcription results.
//!
//! Workers POST their result payloads here. On success the chunk's text is
//! appended to the meeting's running transcript (serialized per meeting by
//! the store) and the outcome is broadcast to every live viewer. Failures
//! are broadcast with the verbatim error text so viewers see an explicit
//! reason rather than silence.

use crate::error::{AppError, AppResult};
use crate::jobs::{JobResultPayload, JobStatus};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{error, info, warn};

/// Longest transcript excerpt carried in a notification frame.
const SNIPPET_CHARS: usize = 100;

/// POST /api/v1/webhooks/transcription
pub async fn transcription_webhook(
    payload: web::Json<JobResultPayload>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let result = payload.into_inner();

    info!(
        "Received transcription webhook for meeting {}, file {}, status: {}",
        result.meeting_id,
        result.filename,
        result.status.as_str()
    );

    if !state.meetings.exists(&result.meeting_id) {
        error!("Meeting not found for webhook: {}", result.meeting_id);
        return Err(AppError::NotFound("Meeting not found".to_string()));
    }

    match result.status {
        JobStatus::Completed => handle_success(&result, &state),
        JobStatus::Failed => handle_failure(&result, &state),
        other => {
            warn!(
                "Ignoring webhook with non-terminal status {} for job {}",
                other.as_str(),
                result.job_id
            );
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Webhook processed"
    })))
}

fn handle_success(result: &JobResultPayload, state: &AppState) {
    let text = result
        .transcription_text
        .as_deref()
        .filter(|t| !t.is_empty());

    let Some(text) = text else {
        warn!(
            "No transcription text received for file {} in meeting {}",
            result.filename, result.meeting_id
        );
        state.connections.broadcast(
            &result.meeting_id,
            "transcription_status",
            "warning",
            &format!("No transcription text received for {}", result.filename),
            None,
        );
        return;
    };

    if state
        .meetings
        .append_transcription(&result.meeting_id, text)
        .is_none()
    {
        // Meeting deleted between the existence check and the append; the
        // broadcast below would reach nobody anyway
        warn!(
            "Meeting {} vanished before transcript append",
            result.meeting_id
        );
        return;
    }

    info!(
        "Updated meeting {} with {} characters from {}",
        result.meeting_id,
        text.len(),
        result.filename
    );

    let snippet: String = if text.chars().count() > SNIPPET_CHARS {
        format!("{}...", text.chars().take(SNIPPET_CHARS).collect::<String>())
    } else {
        text.to_string()
    };

    state.connections.broadcast(
        &result.meeting_id,
        "transcription_status",
        "completed",
        &format!(
            "Transcription completed for audio chunk ({})",
            result.filename
        ),
        Some(json!({
            "text_snippet": snippet,
            "full_text": text,
        })),
    );
}

fn handle_failure(result: &JobResultPayload, state: &AppState) {
    let reason = result.error_message.as_deref().unwrap_or("Unknown error");
    error!(
        "Transcription failed for meeting {}, file {}: {}",
        result.meeting_id, result.filename, reason
    );

    state.connections.broadcast(
        &result.meeting_id,
        "transcription_status",
        "failed",
        &format!("Transcription failed for {}: {}", result.filename, reason),
        None,
    );
}
