//! Job records and wire payloads for the transcription pipeline.
//!
//! Every payload that crosses a process boundary (webhook bodies, status
//! responses) is a struct with an exhaustive field set rather than a free-form
//! map, so the wire contract is visible in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a transcription job.
///
/// ## Status Transitions:
/// queued → processing → completed | failed
///
/// Transitions are monotonic: once a job reaches a terminal state it never
/// moves again, and `completed_at` is stamped exactly once at that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted at intake, waiting in the queue
    Queued,
    /// Picked up by a worker
    Processing,
    /// Transcription finished successfully
    Completed,
    /// Transcription failed; `error_message` carries the reason
    Failed,
}

impl JobStatus {
    /// Convert status to string for API responses.
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether this status is terminal (completed or failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Status record for one transcription job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub job_id: String,
    pub meeting_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Dispatch record handed to workers through the queue.
///
/// Carries everything a worker needs so it never has to consult the status
/// store to start processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub job_id: String,
    pub meeting_id: String,
    pub filename: String,
    pub webhook_url: String,
}

/// Result payload delivered to the submitter's webhook endpoint.
///
/// ## Wire Format:
/// Success: `{job_id, meeting_id, filename, transcription_text, confidence,
/// processing_time, status: "completed", processed_at}`.
/// Failure: `{job_id, meeting_id, filename, status: "failed", error_message,
/// processing_time, processed_at}`; the transcription fields are absent, not null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultPayload {
    pub job_id: String,
    pub meeting_id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl JobResultPayload {
    /// Build the success payload for a completed transcription.
    pub fn completed(
        dispatch: &DispatchRecord,
        text: String,
        confidence: f32,
        processing_time: f64,
    ) -> Self {
        Self {
            job_id: dispatch.job_id.clone(),
            meeting_id: dispatch.meeting_id.clone(),
            filename: dispatch.filename.clone(),
            transcription_text: Some(text),
            confidence: Some(confidence),
            processing_time,
            status: JobStatus::Completed,
            error_message: None,
            processed_at: Utc::now(),
        }
    }

    /// Build the failure payload. The error text is passed through verbatim so
    /// viewers see the actual reason rather than a sanitized placeholder.
    pub fn failed(dispatch: &DispatchRecord, error_message: String, processing_time: f64) -> Self {
        Self {
            job_id: dispatch.job_id.clone(),
            meeting_id: dispatch.meeting_id.clone(),
            filename: dispatch.filename.clone(),
            transcription_text: None,
            confidence: None,
            processing_time,
            status: JobStatus::Failed,
            error_message: Some(error_message),
            processed_at: Utc::now(),
        }
    }
}
