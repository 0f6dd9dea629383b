//! # Transcription Engine
//!
//! The [`Transcriber`] trait is the seam between the worker pool and the
//! actual speech-to-text backend. [`WhisperApiTranscriber`] implements it
//! against any Whisper-compatible transcription endpoint (OpenAI's
//! `/v1/audio/transcriptions` or a self-hosted equivalent).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Result of one transcription call.
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    /// The transcribed text
    pub text: String,

    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
}

/// Errors from a transcription attempt.
///
/// The error text ends up verbatim in the job record and the failure webhook,
/// so messages are written for humans reading a viewer notification.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("Audio file not found: {}", .0.display())]
    AudioNotFound(PathBuf),

    #[error("Transcription API error: {0}")]
    Api(String),

    #[error("Audio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque blocking speech-to-text operation.
///
/// Implementations may block for the full duration of the external call; the
/// worker pool isolates each call on the blocking thread pool.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionOutput, TranscribeError>;
}

/// Whisper verbose_json response. Confidence is not always present, so it
/// falls back to a fixed estimate.
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    confidence: Option<f32>,
}

/// Confidence reported when the API omits one.
const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Transcriber backed by a Whisper-compatible HTTP API.
pub struct WhisperApiTranscriber {
    endpoint: String,
    api_key: String,
    request_timeout: Duration,
}

impl WhisperApiTranscriber {
    pub fn new(endpoint: String, api_key: String, request_timeout: Duration) -> Self {
        Self {
            endpoint,
            api_key,
            request_timeout,
        }
    }
}

impl Transcriber for WhisperApiTranscriber {
    /// Upload the audio file and return its transcription.
    ///
    /// Blocking by design: this runs on the blocking pool, so the synchronous
    /// reqwest client is the right tool here.
    fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionOutput, TranscribeError> {
        if !audio_path.exists() {
            return Err(TranscribeError::AudioNotFound(audio_path.to_path_buf()));
        }

        info!("Transcribing audio file via API: {}", audio_path.display());

        let client = reqwest::blocking::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| TranscribeError::Api(e.to_string()))?;

        let form = reqwest::blocking::multipart::Form::new()
            .text("model", "whisper-1")
            .text("response_format", "verbose_json")
            .file("file", audio_path)?;

        let mut request = client.post(&self.endpoint).multipart(form);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .map_err(|e| TranscribeError::Api(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TranscribeError::Api(e.to_string()))?;

        if !status.is_success() {
            return Err(TranscribeError::Api(format!("{}: {}", status, body)));
        }

        let parsed: WhisperResponse =
            serde_json::from_str(&body).map_err(|e| TranscribeError::Api(e.to_string()))?;

        debug!(
            "Transcription returned {} chars from {}",
            parsed.text.len(),
            audio_path.display()
        );

        Ok(TranscriptionOutput {
            text: parsed.text,
            confidence: parsed.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found_error() {
        let transcriber = WhisperApiTranscriber::new(
            "http://127.0.0.1:9/v1/audio/transcriptions".to_string(),
            String::new(),
            Duration::from_secs(1),
        );

        let err = transcriber
            .transcribe(Path::new("/nonexistent/m1/audio/chunk1.webm"))
            .unwrap_err();

        assert!(matches!(err, TranscribeError::AudioNotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_whisper_response_confidence_fallback() {
        let parsed: WhisperResponse =
            serde_json::from_str(r#"{"text": "hello world", "language": "en"}"#).unwrap();
        assert_eq!(parsed.text, "hello world");
        assert_eq!(parsed.confidence.unwrap_or(DEFAULT_CONFIDENCE), 0.9);
    }
}
