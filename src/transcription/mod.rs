//! # Transcription Module
//!
//! Speech-to-text is an external concern here: the pipeline treats it as an
//! opaque blocking operation (audio file path in, text plus confidence out)
//! behind the [`Transcriber`] trait. The production implementation calls a
//! Whisper-compatible HTTP API; tests substitute deterministic mocks at the
//! same seam.
//!
//! ## Execution Model:
//! `Transcriber::transcribe` is a blocking call. Workers run it on the
//! blocking thread pool so a long transcription stalls exactly one worker and
//! never a scheduler thread.

pub mod engine;

pub use engine::{TranscribeError, Transcriber, TranscriptionOutput, WhisperApiTranscriber};
