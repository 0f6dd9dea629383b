//! # Audio Storage Module
//!
//! Persists streamed audio chunks to the shared storage volume that the
//! transcription workers read from. Chunks are opaque blobs here: no
//! decoding, validation, or re-slicing happens server-side; the client
//! delimits chunks however it likes, and the pipeline only ever needs a
//! `(meeting_id, filename)` reference to an already-materialized artifact.

pub mod storage;
