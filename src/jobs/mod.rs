//! # Transcription Job Pipeline
//!
//! This module implements the job dispatch core: queued transcription work flows
//! from API intake through a FIFO queue to a fixed-size worker pool, and results
//! flow back to the submitter through at-most-once webhook deliveries.
//!
//! ## Key Components:
//! - **Job Types**: Status records, dispatch records, and webhook result payloads
//! - **Job Queue**: In-process FIFO queue, safe for multiple producers and consumers
//! - **Job Store**: Status records with a 24h retention window
//! - **Worker Pool**: Concurrent workers that dequeue, transcribe, and notify
//! - **Webhook Notifier**: Single-attempt result delivery with a bounded timeout
//!
//! ## Delivery Semantics:
//! A job is processed by exactly one worker, its webhook is attempted exactly
//! once, and a failed delivery never changes the job's terminal status. There is
//! no retry path anywhere in the pipeline.

pub mod job;
pub mod queue;
pub mod store;
pub mod webhook;
pub mod worker;

pub use job::{DispatchRecord, Job, JobResultPayload, JobStatus};
pub use store::{JobStats, JobStore};
pub use webhook::WebhookNotifier;
pub use worker::WorkerPool;
