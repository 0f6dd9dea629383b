//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, transcription, limits)
/// makes it easier to understand and maintain as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transcription: TranscriptionConfig,
    pub limits: LimitsConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on
/// - `public_url`: Base URL under which this server is reachable from the workers;
///   used to build the webhook callback URL handed to transcription jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
}

/// Transcription pipeline configuration.
///
/// ## Fields:
/// - `worker_count`: Number of concurrent transcription workers pulling from the job queue
/// - `shared_audio_path`: Root directory of the shared audio storage volume
/// - `api_endpoint`: Whisper-compatible transcription API endpoint
/// - `api_key`: Bearer token for the transcription API (empty means unauthenticated)
/// - `dequeue_timeout_secs`: How long a worker blocks waiting for a job before re-polling
/// - `webhook_timeout_secs`: Bound on a single webhook delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub worker_count: usize,
    pub shared_audio_path: PathBuf,
    pub api_endpoint: String,
    pub api_key: String,
    pub dequeue_timeout_secs: u64,
    pub webhook_timeout_secs: u64,
}

/// Capacity and retention limits.
///
/// ## Fields:
/// - `max_connections_per_meeting`: Hard cap on simultaneous viewer sockets per meeting;
///   the 7th connection against the default of 6 is rejected at admission time
/// - `job_ttl_secs`: Retention window after which a job status record becomes unobservable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_connections_per_meeting: usize,
    pub job_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                public_url: "http://127.0.0.1:8080".to_string(),
            },
            transcription: TranscriptionConfig {
                worker_count: 3,
                shared_audio_path: PathBuf::from("./shared_audio"),
                api_endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                api_key: String::new(),
                dequeue_timeout_secs: 1,
                webhook_timeout_secs: 30,
            },
            limits: LimitsConfig {
                max_connections_per_meeting: 6,
                job_ttl_secs: 86_400, // 24 hours
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be used)
    /// - Worker count is greater than 0 (the queue would never drain otherwise)
    /// - Timeouts are non-zero (a zero dequeue timeout busy-spins the workers)
    /// - Connection cap admits at least one viewer
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.transcription.worker_count == 0 {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        if self.transcription.dequeue_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Dequeue timeout must be greater than 0"));
        }

        if self.transcription.webhook_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Webhook timeout must be greater than 0"));
        }

        if self.limits.max_connections_per_meeting == 0 {
            return Err(anyhow::anyhow!(
                "Max connections per meeting must be greater than 0"
            ));
        }

        if self.limits.job_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Job TTL must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// This method allows updating only some fields, not the entire configuration.
    /// For example, you can send just `{"limits": {"max_connections_per_meeting": 10}}`
    /// to change only the connection cap.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
            if let Some(url) = server.get("public_url").and_then(|v| v.as_str()) {
                self.server.public_url = url.to_string();
            }
        }

        if let Some(transcription) = partial_config.get("transcription") {
            if let Some(workers) = transcription.get("worker_count").and_then(|v| v.as_u64()) {
                self.transcription.worker_count = workers as usize;
            }
            if let Some(endpoint) = transcription.get("api_endpoint").and_then(|v| v.as_str()) {
                self.transcription.api_endpoint = endpoint.to_string();
            }
            if let Some(key) = transcription.get("api_key").and_then(|v| v.as_str()) {
                self.transcription.api_key = key.to_string();
            }
            if let Some(timeout) = transcription
                .get("webhook_timeout_secs")
                .and_then(|v| v.as_u64())
            {
                self.transcription.webhook_timeout_secs = timeout;
            }
        }

        if let Some(limits) = partial_config.get("limits") {
            if let Some(cap) = limits
                .get("max_connections_per_meeting")
                .and_then(|v| v.as_u64())
            {
                self.limits.max_connections_per_meeting = cap as usize;
            }
            if let Some(ttl) = limits.get("job_ttl_secs").and_then(|v| v.as_u64()) {
                self.limits.job_ttl_secs = ttl;
            }
        }

        self.validate()?;
        Ok(())
    }

    /// Webhook callback URL handed to transcription jobs at intake.
    pub fn webhook_url(&self) -> String {
        format!(
            "{}/api/v1/webhooks/transcription",
            self.server.public_url.trim_end_matches('/')
        )
    }
}
