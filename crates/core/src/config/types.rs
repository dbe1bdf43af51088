use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::JobConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Job types served by an HTTP endpoint.
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database holding the job mirror
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("deckbatch.db")
}

/// Orchestrator settings. Job defaults sit directly in `[batch]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(flatten)]
    pub defaults: JobConfig,

    /// Seconds a finished job stays queryable before it is purged.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Cadence of the housekeeping loop.
    #[serde(default = "default_housekeeping_interval_ms")]
    pub housekeeping_interval_ms: u64,

    /// Pending mirror writes before new ones are dropped.
    #[serde(default = "default_mirror_buffer")]
    pub mirror_buffer: usize,
}

impl BatchConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms.max(1))
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            defaults: JobConfig::default(),
            retention_secs: default_retention_secs(),
            housekeeping_interval_ms: default_housekeeping_interval_ms(),
            mirror_buffer: default_mirror_buffer(),
        }
    }
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_housekeeping_interval_ms() -> u64 {
    60_000
}

fn default_mirror_buffer() -> usize {
    1024
}

/// A job type whose tasks are POSTed to an HTTP endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    pub job_type: String,
    pub url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Sent as a bearer token when set.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub batch: BatchConfig,
    pub webhooks: Vec<SanitizedWebhookConfig>,
}

/// Sanitized webhook config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWebhookConfig {
    pub job_type: String,
    pub url: String,
    pub timeout_secs: u32,
    pub auth_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            batch: config.batch.clone(),
            webhooks: config
                .webhooks
                .iter()
                .map(|w| SanitizedWebhookConfig {
                    job_type: w.job_type.clone(),
                    url: w.url.clone(),
                    timeout_secs: w.timeout_secs,
                    auth_token_configured: w.auth_token.as_deref().is_some_and(|t| !t.is_empty()),
                })
                .collect(),
        }
    }
}
