//! Per-job configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::BatchError;

/// Configuration for a single batch job.
///
/// Every field has a default; the orchestrator's defaults can be overridden per
/// job with [`JobConfigOverrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Maximum tasks executing simultaneously within a chunk.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Number of tasks per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Resident memory (MB) above which the memory guard throttles.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_mb: u64,

    /// Retries per task after the first failed attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay in milliseconds, doubled per retry.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Hard timeout for the whole job in milliseconds (0 = disabled).
    #[serde(default = "default_job_timeout")]
    pub job_timeout_ms: u64,

    /// Background memory sampling cadence in milliseconds.
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval_ms: u64,

    /// Wait after a reclaim request when memory is over threshold.
    #[serde(default = "default_memory_cooldown")]
    pub memory_cooldown_ms: u64,
}

fn default_max_concurrency() -> usize {
    5
}

fn default_chunk_size() -> usize {
    100
}

fn default_memory_threshold() -> u64 {
    500
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000 // 1 second
}

fn default_job_timeout() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

fn default_monitoring_interval() -> u64 {
    10_000 // 10 seconds
}

fn default_memory_cooldown() -> u64 {
    5000 // 5 seconds
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            chunk_size: default_chunk_size(),
            memory_threshold_mb: default_memory_threshold(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            job_timeout_ms: default_job_timeout(),
            monitoring_interval_ms: default_monitoring_interval(),
            memory_cooldown_ms: default_memory_cooldown(),
        }
    }
}

impl JobConfig {
    /// Sets the maximum concurrency.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Sets the chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the retry attempts and base delay.
    pub fn with_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Sets the memory threshold.
    pub fn with_memory_threshold(mut self, threshold_mb: u64) -> Self {
        self.memory_threshold_mb = threshold_mb;
        self
    }

    /// Sets the job timeout.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.job_timeout_ms = timeout_ms;
        self
    }

    /// Sets the monitoring interval.
    pub fn with_monitoring_interval(mut self, interval_ms: u64) -> Self {
        self.monitoring_interval_ms = interval_ms;
        self
    }

    /// Sets the memory cooldown.
    pub fn with_memory_cooldown(mut self, cooldown_ms: u64) -> Self {
        self.memory_cooldown_ms = cooldown_ms;
        self
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_ms > 0).then(|| Duration::from_millis(self.job_timeout_ms))
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms.max(1))
    }

    /// Rejects configurations the orchestrator cannot run.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.max_concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.memory_threshold_mb == 0 {
            return Err(BatchError::InvalidConfig(
                "memory_threshold_mb must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial configuration supplied by a caller at job creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_threshold_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_cooldown_ms: Option<u64>,
}

impl JobConfigOverrides {
    /// Layers these overrides on top of `base`.
    pub fn apply(&self, base: &JobConfig) -> JobConfig {
        JobConfig {
            max_concurrency: self.max_concurrency.unwrap_or(base.max_concurrency),
            chunk_size: self.chunk_size.unwrap_or(base.chunk_size),
            memory_threshold_mb: self.memory_threshold_mb.unwrap_or(base.memory_threshold_mb),
            retry_attempts: self.retry_attempts.unwrap_or(base.retry_attempts),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            job_timeout_ms: self.job_timeout_ms.unwrap_or(base.job_timeout_ms),
            monitoring_interval_ms: self
                .monitoring_interval_ms
                .unwrap_or(base.monitoring_interval_ms),
            memory_cooldown_ms: self.memory_cooldown_ms.unwrap_or(base.memory_cooldown_ms),
        }
    }
}

impl From<JobConfig> for JobConfigOverrides {
    fn from(config: JobConfig) -> Self {
        Self {
            max_concurrency: Some(config.max_concurrency),
            chunk_size: Some(config.chunk_size),
            memory_threshold_mb: Some(config.memory_threshold_mb),
            retry_attempts: Some(config.retry_attempts),
            retry_delay_ms: Some(config.retry_delay_ms),
            job_timeout_ms: Some(config.job_timeout_ms),
            monitoring_interval_ms: Some(config.monitoring_interval_ms),
            memory_cooldown_ms: Some(config.memory_cooldown_ms),
        }
    }
}
