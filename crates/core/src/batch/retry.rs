//! Bounded retries with exponential backoff for a single task.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::JobConfig;
use super::processor::TaskProcessor;
use super::types::TaskUnit;
use crate::metrics::TASK_RETRIES;

/// Retry settings derived from a job's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &JobConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Backoff before retry number `retry` (1-indexed): `base * 2^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Final result of running one task through the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded {
        task_id: String,
        retry_count: u32,
        /// Wall time from the first attempt to success, backoff included.
        elapsed: Duration,
        result: serde_json::Value,
    },
    Failed {
        task_id: String,
        retry_count: u32,
        elapsed: Duration,
        error: String,
    },
    /// Never dispatched because the job was cancelled first.
    Skipped { task_id: String },
}

impl TaskOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            TaskOutcome::Succeeded { task_id, .. }
            | TaskOutcome::Failed { task_id, .. }
            | TaskOutcome::Skipped { task_id } => task_id,
        }
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            TaskOutcome::Succeeded { retry_count, .. } | TaskOutcome::Failed { retry_count, .. } => {
                *retry_count
            }
            TaskOutcome::Skipped { .. } => 0,
        }
    }

    /// Wall time spent on the task, `None` if it never ran.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            TaskOutcome::Succeeded { elapsed, .. } | TaskOutcome::Failed { elapsed, .. } => {
                Some(*elapsed)
            }
            TaskOutcome::Skipped { .. } => None,
        }
    }

    pub fn result_label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded { .. } => "success",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// Runs `processor` on `task`, retrying failures with exponential backoff.
///
/// The returned retry count never exceeds `policy.max_retries`; a task that
/// keeps failing is attempted `max_retries + 1` times.
pub async fn execute_with_retry(
    task: &TaskUnit,
    processor: &dyn TaskProcessor,
    policy: &RetryPolicy,
) -> TaskOutcome {
    let start = Instant::now();
    let mut task = task.clone();

    loop {
        match processor.process(&task).await {
            Ok(result) => {
                debug!(task_id = %task.id, retries = task.retry_count, "Task succeeded");
                return TaskOutcome::Succeeded {
                    task_id: task.id,
                    retry_count: task.retry_count,
                    elapsed: start.elapsed(),
                    result,
                };
            }
            Err(e) => {
                if task.retry_count >= policy.max_retries {
                    warn!(
                        "Task {} failed after {} attempts: {}",
                        task.id,
                        task.retry_count + 1,
                        e
                    );
                    return TaskOutcome::Failed {
                        task_id: task.id,
                        retry_count: task.retry_count,
                        elapsed: start.elapsed(),
                        error: e.to_string(),
                    };
                }

                task.retry_count += 1;
                let delay = policy.delay_for(task.retry_count);
                TASK_RETRIES.inc();
                warn!(
                    "Task {} attempt {} failed: {}, retrying in {}ms",
                    task.id,
                    task.retry_count,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
