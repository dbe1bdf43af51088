//! Types for the batch orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::JobConfig;
use super::lifecycle::JobStatus;

/// Errors returned by the orchestrator's public API.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Job not found in the registry.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Job configuration cannot be run.
    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    /// Two tasks in the same submission share an id.
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// A job with this id is already registered.
    #[error("duplicate job id: {0}")]
    DuplicateJobId(String),

    /// Status change not allowed by the lifecycle state machine.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Failure of the chunk loop itself, fatal to the job.
    #[error("orchestration error: {0}")]
    Orchestration(String),
}

/// A task as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique id within the job.
    pub id: String,
    /// Job-type specific payload, opaque to the orchestrator.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Lower values are processed first; ties keep submission order.
    #[serde(default)]
    pub priority: i32,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// One unit of work inside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUnit {
    pub id: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    /// Retries performed so far. Never exceeds the job's `retry_attempts`.
    pub retry_count: u32,
    /// Heuristic from payload size, used for reporting only.
    pub estimated_time_ms: u64,
    /// Heuristic from payload size, used for reporting only.
    pub estimated_memory_mb: u64,
}

const MIB: u64 = 1024 * 1024;

impl From<TaskSpec> for TaskUnit {
    fn from(spec: TaskSpec) -> Self {
        let size = serde_json::to_vec(&spec.payload)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);

        Self {
            id: spec.id,
            payload: spec.payload,
            priority: spec.priority,
            retry_count: 0,
            estimated_time_ms: 100 + size / 1024 * 10,
            estimated_memory_mb: (size * 2).div_ceil(MIB).max(1),
        }
    }
}

/// Counters and derived rates for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `round(100 * processed / total)`.
    pub percentage: u32,
    pub tasks_per_second: f64,
    /// `None` until throughput is known.
    pub estimated_remaining_ms: Option<u64>,
}

impl JobProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Tasks that reached a final per-task outcome.
    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }

    /// Tasks that were neither processed nor skipped.
    pub fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.completed + self.failed + self.skipped)
    }
}

/// Aggregated performance figures for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub peak_memory_mb: f64,
    /// Incremental mean over successful tasks only.
    pub average_task_time_ms: f64,
    pub retry_rate_percent: f64,
    /// Tasks per second, same as the last progress sample.
    pub throughput: f64,
    /// Highest number of tasks observed in flight at once.
    pub peak_concurrency: usize,
    /// Times the memory guard paused the job.
    pub memory_throttle_count: u32,
}

/// A task that exhausted its retries, or a synthetic orchestration failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobErrorEntry {
    pub task_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

/// Task id used for errors that are not attributable to a single task.
pub const ORCHESTRATOR_TASK_ID: &str = "<orchestrator>";

/// Aggregate state for one batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub job_type: String,
    /// Submission order after the stable priority sort.
    pub tasks: Vec<TaskUnit>,
    pub config: JobConfig,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub metrics: JobMetrics,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub errors: Vec<JobErrorEntry>,
    pub warnings: Vec<String>,
}

impl JobRecord {
    /// Creates a pending job. Tasks are sorted by priority, keeping submission
    /// order among equal priorities.
    pub fn new(
        id: impl Into<String>,
        job_type: impl Into<String>,
        tasks: Vec<TaskUnit>,
        config: JobConfig,
    ) -> Self {
        let mut tasks = tasks;
        tasks.sort_by_key(|t| t.priority);

        Self {
            id: id.into(),
            job_type: job_type.into(),
            progress: JobProgress::new(tasks.len()),
            tasks,
            config,
            status: JobStatus::Pending,
            metrics: JobMetrics::default(),
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Elapsed milliseconds since the job started, up to `end_time` when set.
    pub fn elapsed_ms(&self) -> Option<u64> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds().max(0) as u64)
    }

    /// Partial document for the persistence mirror.
    pub fn mirror_patch(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "progress": self.progress,
            "metrics": self.metrics,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "errors": self.errors,
            "warnings": self.warnings,
        })
    }

    pub(crate) fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskUnit> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: usize,
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            job_type: None,
            limit: 100,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, job: &JobRecord) -> bool {
        self.status.is_none_or(|s| s == job.status)
            && self
                .job_type
                .as_deref()
                .is_none_or(|t| t == job.job_type)
    }
}

/// Process-wide figures across all registered jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Jobs currently running or paused.
    pub active_jobs: usize,
    /// Sum of `max_concurrency` over active jobs.
    pub total_concurrency: usize,
    /// Tasks executing right now across all jobs.
    pub in_flight_tasks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_memory_usage_mb: Option<f64>,
    /// Mean tasks per second across active jobs.
    pub average_throughput: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_estimates_from_payload_size() {
        let small = TaskUnit::from(TaskSpec::new("a", json!({"slide": 1})));
        assert_eq!(small.estimated_time_ms, 100);
        assert_eq!(small.estimated_memory_mb, 1);
        assert_eq!(small.retry_count, 0);

        let blob = "x".repeat(1024 * 1024);
        let large = TaskUnit::from(TaskSpec::new("b", json!({ "data": blob })));
        assert!(large.estimated_time_ms > 10_000);
        assert_eq!(large.estimated_memory_mb, 3);
    }

    #[test]
    fn test_new_job_sorts_by_priority_stably() {
        let tasks = vec![
            TaskUnit::from(TaskSpec::new("late", json!(null)).with_priority(5)),
            TaskUnit::from(TaskSpec::new("first", json!(null))),
            TaskUnit::from(TaskSpec::new("second", json!(null))),
            TaskUnit::from(TaskSpec::new("urgent", json!(null)).with_priority(-1)),
        ];

        let job = JobRecord::new("job-1", "thumbnail", tasks, JobConfig::default());
        let order: Vec<&str> = job.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["urgent", "first", "second", "late"]);
        assert_eq!(job.progress.total, 4);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_progress_remaining() {
        let progress = JobProgress {
            total: 10,
            completed: 4,
            failed: 1,
            skipped: 2,
            ..Default::default()
        };
        assert_eq!(progress.processed(), 5);
        assert_eq!(progress.remaining(), 3);
    }

    #[test]
    fn test_filter_matches() {
        let job = JobRecord::new("job-1", "archive", vec![], JobConfig::default());

        assert!(JobFilter::new().matches(&job));
        assert!(JobFilter::new().with_job_type("archive").matches(&job));
        assert!(!JobFilter::new().with_job_type("delete").matches(&job));
        assert!(JobFilter::new().with_status(JobStatus::Pending).matches(&job));
        assert!(!JobFilter::new().with_status(JobStatus::Running).matches(&job));
    }

    #[test]
    fn test_error_display() {
        let err = BatchError::JobNotFound("job-9".to_string());
        assert_eq!(err.to_string(), "job not found: job-9");

        let err = BatchError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition: completed -> running"
        );
    }

    #[test]
    fn test_mirror_patch_has_status() {
        let job = JobRecord::new("job-1", "archive", vec![], JobConfig::default());
        let patch = job.mirror_patch();
        assert_eq!(patch["status"], "pending");
        assert!(patch.get("tasks").is_none());
    }
}
