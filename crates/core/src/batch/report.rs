//! Post-hoc performance report for a job.
//!
//! Rates and utilization figures come straight from the job record. Bottlenecks
//! and recommendations are heuristics meant for operators, not for control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::JobStatus;
use super::types::JobRecord;

/// Average task time above which tasks are flagged as slow.
pub const SLOW_TASK_MS: f64 = 10_000.0;
/// Retry rate above which task reliability is questioned.
pub const HIGH_RETRY_RATE_PERCENT: f64 = 10.0;
/// Share of the memory threshold above which a smaller chunk size is advised.
pub const MEMORY_WARNING_PERCENT: f64 = 80.0;
/// Error rate above which failures are reported as a bottleneck.
pub const HIGH_ERROR_RATE_PERCENT: f64 = 20.0;
/// Concurrency use below which the limit is reported as oversized.
pub const LOW_CONCURRENCY_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    /// Short machine-readable tag, e.g. `slow_tasks`.
    pub kind: String,
    pub severity: Severity,
    pub description: String,
}

impl Bottleneck {
    fn new(kind: &str, severity: Severity, description: String) -> Self {
        Self {
            kind: kind.to_string(),
            severity,
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `completed / total * 100`.
    pub success_rate_percent: f64,
    /// `failed / total * 100`.
    pub error_rate_percent: f64,
    /// Share of tasks that needed at least one retry.
    pub retry_rate_percent: f64,
    /// True when the job finished some tasks but also lost some.
    pub partial_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub throughput: f64,
    pub average_task_time_ms: f64,
    pub peak_memory_mb: f64,
    /// Peak memory as a share of the configured threshold.
    pub memory_utilization_percent: f64,
    pub peak_concurrency: usize,
    /// Peak concurrency as a share of `max_concurrency`.
    pub concurrency_utilization_percent: f64,
    pub memory_throttle_count: u32,
    /// Sum of per-task time estimates spread over `max_concurrency` workers.
    pub estimated_total_time_ms: u64,
    /// Sum of the `max_concurrency` largest per-task memory estimates.
    pub estimated_peak_memory_mb: u64,
    pub bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Builds the report for `job` as it stands now.
pub fn generate_report(job: &JobRecord) -> PerformanceReport {
    let progress = &job.progress;
    let metrics = &job.metrics;
    let config = &job.config;
    let total = progress.total;

    let retried = job.tasks.iter().filter(|t| t.retry_count > 0).count();
    let success_rate_percent = percent(progress.completed, total);
    let error_rate_percent = percent(progress.failed, total);
    let retry_rate_percent = percent(retried, total);

    let memory_utilization_percent = if config.memory_threshold_mb == 0 {
        0.0
    } else {
        metrics.peak_memory_mb / config.memory_threshold_mb as f64 * 100.0
    };
    let concurrency_utilization_percent =
        percent(metrics.peak_concurrency, config.max_concurrency);

    let workers = config.max_concurrency.max(1);
    let estimated_total_time_ms = job
        .tasks
        .iter()
        .map(|t| t.estimated_time_ms)
        .sum::<u64>()
        .div_ceil(workers as u64);

    let mut memory_estimates: Vec<u64> = job.tasks.iter().map(|t| t.estimated_memory_mb).collect();
    memory_estimates.sort_unstable_by(|a, b| b.cmp(a));
    let estimated_peak_memory_mb = memory_estimates.iter().take(workers).sum();

    let mut bottlenecks = Vec::new();
    let mut recommendations = Vec::new();

    if metrics.average_task_time_ms > SLOW_TASK_MS {
        bottlenecks.push(Bottleneck::new(
            "slow_tasks",
            Severity::High,
            format!(
                "Average task time is {:.0}ms (over {:.0}ms)",
                metrics.average_task_time_ms, SLOW_TASK_MS
            ),
        ));
        recommendations.push(
            "Tasks are slow: profile the processor or raise max_concurrency if the work is I/O bound"
                .to_string(),
        );
    }

    if error_rate_percent > HIGH_ERROR_RATE_PERCENT {
        bottlenecks.push(Bottleneck::new(
            "high_failure_rate",
            Severity::High,
            format!("{:.1}% of tasks failed after retries", error_rate_percent),
        ));
    }

    if retry_rate_percent > HIGH_RETRY_RATE_PERCENT {
        recommendations.push(format!(
            "{:.1}% of tasks needed retries: increase retry_delay_ms or investigate task reliability",
            retry_rate_percent
        ));
    }

    if memory_utilization_percent > MEMORY_WARNING_PERCENT {
        let severity = if metrics.memory_throttle_count > 0 {
            Severity::High
        } else {
            Severity::Medium
        };
        bottlenecks.push(Bottleneck::new(
            "memory_pressure",
            severity,
            format!(
                "Peak memory {:.1}MB is {:.0}% of the {}MB threshold",
                metrics.peak_memory_mb, memory_utilization_percent, config.memory_threshold_mb
            ),
        ));
        recommendations.push(format!(
            "Reduce chunk_size (currently {}) to lower peak memory",
            config.chunk_size
        ));
    }

    if metrics.memory_throttle_count > 0 {
        recommendations.push(format!(
            "Job was throttled {} time(s) for memory: raise memory_threshold_mb or lower max_concurrency",
            metrics.memory_throttle_count
        ));
    }

    if total >= config.max_concurrency
        && metrics.peak_concurrency > 0
        && concurrency_utilization_percent < LOW_CONCURRENCY_PERCENT
    {
        bottlenecks.push(Bottleneck::new(
            "underused_concurrency",
            Severity::Low,
            format!(
                "Peak concurrency {} of {} allowed",
                metrics.peak_concurrency, config.max_concurrency
            ),
        ));
    }

    PerformanceReport {
        job_id: job.id.clone(),
        job_type: job.job_type.clone(),
        status: job.status,
        total_tasks: total,
        completed: progress.completed,
        failed: progress.failed,
        skipped: progress.skipped,
        success_rate_percent,
        error_rate_percent,
        retry_rate_percent,
        partial_success: progress.completed > 0 && progress.failed > 0,
        duration_ms: job.elapsed_ms(),
        throughput: metrics.throughput,
        average_task_time_ms: metrics.average_task_time_ms,
        peak_memory_mb: metrics.peak_memory_mb,
        memory_utilization_percent,
        peak_concurrency: metrics.peak_concurrency,
        concurrency_utilization_percent,
        memory_throttle_count: metrics.memory_throttle_count,
        estimated_total_time_ms,
        estimated_peak_memory_mb,
        bottlenecks,
        recommendations,
        generated_at: Utc::now(),
    }
}
