//! Prometheus metrics for the batch orchestrator.
//!
//! Registered into the server's registry via [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs accepted by `create_job`, by job type.
pub static JOBS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deckbatch_jobs_created_total", "Total jobs created"),
        &["job_type"],
    )
    .unwrap()
});

/// Jobs that reached a terminal status.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deckbatch_jobs_finished_total", "Total jobs finished"),
        &["status"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Times a job waited for memory pressure to clear.
pub static MEMORY_THROTTLES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deckbatch_memory_throttles_total",
        "Chunk boundaries delayed by the memory guard",
    )
    .unwrap()
});

/// Resident memory of this process, refreshed by housekeeping.
pub static PROCESS_MEMORY_MB: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "deckbatch_process_memory_megabytes",
        "Resident memory of the orchestrator process",
    )
    .unwrap()
});

/// Event subscribers dropped for falling behind.
pub static EVENT_SUBSCRIBERS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deckbatch_event_subscribers_dropped_total",
        "Event subscribers dropped because their backlog was full",
    )
    .unwrap()
});

// =============================================================================
// Tasks
// =============================================================================

/// Tasks settled, by result.
pub static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deckbatch_tasks_total", "Total tasks settled"),
        &["result"], // "success", "failed", "skipped"
    )
    .unwrap()
});

/// Retries performed across all tasks.
pub static TASK_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("deckbatch_task_retries_total", "Total task retries").unwrap()
});

/// Task wall time including backoff.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "deckbatch_task_duration_seconds",
            "Duration of a task from first attempt to final outcome",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["result"],
    )
    .unwrap()
});

/// All core metrics, for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(MEMORY_THROTTLES.clone()),
        Box::new(PROCESS_MEMORY_MB.clone()),
        Box::new(EVENT_SUBSCRIBERS_DROPPED.clone()),
        Box::new(TASKS_TOTAL.clone()),
        Box::new(TASK_RETRIES.clone()),
        Box::new(TASK_DURATION.clone()),
    ]
}
