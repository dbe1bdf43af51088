//! Batch orchestrator.
//!
//! Accepts jobs, drives each through its chunks on a dedicated task and
//! exposes lifecycle controls:
//! - Chunks: sequential, with pause/cancel/memory checkpoints between them
//! - Tasks: concurrent within a chunk, bounded per job
//! - Housekeeping: periodic purge of finished jobs and memory gauge refresh

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::metrics::{JOBS_CREATED, JOBS_FINISHED, PROCESS_MEMORY_MB, TASKS_TOTAL, TASK_DURATION};
use crate::mirror::{MirrorHandle, MirrorOp, JOBS_COLLECTION};

use super::chunker;
use super::config::{JobConfig, JobConfigOverrides};
use super::events::{EventBus, JobEvent};
use super::lifecycle::{JobHandle, JobStatus};
use super::limiter::ConcurrencyLimiter;
use super::memory::{MemoryGuard, MemorySampler, SysinfoSampler};
use super::processor::TaskProcessor;
use super::progress::compute_progress;
use super::registry::JobRegistry;
use super::report::{generate_report, PerformanceReport};
use super::retry::{RetryPolicy, TaskOutcome};
use super::types::{
    BatchError, JobErrorEntry, JobFilter, JobRecord, SystemMetrics, TaskSpec, TaskUnit,
    ORCHESTRATOR_TASK_ID,
};

/// Reason recorded when a caller cancels a job.
pub const CANCEL_REASON: &str = "cancelled by request";

/// Owns the job registry and runs jobs.
pub struct BatchOrchestrator {
    defaults: JobConfig,
    retention: Duration,
    housekeeping_interval: Duration,
    registry: Arc<JobRegistry>,
    events: Arc<EventBus>,
    mirror: Option<MirrorHandle>,
    sampler: Arc<dyn MemorySampler>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl BatchOrchestrator {
    /// Creates an orchestrator applying `defaults` to every job.
    pub fn new(defaults: JobConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let batch = BatchConfig::default();

        Self {
            defaults,
            retention: batch.retention(),
            housekeeping_interval: batch.housekeeping_interval(),
            registry: Arc::new(JobRegistry::new()),
            events: Arc::new(EventBus::new()),
            mirror: None,
            sampler: Arc::new(SysinfoSampler::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.defaults.clone())
            .with_retention(config.retention())
            .with_housekeeping_interval(config.housekeeping_interval())
    }

    /// Mirrors every job mutation through `mirror`.
    pub fn with_mirror(mut self, mirror: MirrorHandle) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn defaults(&self) -> &JobConfig {
        &self.defaults
    }

    /// Registers a job and starts processing it in the background.
    ///
    /// Returns the new job id.
    pub async fn create_job(
        &self,
        job_type: &str,
        tasks: Vec<TaskSpec>,
        processor: Arc<dyn TaskProcessor>,
        overrides: Option<JobConfigOverrides>,
    ) -> Result<String, BatchError> {
        let config = match overrides {
            Some(overrides) => overrides.apply(&self.defaults),
            None => self.defaults.clone(),
        };
        config.validate()?;

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(BatchError::DuplicateTaskId(task.id.clone()));
            }
        }

        let id = Uuid::new_v4().to_string();
        let units: Vec<TaskUnit> = tasks.into_iter().map(TaskUnit::from).collect();
        let record = JobRecord::new(id.clone(), job_type, units, config);
        let total_tasks = record.progress.total;

        let document = if self.mirror.is_some() {
            serde_json::to_value(&record)
                .map_err(|e| warn!(job_id = %id, "Failed to serialize job for mirror: {}", e))
                .ok()
        } else {
            None
        };

        let handle = self.registry.create(record).await?;
        if let (Some(mirror), Some(document)) = (&self.mirror, document) {
            mirror.try_record(MirrorOp::create(JOBS_COLLECTION, &id, document));
        }
        JOBS_CREATED.with_label_values(&[job_type]).inc();
        info!(job_id = %id, job_type, total_tasks, "Created batch job");

        self.events.publish(JobEvent::JobCreated {
            job_id: id.clone(),
            job_type: job_type.to_string(),
            total_tasks,
        });

        let runner = JobRunner {
            handle,
            processor,
            events: Arc::clone(&self.events),
            mirror: self.mirror.clone(),
            sampler: Arc::clone(&self.sampler),
        };
        tokio::spawn(runner.run());

        Ok(id)
    }

    /// Pauses a running job at its next chunk boundary.
    pub async fn pause_job(&self, job_id: &str) -> bool {
        let Some(handle) = self.registry.get(job_id).await else {
            return false;
        };
        if !handle.pause().await {
            return false;
        }

        info!(job_id, "Job paused");
        self.events.publish(JobEvent::JobPaused {
            job_id: job_id.to_string(),
        });
        mirror_record(&self.mirror, &handle).await;
        true
    }

    pub async fn resume_job(&self, job_id: &str) -> bool {
        let Some(handle) = self.registry.get(job_id).await else {
            return false;
        };
        if !handle.resume().await {
            return false;
        }

        info!(job_id, "Job resumed");
        self.events.publish(JobEvent::JobResumed {
            job_id: job_id.to_string(),
        });
        mirror_record(&self.mirror, &handle).await;
        true
    }

    /// Cancels a running or paused job. Undispatched tasks are skipped.
    pub async fn cancel_job(&self, job_id: &str) -> bool {
        let Some(handle) = self.registry.get(job_id).await else {
            return false;
        };
        cancel_with_reason(&handle, CANCEL_REASON, &self.events, &self.mirror).await
    }

    /// Cancels every running or paused job with `reason`. Returns how many
    /// were cancelled.
    pub async fn cancel_active_jobs(&self, reason: &str) -> usize {
        let mut cancelled = 0;
        for handle in self.registry.handles().await {
            if handle.status().is_active()
                && cancel_with_reason(&handle, reason, &self.events, &self.mirror).await
            {
                cancelled += 1;
            }
        }
        cancelled
    }

    pub async fn get_job_status(&self, job_id: &str) -> Option<JobRecord> {
        let handle = self.registry.get(job_id).await?;
        Some(handle.snapshot().await)
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Vec<JobRecord> {
        self.registry.list(filter).await
    }

    pub async fn generate_performance_report(&self, job_id: &str) -> Option<PerformanceReport> {
        let handle = self.registry.get(job_id).await?;
        Some(handle.read(generate_report).await)
    }

    /// Figures across all registered jobs.
    pub async fn system_metrics(&self) -> SystemMetrics {
        let mut metrics = SystemMetrics::default();
        let mut throughput = 0.0;

        for handle in self.registry.handles().await {
            metrics.in_flight_tasks += handle.in_flight();
            if !handle.status().is_active() {
                continue;
            }
            let (max_concurrency, tasks_per_second) = handle
                .read(|job| (job.config.max_concurrency, job.progress.tasks_per_second))
                .await;
            metrics.active_jobs += 1;
            metrics.total_concurrency += max_concurrency;
            throughput += tasks_per_second;
        }

        if metrics.active_jobs > 0 {
            metrics.average_throughput = throughput / metrics.active_jobs as f64;
        }
        metrics.system_memory_usage_mb = self.sampler.sample_mb();
        metrics
    }

    /// Receives every event published from now on, until the subscriber falls
    /// more than the backlog behind.
    pub fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Waits until the job reaches a terminal status and returns its record.
    pub async fn wait_for_job(&self, job_id: &str) -> Option<JobRecord> {
        let handle = self.registry.get(job_id).await?;
        let mut status_rx = handle.subscribe_status();
        // The sender lives in the handle we hold, so this cannot fail.
        let _ = status_rx.wait_for(|status| status.is_terminal()).await;
        Some(handle.snapshot().await)
    }

    /// Starts the housekeeping loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Batch orchestrator already running");
            return;
        }

        info!("Starting batch orchestrator");
        self.spawn_housekeeping_loop();
    }

    /// Stops the housekeeping loop. Jobs already running keep going.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Batch orchestrator not running");
            return;
        }

        info!("Stopping batch orchestrator");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn spawn_housekeeping_loop(&self) {
        let registry = Arc::clone(&self.registry);
        let sampler = Arc::clone(&self.sampler);
        let running = Arc::clone(&self.running);
        let retention = self.retention;
        let interval = self.housekeeping_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Housekeeping loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Housekeeping loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let purged = registry.purge_finished(retention).await;
                        if purged > 0 {
                            info!(purged, "Purged finished jobs");
                        }
                        if let Some(memory_mb) = sampler.sample_mb() {
                            PROCESS_MEMORY_MB.set(memory_mb);
                        }
                    }
                }
            }
            info!("Housekeeping loop stopped");
        });
    }
}

/// Queues the record's mutable fields for the mirror.
async fn mirror_record(mirror: &Option<MirrorHandle>, handle: &JobHandle) {
    if let Some(mirror) = mirror {
        let patch = handle.read(JobRecord::mirror_patch).await;
        mirror.try_record(MirrorOp::update(JOBS_COLLECTION, handle.id(), patch));
    }
}

/// Shared path for caller cancellation and timeouts.
async fn cancel_with_reason(
    handle: &JobHandle,
    reason: &str,
    events: &EventBus,
    mirror: &Option<MirrorHandle>,
) -> bool {
    if !handle.cancel(Some(reason.to_string())).await {
        return false;
    }

    let progress = handle.read(|job| job.progress.clone()).await;
    JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
    info!(
        job_id = %handle.id(),
        skipped = progress.skipped,
        "Job cancelled: {}",
        reason
    );

    events.publish(JobEvent::JobCancelled {
        job_id: handle.id().to_string(),
        reason: reason.to_string(),
        progress,
    });
    mirror_record(mirror, handle).await;
    true
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Enforces the job timeout and samples memory until the job is terminal.
fn spawn_monitor(
    handle: Arc<JobHandle>,
    config: JobConfig,
    sampler: Arc<dyn MemorySampler>,
    events: Arc<EventBus>,
    mirror: Option<MirrorHandle>,
) {
    let mut status_rx = handle.subscribe_status();

    tokio::spawn(async move {
        let deadline = config.job_timeout().map(|timeout| Instant::now() + timeout);
        let period = config.monitoring_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

        while !handle.status().is_terminal() {
            tokio::select! {
                _ = sleep_until_deadline(deadline) => {
                    let reason = format!("timed out after {} ms", config.job_timeout_ms);
                    warn!(job_id = %handle.id(), "Job {}", reason);
                    cancel_with_reason(&handle, &reason, &events, &mirror).await;
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(memory_mb) = sampler.sample_mb() {
                        handle
                            .update(|job| {
                                job.metrics.peak_memory_mb = job.metrics.peak_memory_mb.max(memory_mb)
                            })
                            .await;
                    }
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(job_id = %handle.id(), "Job monitor stopped");
    });
}

/// Processing loop for a single job.
struct JobRunner {
    handle: Arc<JobHandle>,
    processor: Arc<dyn TaskProcessor>,
    events: Arc<EventBus>,
    mirror: Option<MirrorHandle>,
    sampler: Arc<dyn MemorySampler>,
}

impl JobRunner {
    async fn run(self) {
        let config = self.handle.read(|job| job.config.clone()).await;
        if let Err(e) = self.handle.transition(JobStatus::Running).await {
            warn!(job_id = %self.handle.id(), "Job could not start: {}", e);
            return;
        }
        info!(job_id = %self.handle.id(), "Job started");
        mirror_record(&self.mirror, &self.handle).await;

        spawn_monitor(
            Arc::clone(&self.handle),
            config.clone(),
            Arc::clone(&self.sampler),
            Arc::clone(&self.events),
            self.mirror.clone(),
        );

        match self.process(&config).await {
            Ok(()) => self.finish().await,
            Err(e) => self.fail(e).await,
        }
    }

    async fn process(&self, config: &JobConfig) -> Result<(), BatchError> {
        let tasks = self.handle.read(|job| job.tasks.clone()).await;
        let chunks = chunker::chunk(&tasks, config.chunk_size);
        let chunk_total = chunks.len();

        let limiter = ConcurrencyLimiter::new(config.max_concurrency);
        let policy = RetryPolicy::from_config(config);
        let guard = MemoryGuard::new(
            Arc::clone(&self.sampler),
            config.memory_threshold_mb,
            Duration::from_millis(config.memory_cooldown_ms),
        );

        for (index, chunk) in chunks.into_iter().enumerate() {
            if !self.checkpoint().await {
                return Ok(());
            }
            if self.guard_memory(&guard).await && !self.checkpoint().await {
                return Ok(());
            }

            debug!(
                job_id = %self.handle.id(),
                chunk = index + 1,
                chunks = chunk_total,
                size = chunk.len(),
                "Dispatching chunk"
            );
            let settled = limiter
                .run_chunk(chunk, &self.handle, &self.processor, policy)
                .await;
            self.apply(settled.outcomes).await;
            if let Some(panic) = settled.panic {
                return Err(panic);
            }
        }

        Ok(())
    }

    /// Blocks while the job is paused. Returns false once it is terminal.
    async fn checkpoint(&self) -> bool {
        if self.handle.status() == JobStatus::Paused {
            debug!(job_id = %self.handle.id(), "Waiting for resume");
        }
        let mut status_rx = self.handle.subscribe_status();
        let open = match status_rx.wait_for(|status| *status != JobStatus::Paused).await {
            Ok(status) => !status.is_terminal(),
            Err(_) => false,
        };
        open
    }

    /// Samples memory and cools down when over the threshold. Returns true if
    /// the job was throttled.
    async fn guard_memory(&self, guard: &MemoryGuard) -> bool {
        let Some(memory_mb) = guard.sample() else {
            return false;
        };
        self.record_memory(memory_mb).await;
        if !guard.exceeds(memory_mb) {
            return false;
        }

        warn!(
            job_id = %self.handle.id(),
            "Memory at {:.1}MB exceeds {}MB, cooling down before next chunk",
            memory_mb,
            guard.threshold_mb()
        );
        self.handle
            .update(|job| job.metrics.memory_throttle_count += 1)
            .await;
        if let Some(after) = guard.cooldown().await {
            self.record_memory(after).await;
        }
        true
    }

    async fn record_memory(&self, memory_mb: f64) {
        self.handle
            .update(|job| job.metrics.peak_memory_mb = job.metrics.peak_memory_mb.max(memory_mb))
            .await;
    }

    /// Folds a settled chunk into the record and publishes progress.
    async fn apply(&self, outcomes: Vec<TaskOutcome>) {
        for outcome in &outcomes {
            let label = outcome.result_label();
            TASKS_TOTAL.with_label_values(&[label]).inc();
            if let Some(elapsed) = outcome.elapsed() {
                TASK_DURATION
                    .with_label_values(&[label])
                    .observe(elapsed.as_secs_f64());
            }
        }

        let peak_in_flight = self.handle.peak_in_flight();
        let applied = self
            .handle
            .update(|job| {
                for outcome in outcomes {
                    apply_outcome(job, outcome);
                }

                let retried = job.tasks.iter().filter(|t| t.retry_count > 0).count();
                job.metrics.retry_rate_percent = if job.progress.total == 0 {
                    0.0
                } else {
                    retried as f64 / job.progress.total as f64 * 100.0
                };
                job.metrics.peak_concurrency = job.metrics.peak_concurrency.max(peak_in_flight);

                let elapsed_ms = job.elapsed_ms().unwrap_or(0);
                job.progress = compute_progress(&job.progress, elapsed_ms);
                job.metrics.throughput = job.progress.tasks_per_second;

                (job.progress.clone(), job.mirror_patch())
            })
            .await;

        let Some((progress, patch)) = applied else {
            debug!(job_id = %self.handle.id(), "Job finished mid-chunk, discarding results");
            return;
        };

        debug!(
            job_id = %self.handle.id(),
            completed = progress.completed,
            failed = progress.failed,
            percentage = progress.percentage,
            "Chunk applied"
        );
        self.events.publish(JobEvent::Progress {
            job_id: self.handle.id().to_string(),
            progress,
        });
        if let Some(mirror) = &self.mirror {
            mirror.try_record(MirrorOp::update(JOBS_COLLECTION, self.handle.id(), patch));
        }
    }

    /// Moves a job whose chunks are all processed to completed or failed.
    async fn finish(&self) {
        let failed = self.handle.read(|job| job.progress.failed).await;
        let target = if failed == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        // A pause that arrived during the last chunk is honored here too.
        loop {
            if !self.checkpoint().await {
                return;
            }
            match self.handle.transition(target).await {
                Ok(_) => break,
                Err(_) if self.handle.status() == JobStatus::Paused => continue,
                Err(_) => return,
            }
        }

        let record = self.handle.snapshot().await;
        JOBS_FINISHED.with_label_values(&[target.as_str()]).inc();

        let event = if target == JobStatus::Completed {
            info!(
                job_id = %record.id,
                completed = record.progress.completed,
                elapsed_ms = record.elapsed_ms().unwrap_or(0),
                "Job completed"
            );
            JobEvent::JobCompleted {
                job_id: record.id.clone(),
                progress: record.progress.clone(),
            }
        } else {
            warn!(
                job_id = %record.id,
                completed = record.progress.completed,
                failed = record.progress.failed,
                "Job failed: {} task(s) exhausted their retries",
                record.progress.failed
            );
            JobEvent::JobFailed {
                job_id: record.id.clone(),
                progress: record.progress.clone(),
                errors: record.errors.clone(),
            }
        };

        self.events.publish(event);
        if let Some(mirror) = &self.mirror {
            mirror.try_record(MirrorOp::update(
                JOBS_COLLECTION,
                &record.id,
                record.mirror_patch(),
            ));
        }
    }

    /// Fails the job after an orchestration error.
    async fn fail(&self, cause: BatchError) {
        let entry = JobErrorEntry {
            task_id: ORCHESTRATOR_TASK_ID.to_string(),
            message: cause.to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
        };
        if !self.handle.fail(entry).await {
            return;
        }

        error!(job_id = %self.handle.id(), "Job failed: {}", cause);
        JOBS_FINISHED.with_label_values(&["failed"]).inc();

        let record = self.handle.snapshot().await;
        self.events.publish(JobEvent::JobFailed {
            job_id: record.id.clone(),
            progress: record.progress.clone(),
            errors: record.errors.clone(),
        });
        mirror_record(&self.mirror, &self.handle).await;
    }
}

fn apply_outcome(job: &mut JobRecord, outcome: TaskOutcome) {
    match outcome {
        TaskOutcome::Succeeded {
            task_id,
            retry_count,
            elapsed,
            ..
        } => {
            let done = job.progress.completed as f64;
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            job.metrics.average_task_time_ms =
                (job.metrics.average_task_time_ms * done + elapsed_ms) / (done + 1.0);
            job.progress.completed += 1;
            if let Some(task) = job.task_mut(&task_id) {
                task.retry_count = retry_count;
            }
        }
        TaskOutcome::Failed {
            task_id,
            retry_count,
            error,
            ..
        } => {
            job.progress.failed += 1;
            if let Some(task) = job.task_mut(&task_id) {
                task.retry_count = retry_count;
            }
            job.errors.push(JobErrorEntry {
                task_id,
                message: error,
                timestamp: Utc::now(),
                retry_count,
            });
        }
        TaskOutcome::Skipped { .. } => {}
    }
}
