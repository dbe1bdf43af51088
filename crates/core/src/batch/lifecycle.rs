//! Job status state machine and the per-job control handle.
//!
//! ```text
//! pending -> running -> completed | failed | cancelled
//!            running <-> paused
//!            paused  -> cancelled | failed
//! ```
//!
//! Status changes are published on a `watch` channel so the processing loop can
//! wait for `resume` without polling and queued tasks can observe `cancel`.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use super::types::{BatchError, JobErrorEntry, JobRecord};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true if the job holds a processing loop (running or paused).
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Paused)
    }

    /// Returns true if `to` is a legal next status.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Failed)
                | (Running, Cancelled)
                | (Paused, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobRecord {
    /// Applies a status change, stamping `start_time` on the first run and
    /// `end_time` exactly once on entry into a terminal state.
    pub(crate) fn transition(&mut self, to: JobStatus) -> Result<JobStatus, BatchError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(BatchError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        self.status = to;
        if to == JobStatus::Running && self.start_time.is_none() {
            self.start_time = Some(now);
        }
        if to.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(now);
        }
        Ok(from)
    }
}

/// Shared handle to one registered job.
///
/// All writes to the record go through the handle's lock. Once the record is
/// terminal, [`JobHandle::update`] refuses further mutation.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    record: RwLock<JobRecord>,
    status_tx: watch::Sender<JobStatus>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl JobHandle {
    pub fn new(record: JobRecord) -> Self {
        let (status_tx, _) = watch::channel(record.status);
        Self {
            id: record.id.clone(),
            record: RwLock::new(record),
            status_tx,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status without taking the record lock.
    pub fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    /// Receiver that observes every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    /// Point-in-time copy of the record.
    pub async fn snapshot(&self) -> JobRecord {
        self.record.read().await.clone()
    }

    /// Reads the record under the lock without cloning it.
    pub async fn read<R>(&self, f: impl FnOnce(&JobRecord) -> R) -> R {
        let record = self.record.read().await;
        f(&record)
    }

    /// Mutates a non-terminal record. Returns `None` if the job is already
    /// terminal, in which case nothing is written.
    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut JobRecord) -> R) -> Option<R> {
        let mut record = self.record.write().await;
        if record.status.is_terminal() {
            return None;
        }
        Some(f(&mut record))
    }

    /// Moves the job to `to`, publishing the new status.
    pub(crate) async fn transition(&self, to: JobStatus) -> Result<JobStatus, BatchError> {
        let mut record = self.record.write().await;
        let from = record.transition(to)?;
        self.status_tx.send_replace(to);
        Ok(from)
    }

    /// Requests a pause. Takes effect at the next chunk boundary.
    pub async fn pause(&self) -> bool {
        self.transition(JobStatus::Paused).await.is_ok()
    }

    /// Resumes a paused job.
    pub async fn resume(&self) -> bool {
        self.transition(JobStatus::Running).await.is_ok()
    }

    /// Cancels a running or paused job.
    ///
    /// Everything not yet processed counts as skipped; results of tasks still
    /// in flight are discarded because the record is frozen from here on.
    pub async fn cancel(&self, warning: Option<String>) -> bool {
        let mut record = self.record.write().await;
        if record.transition(JobStatus::Cancelled).is_err() {
            return false;
        }
        record.progress.skipped = record.progress.remaining();
        if let Some(warning) = warning {
            record.warnings.push(warning);
        }
        self.status_tx.send_replace(JobStatus::Cancelled);
        true
    }

    /// Fails a running or paused job because of an orchestration error.
    ///
    /// The error is recorded and unprocessed tasks count as skipped.
    pub(crate) async fn fail(&self, error: JobErrorEntry) -> bool {
        let mut record = self.record.write().await;
        if record.transition(JobStatus::Failed).is_err() {
            return false;
        }
        record.progress.skipped = record.progress.remaining();
        record.errors.push(error);
        self.status_tx.send_replace(JobStatus::Failed);
        true
    }

    /// Marks a task as dispatched, returning the new in-flight count.
    pub(crate) fn task_started(&self) -> usize {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        current
    }

    pub(crate) fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Tasks currently executing for this job.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count seen so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}
