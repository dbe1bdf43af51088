//! Job events for observers such as the WebSocket relay.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::metrics::EVENT_SUBSCRIBERS_DROPPED;

use super::types::{JobErrorEntry, JobProgress};

/// Notification published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobCreated {
        job_id: String,
        job_type: String,
        total_tasks: usize,
    },
    /// Published after each chunk.
    Progress {
        job_id: String,
        progress: JobProgress,
    },
    JobPaused {
        job_id: String,
    },
    JobResumed {
        job_id: String,
    },
    JobCancelled {
        job_id: String,
        reason: String,
        progress: JobProgress,
    },
    JobCompleted {
        job_id: String,
        progress: JobProgress,
    },
    JobFailed {
        job_id: String,
        progress: JobProgress,
        errors: Vec<JobErrorEntry>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobCreated { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::JobPaused { job_id }
            | JobEvent::JobResumed { job_id }
            | JobEvent::JobCancelled { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. } => job_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobCreated { .. } => "job_created",
            JobEvent::Progress { .. } => "progress",
            JobEvent::JobPaused { .. } => "job_paused",
            JobEvent::JobResumed { .. } => "job_resumed",
            JobEvent::JobCancelled { .. } => "job_cancelled",
            JobEvent::JobCompleted { .. } => "job_completed",
            JobEvent::JobFailed { .. } => "job_failed",
        }
    }

    /// True for the last event a job publishes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCancelled { .. } | JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. }
        )
    }
}

/// Events a subscriber may have queued before it is dropped.
pub const DEFAULT_SUBSCRIBER_BACKLOG: usize = 1024;

/// Fan-out of job events to any number of subscribers.
///
/// Publishing never blocks a job. Each subscriber owns a bounded channel; a
/// subscriber whose backlog is full is dropped, which ends its stream once the
/// queued events are drained. Closed receivers are pruned on publish.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<JobEvent>>>,
    backlog: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_backlog(DEFAULT_SUBSCRIBER_BACKLOG)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backlog(backlog: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            backlog: backlog.max(1),
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(self.backlog);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn publish(&self, event: JobEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    backlog = self.backlog,
                    "Event subscriber fell behind, dropping it"
                );
                EVENT_SUBSCRIBERS_DROPPED.inc();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
