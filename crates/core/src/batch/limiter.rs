//! Bounds the number of tasks executing at once within a chunk.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error};

use super::lifecycle::JobHandle;
use super::processor::TaskProcessor;
use super::retry::{execute_with_retry, RetryPolicy, TaskOutcome};
use super::types::{BatchError, TaskUnit};

/// Per-job concurrency limiter.
///
/// Every task of a chunk is queued at once; a semaphore lets at most
/// `max_concurrency` of them run. A task that obtains its permit after the job
/// reached a terminal status is skipped without calling the processor.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

/// Everything a chunk produced once all of its tasks settled.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    /// One outcome per task, in completion order. A task whose processor
    /// panicked is reported as failed.
    pub outcomes: Vec<TaskOutcome>,
    /// First processor panic seen in the chunk.
    pub panic: Option<BatchError>,
}

/// Decrements the job's in-flight count even if the processor panics.
struct InFlightGuard(Arc<JobHandle>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.task_finished();
    }
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs every task of `chunk` and waits until all of them settled.
    ///
    /// A failing task never affects its siblings. A panicking processor fails
    /// only its own task; the siblings still settle and keep their outcomes,
    /// and the panic is handed back as an orchestration error.
    pub async fn run_chunk(
        &self,
        chunk: Vec<TaskUnit>,
        job: &Arc<JobHandle>,
        processor: &Arc<dyn TaskProcessor>,
        policy: RetryPolicy,
    ) -> ChunkOutcome {
        let mut set = JoinSet::new();
        let mut spawned: HashMap<Id, (String, Instant)> = HashMap::with_capacity(chunk.len());
        let total = chunk.len();

        for task in chunk {
            let semaphore = Arc::clone(&self.semaphore);
            let job = Arc::clone(job);
            let processor = Arc::clone(processor);
            let task_id = task.id.clone();

            let abort = set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::Skipped { task_id: task.id };
                };

                if job.status().is_terminal() {
                    return TaskOutcome::Skipped { task_id: task.id };
                }

                job.task_started();
                let _guard = InFlightGuard(Arc::clone(&job));
                execute_with_retry(&task, processor.as_ref(), &policy).await
            });
            spawned.insert(abort.id(), (task_id, Instant::now()));
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut panic_message = None;

        while let Some(joined) = set.join_next_with_id().await {
            let (id, error) = match joined {
                Ok((_, outcome)) => {
                    outcomes.push(outcome);
                    continue;
                }
                Err(e) if e.is_panic() => {
                    let id = e.id();
                    let message = panic_message_of(e.into_panic());
                    error!(job_id = %job.id(), "Task processor panicked: {}", message);
                    (id, message)
                }
                Err(e) => {
                    error!(job_id = %job.id(), "Task execution aborted: {}", e);
                    (e.id(), e.to_string())
                }
            };

            if let Some((task_id, started)) = spawned.remove(&id) {
                outcomes.push(TaskOutcome::Failed {
                    task_id,
                    retry_count: 0,
                    elapsed: started.elapsed(),
                    error: format!("processor panicked: {}", error),
                });
            }
            panic_message.get_or_insert(error);
        }

        debug!(
            job_id = %job.id(),
            settled = outcomes.len(),
            "Chunk settled"
        );
        ChunkOutcome {
            outcomes,
            panic: panic_message.map(|message| {
                BatchError::Orchestration(format!("task processor panicked: {}", message))
            }),
        }
    }
}

fn panic_message_of(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
