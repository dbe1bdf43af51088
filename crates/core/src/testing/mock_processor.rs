//! Mock task processor for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

use crate::batch::{ProcessorError, TaskProcessor, TaskUnit};

/// A recorded processor call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub task_id: String,
    pub retry_count: u32,
}

/// Mock implementation of the TaskProcessor trait.
///
/// Provides controllable behavior for testing:
/// - Succeed, fail permanently, fail the first N attempts, or panic per task id
/// - Hold every call at a gate until the test releases it
/// - Track calls and peak concurrency for assertions
///
/// # Example
///
/// ```rust,ignore
/// use deckbatch_core::testing::MockProcessor;
///
/// let processor = Arc::new(
///     MockProcessor::new()
///         .with_delay(Duration::from_millis(10))
///         .failing_for(["slide-3"]),
/// );
///
/// let id = orchestrator.create_job("thumbnail", tasks, processor.clone(), None).await?;
/// orchestrator.wait_for_job(&id).await;
/// assert_eq!(processor.calls_for("slide-3"), 4);
/// ```
pub struct MockProcessor {
    delay: Option<Duration>,
    failing: HashSet<String>,
    flaky: HashMap<String, u32>,
    panicking: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<RecordedCall>>,
    calls_tx: watch::Sender<usize>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl std::fmt::Debug for MockProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProcessor")
            .field("delay", &self.delay)
            .field("failing", &self.failing)
            .field("flaky", &self.flaky)
            .field("panicking", &self.panicking)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessor {
    /// Creates a processor that succeeds immediately for every task.
    pub fn new() -> Self {
        let (calls_tx, _) = watch::channel(0);
        Self {
            delay: None,
            failing: HashSet::new(),
            flaky: HashMap::new(),
            panicking: HashSet::new(),
            gate: None,
            calls: Mutex::new(Vec::new()),
            calls_tx,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` on every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every attempt for these task ids fails.
    pub fn failing_for<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(ids.into_iter().map(Into::into));
        self
    }

    /// The first `failures` attempts for `id` fail, later ones succeed.
    pub fn flaky_for(mut self, id: impl Into<String>, failures: u32) -> Self {
        self.flaky.insert(id.into(), failures);
        self
    }

    /// Panics instead of returning for these task ids.
    pub fn panicking_for<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.panicking.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Holds every call until [`release`](Self::release) lets it through.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets `n` gated calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Resolves once at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.calls_tx.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// All calls in start order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of attempts made for `task_id`.
    pub fn calls_for(&self, task_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.task_id == task_id)
            .count()
    }

    /// Distinct task ids seen, in first-call order.
    pub fn called_task_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| seen.insert(c.task_id.clone()))
            .map(|c| c.task_id.clone())
            .collect()
    }

    /// Highest number of calls executing at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, task: &TaskUnit) -> u32 {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|c| c.task_id == task.id).count() as u32;
            calls.push(RecordedCall {
                task_id: task.id.clone(),
                retry_count: task.retry_count,
            });
            previous
        };
        self.calls_tx.send_modify(|count| *count += 1);
        previous
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskProcessor for MockProcessor {
    async fn process(&self, task: &TaskUnit) -> Result<serde_json::Value, ProcessorError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let attempt = self.record(task);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.panicking.contains(&task.id) {
            panic!("mock processor panicked on {}", task.id);
        }
        if self.failing.contains(&task.id) {
            return Err(ProcessorError::failed(format!(
                "mock failure for {}",
                task.id
            )));
        }
        if let Some(&failures) = self.flaky.get(&task.id) {
            if attempt < failures {
                return Err(ProcessorError::failed(format!(
                    "mock transient failure {} for {}",
                    attempt + 1,
                    task.id
                )));
            }
        }

        Ok(serde_json::json!({ "task_id": task.id, "attempt": attempt + 1 }))
    }
}
