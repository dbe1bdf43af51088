//! Caller-supplied per-task work functions.
//!
//! The orchestrator is generic over the work it runs: each job carries an
//! `Arc<dyn TaskProcessor>`. Processors must be safe to call again for the same
//! task, since failed attempts are retried without deduplicating side effects.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::types::TaskUnit;

/// Error returned by a processor for a single attempt.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The work itself failed.
    #[error("{0}")]
    Failed(String),

    /// The payload cannot be processed by this job type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A remote call failed.
    #[error("request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessorError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProcessorError::Failed(message.into())
    }
}

/// Executes one task.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Processes the task, returning an opaque result on success.
    async fn process(&self, task: &TaskUnit) -> Result<serde_json::Value, ProcessorError>;
}

/// Adapter turning an async closure into a [`TaskProcessor`].
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskProcessor for FnProcessor<F>
where
    F: Fn(TaskUnit) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ProcessorError>> + Send,
{
    async fn process(&self, task: &TaskUnit) -> Result<serde_json::Value, ProcessorError> {
        (self.f)(task.clone()).await
    }
}

/// Wraps an async closure as a shareable processor.
///
/// ```ignore
/// let processor = processor_fn(|task| async move {
///     delete_record(&task.id).await?;
///     Ok(serde_json::Value::Null)
/// });
/// ```
pub fn processor_fn<F, Fut>(f: F) -> Arc<dyn TaskProcessor>
where
    F: Fn(TaskUnit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ProcessorError>> + Send + 'static,
{
    Arc::new(FnProcessor::new(f))
}

/// Processors registered by job type, for hosts that create jobs by name.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn TaskProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the processor for `job_type`.
    pub fn register(&mut self, job_type: impl Into<String>, processor: Arc<dyn TaskProcessor>) {
        self.processors.insert(job_type.into(), processor);
    }

    pub fn with(mut self, job_type: impl Into<String>, processor: Arc<dyn TaskProcessor>) -> Self {
        self.register(job_type, processor);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn TaskProcessor>> {
        self.processors.get(job_type).cloned()
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.processors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::types::TaskSpec;
    use serde_json::json;

    #[tokio::test]
    async fn test_processor_fn_runs_closure() {
        let processor = processor_fn(|task: TaskUnit| async move {
            Ok(json!({ "echo": task.id }))
        });

        let task = TaskUnit::from(TaskSpec::new("slide-1", json!({})));
        let result = processor.process(&task).await.unwrap();
        assert_eq!(result["echo"], "slide-1");
    }

    #[tokio::test]
    async fn test_processor_fn_propagates_error() {
        let processor = processor_fn(|_task: TaskUnit| async move {
            Err(ProcessorError::failed("thumbnail render failed"))
        });

        let task = TaskUnit::from(TaskSpec::new("slide-1", json!({})));
        let err = processor.process(&task).await.unwrap_err();
        assert_eq!(err.to_string(), "thumbnail render failed");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProcessorRegistry::new()
            .with("thumbnail", processor_fn(|_t: TaskUnit| async { Ok(json!(null)) }))
            .with("archive", processor_fn(|_t: TaskUnit| async { Ok(json!(null)) }));

        assert!(registry.get("thumbnail").is_some());
        assert!(registry.get("delete").is_none());
        assert_eq!(registry.job_types(), vec!["archive", "thumbnail"]);
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: ProcessorError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }
}
