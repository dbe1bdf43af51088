//! Batch job orchestration.
//!
//! A job is a list of tasks run by one [`TaskProcessor`]. The orchestrator
//! splits it into chunks, runs each chunk with bounded concurrency and
//! per-task retries, and checks for pause, cancel and memory pressure between
//! chunks.
//!
//! ```ignore
//! let orchestrator = BatchOrchestrator::new(JobConfig::default());
//! let id = orchestrator
//!     .create_job("thumbnail", tasks, processor, None)
//!     .await?;
//! let job = orchestrator.wait_for_job(&id).await;
//! ```

pub mod chunker;
mod config;
mod events;
mod lifecycle;
mod limiter;
mod memory;
mod orchestrator;
mod processor;
pub mod progress;
mod registry;
pub mod report;
mod retry;
mod types;
mod webhook;

pub use config::{JobConfig, JobConfigOverrides};
pub use events::{EventBus, JobEvent, DEFAULT_SUBSCRIBER_BACKLOG};
pub use lifecycle::{JobHandle, JobStatus};
pub use limiter::ConcurrencyLimiter;
pub use memory::{MemoryGuard, MemorySampler, SysinfoSampler};
pub use orchestrator::{BatchOrchestrator, CANCEL_REASON};
pub use processor::{processor_fn, FnProcessor, ProcessorError, ProcessorRegistry, TaskProcessor};
pub use progress::compute_progress;
pub use registry::JobRegistry;
pub use report::{generate_report, Bottleneck, PerformanceReport, Severity};
pub use retry::{execute_with_retry, RetryPolicy, TaskOutcome};
pub use types::{
    BatchError, JobErrorEntry, JobFilter, JobMetrics, JobProgress, JobRecord, SystemMetrics,
    TaskSpec, TaskUnit, ORCHESTRATOR_TASK_ID,
};
pub use webhook::{webhook_registry, WebhookProcessor};
