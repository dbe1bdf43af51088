//! Testing utilities and mock implementations.
//!
//! Mocks for every seam the orchestrator depends on, so jobs can be driven
//! end to end without webhooks, real memory pressure or a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use deckbatch_core::testing::{fixtures, MockProcessor, ScriptedMemorySampler};
//!
//! let orchestrator = BatchOrchestrator::new(fixtures::fast_config())
//!     .with_sampler(Arc::new(ScriptedMemorySampler::constant(100.0)));
//! let processor = Arc::new(MockProcessor::new().failing_for(["t-2"]));
//!
//! let id = orchestrator
//!     .create_job("thumbnail", fixtures::task_specs(10), processor.clone(), None)
//!     .await?;
//! ```

mod mock_memory;
mod mock_mirror;
mod mock_processor;

pub use mock_memory::ScriptedMemorySampler;
pub use mock_mirror::MockMirror;
pub use mock_processor::{MockProcessor, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::batch::{JobConfig, TaskSpec};

    /// `n` tasks with ids `t-0..t-{n-1}` and a small slide payload.
    pub fn task_specs(n: usize) -> Vec<TaskSpec> {
        (0..n)
            .map(|i| {
                TaskSpec::new(
                    format!("t-{}", i),
                    serde_json::json!({ "deck": "quarterly-review", "slide": i }),
                )
            })
            .collect()
    }

    /// Defaults with millisecond backoff and cooldown so tests finish quickly.
    pub fn fast_config() -> JobConfig {
        JobConfig::default()
            .with_retry(3, 1)
            .with_monitoring_interval(10)
            .with_memory_cooldown(1)
    }
}
