pub mod batch;
pub mod config;
pub mod metrics;
pub mod mirror;
pub mod testing;

pub use batch::{
    processor_fn, webhook_registry, BatchError, BatchOrchestrator, EventBus, JobConfig,
    JobConfigOverrides, JobEvent, JobFilter, JobHandle, JobProgress, JobRecord, JobStatus,
    MemorySampler, PerformanceReport, ProcessorError, ProcessorRegistry, SystemMetrics,
    TaskProcessor, TaskSpec, TaskUnit, WebhookProcessor,
};
pub use config::{
    load_config, load_config_from_str, validate_config, BatchConfig, Config, ConfigError,
    DatabaseConfig, SanitizedConfig, ServerConfig, WebhookConfig,
};
pub use mirror::{
    create_mirror_system, DocumentMirror, MirrorError, MirrorHandle, MirrorWriter,
    SqliteDocumentMirror,
};
