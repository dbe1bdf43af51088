use std::sync::Arc;

use deckbatch_core::{BatchOrchestrator, Config, ProcessorRegistry, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    config_hash: String,
    orchestrator: Arc<BatchOrchestrator>,
    processors: ProcessorRegistry,
}

impl AppState {
    pub fn new(
        config: Config,
        config_hash: String,
        orchestrator: Arc<BatchOrchestrator>,
        processors: ProcessorRegistry,
    ) -> Self {
        Self {
            config,
            config_hash,
            orchestrator,
            processors,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Short SHA-256 of the loaded configuration.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }
}
