use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Job defaults are runnable
/// - Webhooks have an http(s) URL, a timeout and a unique job type
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    config
        .batch
        .defaults
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("batch: {}", e)))?;

    if config.batch.mirror_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "batch.mirror_buffer cannot be 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for webhook in &config.webhooks {
        if webhook.job_type.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "webhooks.job_type cannot be empty".to_string(),
            ));
        }
        if !seen.insert(webhook.job_type.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate webhook for job type '{}'",
                webhook.job_type
            )));
        }
        if !(webhook.url.starts_with("http://") || webhook.url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "webhook '{}' url must start with http:// or https://",
                webhook.job_type
            )));
        }
        if webhook.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "webhook '{}' timeout_secs cannot be 0",
                webhook.job_type
            )));
        }
    }

    Ok(())
}
