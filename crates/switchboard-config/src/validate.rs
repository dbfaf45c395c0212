//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Largest accepted start timeout (one hour).
const MAX_START_TIMEOUT_MS: u64 = 3_600_000;

/// Largest accepted event channel capacity.
const MAX_EVENT_CHANNEL_CAPACITY: usize = 1 << 20;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_catalog(config)?;
    validate_broker(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_catalog(config: &Config) -> ConfigResult<()> {
    let c = &config.catalog;

    let file = c.manifest_file.as_str();
    if file.is_empty() || file.contains('/') || file.contains('\\') || file == "." || file == ".." {
        return Err(ConfigError::ValidationError {
            field: "catalog.manifest_file".to_owned(),
            message: format!("'{file}' must be a plain file name"),
        });
    }

    if let Some(bad) = c.bootstrap_services.iter().find(|s| s.is_empty()) {
        return Err(ConfigError::ValidationError {
            field: "catalog.bootstrap_services".to_owned(),
            message: format!("service names must not be empty (got {bad:?})"),
        });
    }

    Ok(())
}

fn validate_broker(config: &Config) -> ConfigResult<()> {
    let b = &config.broker;

    if b.start_timeout_ms > MAX_START_TIMEOUT_MS {
        return Err(ConfigError::ValidationError {
            field: "broker.start_timeout_ms".to_owned(),
            message: format!("must be at most {MAX_START_TIMEOUT_MS} (0 disables)"),
        });
    }

    if b.event_channel_capacity == 0 || b.event_channel_capacity > MAX_EVENT_CHANNEL_CAPACITY {
        return Err(ConfigError::ValidationError {
            field: "broker.event_channel_capacity".to_owned(),
            message: format!("must be between 1 and {MAX_EVENT_CHANNEL_CAPACITY}"),
        });
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}
