//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem with a config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app.name.trim().is_empty() {
        errors.push(ValidationError::new("app.name", "must not be empty"));
    }

    if config.http.bind_host.trim().is_empty() {
        errors.push(ValidationError::new("http.bind_host", "must not be empty"));
    }
    if config.http.port.checked_add(config.http.port_offset).is_none() {
        errors.push(ValidationError::new(
            "http.port_offset",
            format!(
                "port {} + offset {} exceeds 65535",
                config.http.port, config.http.port_offset
            ),
        ));
    }

    if config.lifecycle.ready_warn_interval_ms == 0 {
        errors.push(ValidationError::new(
            "lifecycle.ready_warn_interval_ms",
            "must be greater than 0",
        ));
    }
    if config.lifecycle.ready_timeout_secs == Some(0) {
        errors.push(ValidationError::new(
            "lifecycle.ready_timeout_secs",
            "must be greater than 0 when set",
        ));
    }
    if config.lifecycle.cleanup_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "lifecycle.cleanup_timeout_secs",
            "must be greater than 0",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
