//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, port inside the allowed range)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic constraint and collect all failures.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.port_range.min > listener.port_range.max {
        errors.push(ValidationError::new(
            "listener.port_range",
            format!(
                "min {} is greater than max {}",
                listener.port_range.min, listener.port_range.max
            ),
        ));
    } else if !listener.port_range.contains(listener.port) {
        errors.push(ValidationError::new(
            "listener.port",
            format!(
                "{} is outside the allowed range {}-{}",
                listener.port, listener.port_range.min, listener.port_range.max
            ),
        ));
    }
    if listener.bind_host.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_host", "must not be empty"));
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be at least 1"));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be at least 1"));
    }
    if config.rate_limit.registry_capacity == 0 {
        errors.push(ValidationError::new(
            "rate_limit.registry_capacity",
            "must be at least 1",
        ));
    }

    if config.sessions.max_users == 0 {
        errors.push(ValidationError::new("sessions.max_users", "must be at least 1"));
    }
    if config.sessions.idle_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "sessions.idle_timeout_secs",
            "must be at least 1",
        ));
    }

    if config.transfer.max_payload_size == 0 {
        errors.push(ValidationError::new(
            "transfer.max_payload_size",
            "must be at least 1",
        ));
    }
    if config.transfer.chunk_size == 0 {
        errors.push(ValidationError::new("transfer.chunk_size", "must be at least 1"));
    }

    if config.decoder.program.trim().is_empty() {
        errors.push(ValidationError::new("decoder.program", "must not be empty"));
    }
    if config.decoder.result_marker.is_empty() {
        errors.push(ValidationError::new("decoder.result_marker", "must not be empty"));
    }
    if config.decoder.timeout_secs == 0 {
        errors.push(ValidationError::new("decoder.timeout_secs", "must be at least 1"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
