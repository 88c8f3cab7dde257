//! Configuration validation.
//!
//! Serde handles the syntactic side (missing fields, wrong types, unknown
//! keys). This module checks values. All errors are returned, not just the
//! first one.

use thiserror::Error;

use crate::config::schema::Configuration;

/// Accepted values for `logger.log_level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("logger.log_level '{0}' is not one of trace, debug, info, warn, error")]
    LogLevel(String),

    #[error("postgres.pool_max must be at least 1")]
    PoolSize,
}

/// Check a decoded configuration.
pub fn validate_config(config: &Configuration) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app.name.trim().is_empty() {
        errors.push(ValidationError::Empty("app.name"));
    }
    if config.app.version.trim().is_empty() {
        errors.push(ValidationError::Empty("app.version"));
    }

    let level = config.log.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.log.level.clone()));
    }

    if config.pg.url.trim().is_empty() {
        errors.push(ValidationError::Empty("postgres.url"));
    }
    if config.pg.pool_max == 0 {
        errors.push(ValidationError::PoolSize);
    }

    // Exchanges only matter when the RPC backend will be started.
    if config.rmq.is_enabled() {
        if config.rmq.rpc_server_exchange.trim().is_empty() {
            errors.push(ValidationError::Empty("rabbitmq.rpc_server_exchange"));
        }
        if config.rmq.rpc_client_exchange.trim().is_empty() {
            errors.push(ValidationError::Empty("rabbitmq.rpc_client_exchange"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
