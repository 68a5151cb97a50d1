//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, thresholds >= 1)
//! - Check the default endpoint is a usable push-stream URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is handed to a client

use std::fmt;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let reconnect = &config.reconnect;
    if reconnect.base_delay_ms == 0 {
        errors.push(ValidationError::new("reconnect.base_delay_ms", "must be greater than 0"));
    }
    if reconnect.max_delay_ms < reconnect.base_delay_ms {
        errors.push(ValidationError::new(
            "reconnect.max_delay_ms",
            format!(
                "must be >= base_delay_ms ({} < {})",
                reconnect.max_delay_ms, reconnect.base_delay_ms
            ),
        ));
    }
    if reconnect.max_retries == 0 {
        errors.push(ValidationError::new("reconnect.max_retries", "must be at least 1"));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be at least 1"));
    }
    if config.breaker.cooldown_ms == 0 {
        errors.push(ValidationError::new("breaker.cooldown_ms", "must be greater than 0"));
    }

    if config.credential_param.trim().is_empty() {
        errors.push(ValidationError::new("credential_param", "must not be empty"));
    }

    if let Some(endpoint) = &config.endpoint {
        match Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(ValidationError::new(
                "endpoint",
                format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("endpoint", format!("invalid URL: {}", e))),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
