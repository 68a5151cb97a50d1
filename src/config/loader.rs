//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let config = parse_config(
            r#"
            endpoint = "wss://example.com/ws/metrics"
            credential = "abc"

            [breaker]
            failure_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.credential.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("reconnect = 12").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("[breaker]\ncooldown_ms = 0\nfailure_threshold = 0").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Validation failed: "));
        assert!(msg.contains("breaker.failure_threshold"));
        assert!(msg.contains("breaker.cooldown_ms"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/live-metrics.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
