//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for a live metrics client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Push-stream endpoint (e.g., "ws://127.0.0.1:9600/ws/metrics").
    pub endpoint: Option<String>,

    /// Optional access credential, appended as a query parameter when non-empty.
    pub credential: Option<String>,

    /// Query parameter name that carries the credential.
    pub credential_param: String,

    /// Reconnect scheduling.
    pub reconnect: ReconnectConfig,

    /// Circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Authorization failure detection.
    pub auth: AuthConfig,

    /// Transport settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            credential: None,
            credential_param: "token".to_string(),
            reconnect: ReconnectConfig::default(),
            breaker: BreakerConfig::default(),
            auth: AuthConfig::default(),
            transport: TransportConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Ceiling for any computed delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to each delay.
    pub jitter_ms: u64,

    /// Attempts allowed without ever reaching `Connected`.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 1000,
            max_retries: 10,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Time the breaker stays open before allowing a probe, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Which server signals mean "authorization denied".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Close codes treated as fatal authorization failures.
    /// HTTP 401/403 on the handshake are always treated as such.
    pub close_codes: Vec<u16>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            close_codes: vec![1008, 4001, 4003, 4401, 4403],
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long to wait for a close event after an error before
    /// synthesizing one, in milliseconds.
    pub close_grace_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { close_grace_ms: 5000 }
    }
}

impl TransportConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}
