//! Connection state, failure reasons and the published client status.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{BackoffState, CircuitBreakerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        }
    }

    /// Value exported on the `live_metrics_connection_state` gauge.
    pub fn gauge_code(&self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Failed => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the client is not (or was not) connected.
///
/// Never returned from the public API; it is carried in [`ClientStatus`]
/// so a dashboard can explain a `Failed` badge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Access denied by server ({detail}); check the access token and reconnect")]
    AuthRejected { detail: String },

    #[error("Could not connect after {attempts} attempts; reconnect to try again")]
    RetryBudgetExhausted { attempts: u32 },

    #[error("Server unreachable, pausing reconnects (next check in {}s)", .retry_in.as_secs())]
    CircuitOpen { retry_in: Duration },

    #[error("Connection lost: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether the client has stopped retrying on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidEndpoint { .. }
                | ClientError::AuthRejected { .. }
                | ClientError::RetryBudgetExhausted { .. }
        )
    }
}

/// Coherent read-only view of a client, published on every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientStatus {
    pub connection: ConnectionState,
    pub breaker: CircuitBreakerState,
    pub backoff: BackoffState,
    pub last_error: Option<ClientError>,
}
