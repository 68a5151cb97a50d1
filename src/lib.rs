//! Resilient live metrics client.
//!
//! Keeps a long-lived push stream open against a metrics server, merges the
//! partial updates it delivers into one snapshot and survives restarts,
//! authorization failures and transient network loss.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use client::{ClientError, ClientStatus, ConnectionState, LiveMetricsClient};
pub use config::ClientConfig;
pub use dispatch::{MetricsSnapshot, Subscription};
pub use lifecycle::Shutdown;
pub use resilience::{BreakerPhase, FailureKind};
