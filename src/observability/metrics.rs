//! Metrics collection and exposition.
//!
//! # Metrics
//! - `live_metrics_connection_attempts_total` (counter)
//! - `live_metrics_connection_failures_total` (counter): by failure kind
//! - `live_metrics_frames_total` (counter): by outcome (merged, ignored, malformed)
//! - `live_metrics_breaker_transitions_total` (counter): by target phase
//! - `live_metrics_subscriber_panics_total` (counter)
//! - `live_metrics_connection_state` (gauge): 0=disconnected, 1=connecting, 2=connected, 3=failed
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in and installed by the binary only

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_connection_attempt() {
    counter!("live_metrics_connection_attempts_total").increment(1);
}

pub fn record_connection_failure(kind: &'static str) {
    counter!("live_metrics_connection_failures_total", "kind" => kind).increment(1);
}

pub fn record_frame(outcome: &'static str) {
    counter!("live_metrics_frames_total", "outcome" => outcome).increment(1);
}

pub fn record_breaker_transition(to: &'static str) {
    counter!("live_metrics_breaker_transitions_total", "to" => to).increment(1);
}

pub fn record_subscriber_panic() {
    counter!("live_metrics_subscriber_panics_total").increment(1);
}

pub fn record_connection_state(code: u8) {
    gauge!("live_metrics_connection_state").set(f64::from(code));
}
