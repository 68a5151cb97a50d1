//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! client, resilience, dispatch produce:
//!     → logging.rs (structured log events, client_id on every span)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape (optional, CLI only)
//! ```

pub mod logging;
pub mod metrics;
