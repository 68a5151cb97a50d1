//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection attempt:
//!     → circuit_breaker.rs (may we attempt now?)
//!     → On failure: circuit_breaker.rs records the FailureKind
//!     → backoff.rs (delay before the next attempt)
//!     → On Connected: breaker closes, backoff resets
//! ```
//!
//! # Design Decisions
//! - Both are plain owned values; the connection driver is their only mutator
//! - Auth failures short-circuit the breaker instead of counting toward the threshold
//! - Jitter is drawn per computation so seeded tests are reproducible

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{calculate_backoff, Backoff, BackoffState};
pub use circuit_breaker::{BreakerPhase, CircuitBreaker, CircuitBreakerState, FailureKind};
