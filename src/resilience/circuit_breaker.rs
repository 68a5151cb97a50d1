//! Circuit breaker guarding connection attempts.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: endpoint assumed down (or credential rejected), attempts are suppressed
//! - Half-Open: cooldown elapsed, the next attempt is a probe
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold, or any Auth failure
//! Open → Half-Open: cooldown elapsed and the open was not caused by Auth
//! Half-Open → Closed: probe connection succeeds
//! Half-Open → Open: probe connection fails
//! ```
//!
//! # Design Decisions
//! - One breaker per client instance (not global)
//! - Auth-caused opens never expire by time; only `clear_auth_lock` lifts them
//! - Time comes from `tokio::time::Instant` so tests can pause the clock

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Classification of a single failure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Refused connection, abnormal close, timeout. Retryable.
    Network,
    /// Server explicitly rejected the credential. Fatal.
    Auth,
    /// Anything else; counted like a network failure.
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Auth => "auth",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerPhase::Closed => "closed",
            BreakerPhase::Open => "open",
            BreakerPhase::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub phase: BreakerPhase,
    /// Set when an Auth failure forced the breaker open.
    pub auth_locked: bool,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            failure_count: 0,
            last_failure_time: None,
            phase: BreakerPhase::Closed,
            auth_locked: false,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: CircuitBreakerState,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            state: CircuitBreakerState::default(),
        }
    }

    /// Whether a connection attempt may be made now.
    pub fn may_attempt(&mut self) -> bool {
        self.may_attempt_at(Instant::now())
    }

    pub fn may_attempt_at(&mut self, now: Instant) -> bool {
        match self.state.phase {
            BreakerPhase::Closed | BreakerPhase::HalfOpen => true,
            BreakerPhase::Open => {
                if self.state.auth_locked {
                    return false;
                }
                let cooled_down = self
                    .state
                    .last_failure_time
                    .map_or(true, |at| now.saturating_duration_since(at) > self.cooldown);
                if cooled_down {
                    self.transition(BreakerPhase::HalfOpen);
                }
                cooled_down
            }
        }
    }

    pub fn record_failure(&mut self, kind: FailureKind) {
        self.record_failure_at(kind, Instant::now());
    }

    pub fn record_failure_at(&mut self, kind: FailureKind, now: Instant) {
        self.state.failure_count = self.state.failure_count.saturating_add(1);
        self.state.last_failure_time = Some(now);

        if kind == FailureKind::Auth {
            self.state.auth_locked = true;
            self.transition(BreakerPhase::Open);
            return;
        }

        match self.state.phase {
            BreakerPhase::Closed if self.state.failure_count >= self.threshold => {
                self.transition(BreakerPhase::Open);
            }
            BreakerPhase::HalfOpen => self.transition(BreakerPhase::Open),
            _ => {}
        }
    }

    /// A connection reached `Connected`: close the breaker and zero the count.
    pub fn record_success(&mut self) {
        if self.state.auth_locked {
            // A stale success must not lift an auth lock.
            return;
        }
        self.state.failure_count = 0;
        if self.state.phase != BreakerPhase::Closed {
            self.transition(BreakerPhase::Closed);
        }
    }

    /// Explicit retry intent from the user: lift an auth-forced open.
    ///
    /// Opens caused by network failures keep their cooldown.
    pub fn clear_auth_lock(&mut self) {
        if !self.state.auth_locked {
            return;
        }
        self.state = CircuitBreakerState::default();
        tracing::info!("Circuit breaker auth lock cleared");
        metrics::record_breaker_transition(BreakerPhase::Closed.as_str());
    }

    pub fn phase(&self) -> BreakerPhase {
        self.state.phase
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }

    fn transition(&mut self, to: BreakerPhase) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        self.state.phase = to;
        tracing::info!(
            from = %from,
            to = %to,
            failure_count = self.state.failure_count,
            auth_locked = self.state.auth_locked,
            "Circuit breaker transition"
        );
        metrics::record_breaker_transition(to.as_str());
    }
}
