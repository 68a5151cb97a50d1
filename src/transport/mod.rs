//! Push-stream transport subsystem.
//!
//! # Data Flow
//! ```text
//! Transport::open(url, sink, close_rx)
//!     → spawned connection task
//!     → Opened | Frame | Error | Closed events, tagged with a connection generation
//!     → one mpsc channel → client driver (single consumer, arrival order preserved)
//! ```
//!
//! # Design Decisions
//! - Callback-style transport notifications become one uniform event type
//! - A transport always ends a connection with exactly one `Closed` event
//! - Close classification (network vs. auth) is a pure function of `CloseInfo`

pub mod tungstenite;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::resilience::FailureKind;

pub use self::tungstenite::TungsteniteTransport;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Payload of an inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// How a connection ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code from the peer's close frame; `None` for an abnormal end.
    pub code: Option<u16>,
    pub reason: String,
    /// HTTP status if the handshake itself was rejected.
    pub http_status: Option<u16>,
    /// The client asked for this close.
    pub initiated_locally: bool,
}

impl CloseInfo {
    pub fn local() -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: "closed by client".to_string(),
            http_status: None,
            initiated_locally: true,
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn with_code(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn rejected(http_status: u16, reason: impl Into<String>) -> Self {
        Self {
            http_status: Some(http_status),
            reason: reason.into(),
            ..Self::default()
        }
    }
}

/// Classify an unrequested close.
pub fn classify_close(close: &CloseInfo, auth_close_codes: &[u16]) -> FailureKind {
    if matches!(close.http_status, Some(401 | 403)) {
        return FailureKind::Auth;
    }
    match close.code {
        Some(code) if auth_close_codes.contains(&code) => FailureKind::Auth,
        // No close frame, normal, going away, server error, restart, try again later, bad gateway.
        None | Some(1000 | 1001 | 1006 | 1011 | 1012 | 1013 | 1014) => FailureKind::Network,
        Some(_) => FailureKind::Unknown,
    }
}

/// Event emitted by a connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(Payload),
    /// Pre-close error signal; a `Closed` event follows.
    Error(String),
    Closed(CloseInfo),
}

/// Sending half handed to a connection task.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the client has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Opens push-stream connections.
///
/// Implementations spawn one task per call that reports through `sink` and
/// closes the connection when `close` resolves (or its sender is dropped).
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: Url, sink: EventSink, close: oneshot::Receiver<()>) -> JoinHandle<()>;
}
