//! Live metrics client.
//!
//! # Data Flow
//! ```text
//! connect(endpoint, credential)
//!     → Command channel → driver task (breaker + backoff + live connection)
//!     → Transport events → UpdateDispatcher::merge → subscribers
//!     → ClientStatus published on a watch channel
//! ```
//!
//! # Design Decisions
//! - The driver is the only writer of connection state; the handle only reads
//! - `shutdown()` is synchronous: after it returns no transition, dispatch or
//!   notification is observable
//! - Failures never cross the public API; they surface as `Failed` plus a last error

mod driver;
pub mod endpoint;
pub mod state;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::dispatch::{MetricsSnapshot, Subscription};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::transport::{Transport, TungsteniteTransport};
use driver::{Command, Driver, Shared};

pub use state::{ClientError, ClientStatus, ConnectionState};

/// Handle to one live metrics stream.
///
/// Each handle owns an independent breaker, backoff and snapshot. Dropping the
/// handle shuts the client down.
pub struct LiveMetricsClient {
    client_id: Uuid,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ClientStatus>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LiveMetricsClient {
    /// Create a client using the WebSocket transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, TungsteniteTransport)
    }

    pub fn with_transport<T: Transport>(config: ClientConfig, transport: T) -> Self {
        let backoff = Backoff::new(&config.reconnect);
        Self::with_parts(config, Arc::new(transport), backoff)
    }

    /// Create a client with an explicit backoff, e.g. one seeded for reproducible jitter.
    pub fn with_parts(config: ClientConfig, transport: Arc<dyn Transport>, backoff: Backoff) -> Self {
        let client_id = Uuid::new_v4();
        let shared = Arc::new(Shared::new());
        let status = shared.status.subscribe();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let span = tracing::info_span!("live_metrics_client", client_id = %client_id);
        let driver = Driver::new(client_id, config, transport, backoff, Arc::clone(&shared), commands_rx);
        let handle = tokio::spawn(driver.run().instrument(span));

        Self {
            client_id,
            shared,
            commands,
            status,
            driver: Mutex::new(Some(handle)),
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Start (or restart) streaming from `endpoint`.
    ///
    /// Returns immediately; progress is reported through [`status`](Self::status).
    /// An explicit call resets the retry budget and lifts an auth-forced breaker
    /// lock. A live connection is replaced. Ignored after shutdown.
    pub fn connect(&self, endpoint: &str, credential: Option<&str>) {
        if self.shared.shutdown.is_triggered() {
            tracing::debug!(client_id = %self.client_id, "Ignoring connect after shutdown");
            return;
        }
        let _ = self.commands.send(Command::Connect {
            endpoint: endpoint.to_string(),
            credential: credential.map(str::to_string),
        });
    }

    /// Stop the client. Idempotent.
    ///
    /// Cancels any pending reconnect, closes the live connection and silences
    /// subscribers before returning.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.trigger() {
            return;
        }
        self.shared.dispatcher.close();
        self.shared.close_live();
        self.shared.status.send_if_modified(|status| {
            let changed = status.connection != ConnectionState::Disconnected;
            status.connection = ConnectionState::Disconnected;
            changed
        });
        metrics::record_connection_state(ConnectionState::Disconnected.gauge_code());
        tracing::info!(client_id = %self.client_id, "Live metrics client shut down");
    }

    /// Wait for the background driver to finish after [`shutdown`](Self::shutdown).
    pub async fn closed(&self) {
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(client_id = %self.client_id, error = %e, "Driver task failed");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_triggered()
    }

    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().connection
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.status.borrow().last_error.clone()
    }

    /// Receiver that observes every published status change.
    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> Arc<MetricsSnapshot> {
        self.shared.dispatcher.snapshot()
    }

    pub fn last_update_time(&self) -> Option<SystemTime> {
        self.snapshot().last_update_time
    }

    /// Register a callback run after every merged update, in subscription order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MetricsSnapshot) + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe(callback)
    }
}

impl Drop for LiveMetricsClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LiveMetricsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMetricsClient")
            .field("client_id", &self.client_id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}
