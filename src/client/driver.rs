//! Connection state machine.
//!
//! One task owns the breaker, the backoff and the live connection, and is the
//! only place connection transitions happen. Commands from the public handle,
//! transport events and the two timers are all consumed by a single `select!`
//! loop, so events are handled strictly in arrival order.

use std::future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use url::Url;
use uuid::Uuid;

use crate::client::endpoint::{build_url, redact};
use crate::client::state::{ClientError, ClientStatus, ConnectionState};
use crate::config::ClientConfig;
use crate::dispatch::{parse_binary_frame, parse_frame, Frame, UpdateDispatcher};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::{Backoff, CircuitBreaker, FailureKind};
use crate::transport::{classify_close, CloseInfo, EventSink, Payload, Transport, TransportEvent};

/// Requests from the public handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        endpoint: String,
        credential: Option<String>,
    },
}

/// State shared between the handle and the driver.
#[derive(Debug)]
pub(crate) struct Shared {
    pub shutdown: Shutdown,
    pub dispatcher: Arc<UpdateDispatcher>,
    pub status: watch::Sender<ClientStatus>,
    /// Close trigger for the live connection, fired synchronously by `shutdown()`.
    pub live_close: Mutex<Option<oneshot::Sender<()>>>,
}

impl Shared {
    pub fn new() -> Self {
        let (status, _) = watch::channel(ClientStatus::default());
        Self {
            shutdown: Shutdown::new(),
            dispatcher: Arc::new(UpdateDispatcher::new()),
            status,
            live_close: Mutex::new(None),
        }
    }

    /// Fire the live connection's close trigger, if any.
    pub fn close_live(&self) -> bool {
        let sender = self
            .live_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        sender.map_or(false, |tx| tx.send(()).is_ok())
    }

    fn arm_live_close(&self, tx: oneshot::Sender<()>) {
        let mut slot = self.live_close.lock().unwrap_or_else(PoisonError::into_inner);
        // shutdown() flips the flag before taking this lock.
        if self.shutdown.is_triggered() {
            let _ = tx.send(());
            return;
        }
        *slot = Some(tx);
    }
}

struct LiveConnection {
    task: JoinHandle<()>,
    /// An error event already recorded this connection's failure.
    error_seen: bool,
}

pub(crate) struct Driver {
    client_id: Uuid,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    breaker: CircuitBreaker,
    backoff: Backoff,
    state: ConnectionState,
    last_error: Option<ClientError>,
    target: Option<Url>,
    generation: u64,
    live: Option<LiveConnection>,
    retry_at: Option<Instant>,
    close_deadline: Option<Instant>,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown_rx: broadcast::Receiver<()>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => future::pending().await,
    }
}

impl Driver {
    pub fn new(
        client_id: Uuid,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        backoff: Backoff,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown_rx = shared.shutdown.subscribe();
        let breaker = CircuitBreaker::new(&config.breaker);
        Self {
            client_id,
            config,
            transport,
            shared,
            breaker,
            backoff,
            state: ConnectionState::Disconnected,
            last_error: None,
            target: None,
            generation: 0,
            live: None,
            retry_at: None,
            close_deadline: None,
            events_tx,
            events_rx,
            commands,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        self.publish();
        tracing::debug!(client_id = %self.client_id, "Live metrics driver started");

        loop {
            if self.shared.shutdown.is_triggered() {
                break;
            }
            let retry_at = self.retry_at;
            let close_deadline = self.close_deadline;

            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    // Every handle is gone.
                    None => break,
                },
                Some((generation, event)) = self.events_rx.recv() => {
                    self.handle_event(generation, event);
                }
                _ = sleep_until_opt(close_deadline) => self.handle_missing_close(),
                _ = sleep_until_opt(retry_at) => {
                    self.retry_at = None;
                    self.attempt();
                }
            }

            self.publish();
        }

        self.teardown().await;
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { endpoint, credential } => {
                self.drop_live();
                self.retry_at = None;
                self.close_deadline = None;

                let url = match build_url(&endpoint, credential.as_deref(), &self.config.credential_param) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::error!(client_id = %self.client_id, error = %e, "Rejecting endpoint");
                        self.target = None;
                        self.last_error = Some(e);
                        self.set_state(ConnectionState::Failed);
                        return;
                    }
                };

                tracing::info!(
                    client_id = %self.client_id,
                    endpoint = %redact(&url, &self.config.credential_param),
                    "Connect requested"
                );
                self.backoff.reset();
                self.breaker.clear_auth_lock();
                self.last_error = None;
                self.target = Some(url);
                self.attempt();
            }
        }
    }

    /// One connection attempt, gated by the retry budget and the breaker.
    fn attempt(&mut self) {
        if self.shared.shutdown.is_triggered() || self.live.is_some() {
            return;
        }
        let Some(url) = self.target.clone() else {
            return;
        };

        let max_retries = self.config.reconnect.max_retries;
        if self.backoff.attempts() >= max_retries {
            self.exhaust();
            return;
        }

        if !self.breaker.may_attempt() {
            let recheck = self.backoff.current_delay();
            tracing::warn!(
                client_id = %self.client_id,
                recheck_ms = recheck.as_millis() as u64,
                failure_count = self.breaker.state().failure_count,
                "Circuit breaker open, attempt suppressed"
            );
            if !self.breaker.state().auth_locked {
                self.retry_at = Some(Instant::now() + recheck);
            }
            self.last_error = Some(ClientError::CircuitOpen { retry_in: recheck });
            self.set_state(ConnectionState::Failed);
            return;
        }

        self.set_state(ConnectionState::Connecting);
        metrics::record_connection_attempt();

        self.generation += 1;
        let (close_tx, close_rx) = oneshot::channel();
        self.shared.arm_live_close(close_tx);
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        let task = self.transport.open(url, sink, close_rx);
        self.live = Some(LiveConnection {
            task,
            error_seen: false,
        });

        tracing::debug!(
            client_id = %self.client_id,
            generation = self.generation,
            attempt = self.backoff.attempts() + 1,
            "Connection attempt started"
        );
    }

    fn handle_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.live.is_none() {
            tracing::trace!(client_id = %self.client_id, generation, "Ignoring event from a stale connection");
            return;
        }

        match event {
            TransportEvent::Opened => {
                self.breaker.record_success();
                self.backoff.reset();
                self.last_error = None;
                self.set_state(ConnectionState::Connected);
            }
            TransportEvent::Frame(payload) => self.dispatch_frame(payload),
            TransportEvent::Error(message) => self.handle_error(message),
            TransportEvent::Closed(info) => self.handle_close(info),
        }
    }

    fn dispatch_frame(&mut self, payload: Payload) {
        if self.shared.shutdown.is_triggered() {
            return;
        }
        let parsed = match &payload {
            Payload::Text(text) => parse_frame(text),
            Payload::Binary(bytes) => parse_binary_frame(bytes),
        };
        match parsed {
            Ok(Frame::MetricUpdated(data)) => {
                let keys = data.len();
                self.shared.dispatcher.merge(data);
                metrics::record_frame("merged");
                tracing::trace!(client_id = %self.client_id, keys, "Merged metric update");
            }
            Ok(Frame::Other(kind)) => {
                metrics::record_frame("ignored");
                tracing::trace!(client_id = %self.client_id, kind = %kind, "Ignoring frame");
            }
            Err(e) => {
                metrics::record_frame("malformed");
                tracing::warn!(client_id = %self.client_id, error = %e, "Dropping malformed frame");
            }
        }
    }

    fn handle_error(&mut self, message: String) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        tracing::warn!(client_id = %self.client_id, error = %message, "Push stream error");

        if !live.error_seen {
            live.error_seen = true;
            self.breaker.record_failure(FailureKind::Network);
            metrics::record_connection_failure(FailureKind::Network.as_str());
        }
        self.last_error = Some(ClientError::Transport(message));
        self.set_state(ConnectionState::Disconnected);
        // The close event normally follows; scheduling waits for it.
        self.close_deadline = Some(Instant::now() + self.config.transport.close_grace());
    }

    /// An error was never followed by a close: force the close-equivalent path.
    fn handle_missing_close(&mut self) {
        self.close_deadline = None;
        let Some(live) = self.live.as_ref() else {
            return;
        };
        tracing::warn!(
            client_id = %self.client_id,
            generation = self.generation,
            "No close event after transport error, forcing close"
        );
        live.task.abort();
        self.shared.close_live();
        self.handle_close(CloseInfo::abnormal("no close event after transport error"));
    }

    fn handle_close(&mut self, info: CloseInfo) {
        self.close_deadline = None;
        let Some(live) = self.live.take() else {
            return;
        };
        self.shared.live_close.lock().unwrap_or_else(PoisonError::into_inner).take();

        if info.initiated_locally {
            tracing::debug!(client_id = %self.client_id, "Push stream closed by client");
            if self.state != ConnectionState::Failed {
                self.set_state(ConnectionState::Disconnected);
            }
            return;
        }

        let kind = classify_close(&info, &self.config.auth.close_codes);
        if kind == FailureKind::Auth {
            self.breaker.record_failure(FailureKind::Auth);
            metrics::record_connection_failure(kind.as_str());
            self.retry_at = None;
            let detail = match (info.http_status, info.code) {
                (Some(status), _) => format!("HTTP {}", status),
                (None, Some(code)) if info.reason.is_empty() => format!("close code {}", code),
                (None, Some(code)) => format!("close code {}: {}", code, info.reason),
                (None, None) => info.reason.clone(),
            };
            tracing::error!(
                client_id = %self.client_id,
                detail = %detail,
                "Authorization rejected; not retrying"
            );
            self.last_error = Some(ClientError::AuthRejected { detail });
            self.set_state(ConnectionState::Failed);
            return;
        }

        if !live.error_seen {
            self.breaker.record_failure(kind);
            metrics::record_connection_failure(kind.as_str());
        }

        let delay = self.backoff.next_delay();
        let attempts = self.backoff.attempts();
        if attempts >= self.config.reconnect.max_retries {
            self.exhaust();
            return;
        }

        // Keep the error event's message when there was one.
        if !live.error_seen {
            self.last_error = Some(ClientError::Transport(describe_close(&info)));
        }
        self.set_state(ConnectionState::Disconnected);
        self.retry_at = Some(Instant::now() + delay);
        tracing::warn!(
            client_id = %self.client_id,
            kind = %kind,
            code = ?info.code,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            breaker = %self.breaker.phase(),
            "Push stream closed, reconnect scheduled"
        );
    }

    fn exhaust(&mut self) {
        let attempts = self.backoff.attempts();
        tracing::error!(client_id = %self.client_id, attempts, "Retry budget exhausted; giving up");
        self.retry_at = None;
        self.last_error = Some(ClientError::RetryBudgetExhausted { attempts });
        self.set_state(ConnectionState::Failed);
    }

    /// Close the live connection without treating it as a failure.
    fn drop_live(&mut self) {
        if self.live.take().is_some() {
            self.shared.close_live();
        }
        self.close_deadline = None;
    }

    fn set_state(&mut self, to: ConnectionState) {
        if self.state == to || self.shared.shutdown.is_triggered() {
            return;
        }
        tracing::info!(client_id = %self.client_id, from = %self.state, to = %to, "Connection state changed");
        self.state = to;
        metrics::record_connection_state(to.gauge_code());
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            connection: self.state,
            breaker: self.breaker.state(),
            backoff: self.backoff.state(),
            last_error: self.last_error.clone(),
        }
    }

    /// Publish the current status unless shutdown has already frozen it.
    fn publish(&self) {
        let next = self.status();
        let shutdown = &self.shared.shutdown;
        self.shared.status.send_if_modified(|current| {
            if shutdown.is_triggered() || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    async fn teardown(&mut self) {
        self.retry_at = None;
        self.close_deadline = None;
        self.shared.close_live();
        if let Some(mut live) = self.live.take() {
            let grace = self.config.transport.close_grace();
            if tokio::time::timeout(grace, &mut live.task).await.is_err() {
                live.task.abort();
            }
        }
        tracing::info!(client_id = %self.client_id, "Live metrics client stopped");
    }
}

fn describe_close(info: &CloseInfo) -> String {
    match (info.http_status, info.code) {
        (Some(status), _) => format!("handshake rejected with HTTP {}", status),
        (None, Some(code)) if info.reason.is_empty() => format!("closed with code {}", code),
        (None, Some(code)) => format!("closed with code {} ({})", code, info.reason),
        (None, None) if info.reason.is_empty() => "connection lost".to_string(),
        (None, None) => info.reason.clone(),
    }
}
