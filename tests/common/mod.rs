//! Shared utilities for integration testing: a scriptable WebSocket push server.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use live_metrics::client::{ClientStatus, LiveMetricsClient};

const WAIT: Duration = Duration::from_secs(10);

enum Action {
    Text(String),
    Ping(Vec<u8>),
    Close(u16, String),
}

/// Server side of one accepted connection. Dropping it kills the TCP stream
/// without a close handshake.
pub struct ServerConn {
    pub query: Option<String>,
    actions: mpsc::UnboundedSender<Action>,
    client_close: mpsc::UnboundedReceiver<Option<u16>>,
    pongs: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[allow(dead_code)]
impl ServerConn {
    pub fn send_text(&self, text: &str) {
        let _ = self.actions.send(Action::Text(text.to_string()));
    }

    pub fn send_metrics(&self, data: serde_json::Value) {
        let frame = serde_json::json!({ "type": "metric_updated", "data": data });
        self.send_text(&frame.to_string());
    }

    pub fn ping(&self, payload: &[u8]) {
        let _ = self.actions.send(Action::Ping(payload.to_vec()));
    }

    /// Next pong payload, `None` if nothing arrives within `within`.
    pub async fn next_pong(&mut self, within: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(within, self.pongs.recv()).await.ok().flatten()
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.actions.send(Action::Close(code, reason.to_string()));
    }

    /// Close code the client sent, `None` if the stream just ended.
    pub async fn client_close(&mut self) -> Option<u16> {
        tokio::time::timeout(WAIT, self.client_close.recv())
            .await
            .expect("client never closed")
            .flatten()
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub rejected: Arc<AtomicUsize>,
    connections: mpsc::UnboundedReceiver<ServerConn>,
}

#[allow(dead_code)]
impl MockServer {
    /// Start a server. With `required_token`, handshakes without a matching
    /// `token` query parameter are rejected with HTTP 401.
    pub async fn start(required_token: Option<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let rejected = Arc::new(AtomicUsize::new(0));
        let (conn_tx, connections) = mpsc::unbounded_channel();

        let rejected_count = Arc::clone(&rejected);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_tx = conn_tx.clone();
                let rejected = Arc::clone(&rejected_count);
                tokio::spawn(async move {
                    let mut query = None;
                    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        query = req.uri().query().map(str::to_string);
                        let authorized = match required_token {
                            Some(token) => query
                                .as_deref()
                                .is_some_and(|q| q.split('&').any(|pair| pair == format!("token={}", token))),
                            None => true,
                        };
                        if authorized {
                            Ok(resp)
                        } else {
                            let mut err = ErrorResponse::new(Some("unauthorized".to_string()));
                            *err.status_mut() = StatusCode::UNAUTHORIZED;
                            Err(err)
                        }
                    };
                    let mut ws = match accept_hdr_async(stream, callback).await {
                        Ok(ws) => ws,
                        Err(_) => {
                            rejected.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    };

                    let (actions, mut actions_rx) = mpsc::unbounded_channel();
                    let (close_tx, client_close) = mpsc::unbounded_channel();
                    let (pong_tx, pongs) = mpsc::unbounded_channel();
                    let _ = conn_tx.send(ServerConn {
                        query,
                        actions,
                        client_close,
                        pongs,
                    });

                    loop {
                        tokio::select! {
                            action = actions_rx.recv() => match action {
                                Some(Action::Text(text)) => {
                                    let _ = ws.send(Message::Text(text.into())).await;
                                }
                                Some(Action::Ping(payload)) => {
                                    let _ = ws.send(Message::Ping(payload.into())).await;
                                }
                                Some(Action::Close(code, reason)) => {
                                    let frame = CloseFrame {
                                        code: CloseCode::from(code),
                                        reason: reason.into(),
                                    };
                                    let _ = ws.send(Message::Close(Some(frame))).await;
                                    break;
                                }
                                // Handle dropped: kill the stream.
                                None => break,
                            },
                            msg = ws.next() => match msg {
                                Some(Ok(Message::Close(frame))) => {
                                    let _ = close_tx.send(frame.map(|f| u16::from(f.code)));
                                    break;
                                }
                                Some(Ok(Message::Pong(payload))) => {
                                    let _ = pong_tx.send(payload.to_vec());
                                }
                                Some(Ok(_)) => {}
                                _ => {
                                    let _ = close_tx.send(None);
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            rejected,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/metrics", self.addr)
    }

    pub async fn next_conn(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("no connection accepted")
            .expect("server stopped")
    }

    pub fn try_next_conn(&mut self) -> Option<ServerConn> {
        self.connections.try_recv().ok()
    }
}

/// Wait until the client's status satisfies `pred`.
#[allow(dead_code)]
pub async fn wait_for_status<F>(client: &LiveMetricsClient, mut pred: F) -> ClientStatus
where
    F: FnMut(&ClientStatus) -> bool,
{
    let mut rx = client.watch_status();
    let status = tokio::time::timeout(WAIT, rx.wait_for(|s| pred(s)))
        .await
        .expect("status never matched")
        .expect("status channel closed");
    status.clone()
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
