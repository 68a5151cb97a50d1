//! WebSocket transport backed by tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use url::Url;

use crate::transport::{CloseInfo, EventSink, Payload, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl Transport for TungsteniteTransport {
    fn open(&self, url: Url, sink: EventSink, close: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(run_connection(url, sink, close))
    }
}

fn handshake_close(err: &WsError) -> CloseInfo {
    match err {
        WsError::Http(response) => CloseInfo::rejected(response.status().as_u16(), err.to_string()),
        _ => CloseInfo::abnormal(err.to_string()),
    }
}

async fn run_connection(url: Url, sink: EventSink, mut close: oneshot::Receiver<()>) {
    let generation = sink.generation();
    tracing::debug!(generation, host = url.host_str().unwrap_or(""), "Opening push stream");

    let ws = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::debug!(generation, error = %e, "Handshake failed");
                sink.emit(TransportEvent::Error(e.to_string()));
                sink.emit(TransportEvent::Closed(handshake_close(&e)));
                return;
            }
        },
        _ = &mut close => {
            sink.emit(TransportEvent::Closed(CloseInfo::local()));
            return;
        }
    };

    if !sink.emit(TransportEvent::Opened) {
        return;
    }

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = &mut close => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Utf8Bytes::from_static("client shutdown"),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    tracing::debug!(generation, error = %e, "Close frame not delivered");
                }
                sink.emit(TransportEvent::Closed(CloseInfo::local()));
                return;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(TransportEvent::Frame(Payload::Text(text.as_str().to_owned()))) {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !sink.emit(TransportEvent::Frame(Payload::Binary(bytes.to_vec()))) {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let info = match frame {
                        Some(f) => CloseInfo::with_code(u16::from(f.code), f.reason.as_str()),
                        None => CloseInfo::abnormal("closed without a close frame"),
                    };
                    sink.emit(TransportEvent::Closed(info));
                    return;
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.emit(TransportEvent::Error(e.to_string()));
                    sink.emit(TransportEvent::Closed(CloseInfo::abnormal(e.to_string())));
                    return;
                }
                None => {
                    sink.emit(TransportEvent::Closed(CloseInfo::abnormal("stream ended")));
                    return;
                }
            }
        }
    }
}
