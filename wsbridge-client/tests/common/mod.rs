//! Common test utilities for wsbridge-client integration tests
//!
//! This module provides a mock backend and helpers for exercising the
//! transport and call bridge against a real WebSocket peer.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use wsbridge_client::{BridgeBuilder, CallBridge, EventKind, Transport};

/// Replies to one inbound frame; every returned string is sent back
pub type Handler = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone)]
enum Control {
    Kick,
    Push(String),
}

/// Mock backend speaking the bridge's frame protocol
///
/// Records every inbound frame, answers through a pluggable handler, and
/// can close or push to every live connection.
pub struct MockBackend {
    addr: SocketAddr,
    control_tx: broadcast::Sender<Control>,
    shutdown_tx: mpsc::Sender<()>,
    frames_rx: mpsc::UnboundedReceiver<Value>,
    connections: Arc<AtomicUsize>,
}

impl MockBackend {
    /// A backend that never replies
    pub async fn silent() -> Self {
        Self::with_handler(|_| Vec::new()).await
    }

    /// A backend that answers `ping` with `{"pong": n}` and `boom` with the
    /// error `"nope"`; other commands echo their payload back as the result
    pub async fn standard() -> Self {
        Self::with_handler(|frame| {
            let cmd = frame["cmd"].as_str().unwrap_or_default();
            let result_id = frame["result_id"].as_u64().unwrap_or_default();
            let error_id = frame["error_id"].as_u64().unwrap_or_default();
            match cmd {
                "ping" => vec![result_reply(result_id, json!({"pong": frame["payload"]["n"]}))],
                "boom" => vec![error_reply(error_id, json!("nope"))],
                _ => vec![result_reply(result_id, frame["payload"].clone())],
            }
        })
        .await
    }

    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (control_tx, _) = broadcast::channel::<Control>(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<Value>();
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_control = control_tx.clone();
        let accept_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let handler = Arc::clone(&handler);
                        let frames_tx = frames_tx.clone();
                        let control_rx = accept_control.subscribe();
                        let connections = Arc::clone(&accept_connections);

                        tokio::spawn(async move {
                            let Ok(ws) = accept_async(stream).await else { return };
                            connections.fetch_add(1, Ordering::SeqCst);
                            serve(ws, handler, frames_tx, control_rx).await;
                        });
                    }
                }
            }
        });

        Self {
            addr,
            control_tx,
            shutdown_tx,
            frames_rx,
            connections,
        }
    }

    /// The socket URL in the bootstrap's `ws://host:port/ws` form
    pub fn url(&self) -> String {
        wsbridge_client::socket_url(&self.addr.ip().to_string(), self.addr.port())
    }

    /// Number of connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Close every live connection with code 1001
    pub fn kick(&self) {
        let _ = self.control_tx.send(Control::Kick);
    }

    /// Send a text frame to every live connection
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control_tx.send(Control::Push(text.into()));
    }

    /// Next recorded inbound frame, waiting up to five seconds
    pub async fn next_frame(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(5), self.frames_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Whether another inbound frame arrives within `within`
    pub async fn has_frame_within(&mut self, within: Duration) -> bool {
        matches!(
            tokio::time::timeout(within, self.frames_rx.recv()).await,
            Ok(Some(_))
        )
    }

    /// Stop accepting and close every live connection
    pub async fn shutdown(self) {
        self.kick();
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    handler: Handler,
    frames_tx: mpsc::UnboundedSender<Value>,
    mut control_rx: broadcast::Receiver<Control>,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            control = control_rx.recv() => match control {
                Ok(Control::Push(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Control::Kick) => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "kicked".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    // Let the client answer the close before dropping the socket
                    let _ = tokio::time::timeout(Duration::from_secs(1), async {
                        while let Some(Ok(_)) = read.next().await {}
                    })
                    .await;
                    break;
                }
                Err(_) => break,
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    let replies = handler(&frame);
                    let _ = frames_tx.send(frame);
                    for reply in replies {
                        if write.send(Message::Text(reply)).await.is_err() {
                            return;
                        }
                    }
                }
                // A close from the client is answered on the next read
                Some(Ok(_)) => {}
                None | Some(Err(_)) => break,
            },
        }
    }
}

/// A success reply frame
pub fn result_reply(result_id: u64, result: Value) -> String {
    json!({"result_id": result_id, "result": result}).to_string()
}

/// A failure reply frame
pub fn error_reply(error_id: u64, error: Value) -> String {
    json!({"error_id": error_id, "error": error}).to_string()
}

/// Poll `condition` every 10ms for up to five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Forward events of `kind` into a channel
pub fn event_channel(transport: &Transport, kind: EventKind) -> mpsc::UnboundedReceiver<wsbridge_client::TransportEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    transport.on_fn(kind, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Wait up to five seconds for the next event on `rx`
pub async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<wsbridge_client::TransportEvent>,
) -> Option<wsbridge_client::TransportEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Connect `transport` and wait for its `open` event
pub async fn connect_and_wait(transport: &Transport) {
    let mut opened = event_channel(transport, EventKind::Open);
    transport.connect().unwrap();
    next_event(&mut opened).await.expect("transport did not open");
}

/// A bridge on `url` with a short reconnect interval, connected and open
pub async fn open_bridge(url: &str) -> CallBridge {
    let bridge = BridgeBuilder::new()
        .endpoint(url)
        .reconnect_interval(Duration::from_millis(50))
        .build()
        .unwrap();
    connect_and_wait(bridge.transport()).await;
    bridge
}

/// A URL nothing is listening on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    wsbridge_client::socket_url("127.0.0.1", port)
}
