//! One WebSocket channel
//!
//! Each `connect()` spawns one channel task. The task owns the socket for its
//! whole life: it performs the handshake, writes queued frames, reads
//! inbound frames, and runs the closing handshake. Everything it observes is
//! reported back to the transport tagged with the channel's generation, so
//! reports from a channel that has since been replaced are ignored.
//!
//! The task holds only a weak reference to the transport. Once every
//! `Transport` handle is gone, the outbound queue closes and the task shuts
//! the socket down with a normal closure.

use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wsbridge_core::{Error, Result};

use crate::listener::CloseEvent;
use crate::transport::TransportInner;

/// How long to wait for the peer to answer our close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const NORMAL_CLOSURE: u16 = 1000;
pub(crate) const NORMAL_CLOSURE_REASON: &str = "Normal Closure";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type SocketSink = futures::stream::SplitSink<Socket, Message>;
type SocketStream = futures::stream::SplitStream<Socket>;

/// Work queued for a channel task
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(String),
    Close { code: u16, reason: String },
}

/// The transport's handle on its live channel
pub(crate) struct ChannelHandle {
    pub(crate) outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelHandle {
    /// Queue a frame; fails once the task has exited
    pub(crate) fn queue(&self, item: Outbound) -> bool {
        self.outbound.send(item).is_ok()
    }
}

pub(crate) struct ChannelTarget {
    pub(crate) generation: u64,
    pub(crate) url: String,
    pub(crate) subprotocols: Vec<String>,
}

/// Spawn the task for a new channel and return its handle
pub(crate) fn spawn(transport: Weak<TransportInner>, target: ChannelTarget) -> Result<ChannelHandle> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| Error::Internal("connect() requires a running tokio runtime".to_string()))?;

    let (tx, rx) = mpsc::unbounded_channel();
    runtime.spawn(run(transport, target, rx));
    Ok(ChannelHandle { outbound: tx })
}

fn with_transport<R>(
    transport: &Weak<TransportInner>,
    f: impl FnOnce(&Arc<TransportInner>) -> R,
) -> Option<R> {
    transport.upgrade().map(|inner| f(&inner))
}

fn build_request(url: &str, subprotocols: &[String]) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| Error::WebSocket(e.to_string()))?;

    if !subprotocols.is_empty() {
        let offered = HeaderValue::from_str(&subprotocols.join(", "))
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", offered);
    }

    Ok(request)
}

fn close_event_from(frame: Option<CloseFrame<'_>>) -> CloseEvent {
    match frame {
        Some(frame) => CloseEvent {
            code: u16::from(frame.code),
            reason: frame.reason.into_owned(),
            was_clean: true,
        },
        // 1005: a close frame without a status code
        None => CloseEvent {
            code: 1005,
            reason: String::new(),
            was_clean: true,
        },
    }
}

async fn run(
    transport: Weak<TransportInner>,
    target: ChannelTarget,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let generation = target.generation;

    let handshake = match build_request(&target.url, &target.subprotocols) {
        Ok(request) => connect_async(request)
            .await
            .map_err(|e| Error::WebSocket(e.to_string())),
        Err(e) => Err(e),
    };

    let socket = match handshake {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::warn!(url = %target.url, error = %e, "Channel handshake failed");
            with_transport(&transport, |inner| {
                inner.on_error(generation, e.to_string());
                inner.on_close(generation, CloseEvent::abnormal(e.to_string()));
            });
            return;
        }
    };

    let Some(current) = with_transport(&transport, |inner| inner.on_open(generation)) else {
        return;
    };
    let (mut sink, mut stream) = socket.split();
    if !current {
        let _ = sink.close().await;
        return;
    }

    let mut remote_close: Option<CloseEvent> = None;

    let close_event = loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        with_transport(&transport, |inner| inner.on_error(generation, e.to_string()));
                        break CloseEvent::abnormal(e.to_string());
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    break close_gracefully(&mut sink, &mut stream, code, reason, &transport, generation).await;
                }
                None => {
                    break close_gracefully(
                        &mut sink,
                        &mut stream,
                        NORMAL_CLOSURE,
                        NORMAL_CLOSURE_REASON.to_string(),
                        &transport,
                        generation,
                    )
                    .await;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(frame))) => {
                    remote_close = Some(close_event_from(frame));
                }
                Some(Ok(message)) => deliver(&transport, generation, message),
                Some(Err(e)) => {
                    if let Some(event) = remote_close.take() {
                        break event;
                    }
                    with_transport(&transport, |inner| inner.on_error(generation, e.to_string()));
                    break CloseEvent::abnormal(e.to_string());
                }
                None => {
                    break remote_close
                        .take()
                        .unwrap_or_else(|| CloseEvent::abnormal("connection dropped"));
                }
            },
        }
    };

    with_transport(&transport, |inner| inner.on_close(generation, close_event));
}

/// Hand a data frame to the transport's `message` listeners
fn deliver(transport: &Weak<TransportInner>, generation: u64, message: Message) {
    match message {
        Message::Text(text) => {
            with_transport(transport, |inner| inner.on_message(generation, text));
        }
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => {
                with_transport(transport, |inner| inner.on_message(generation, text));
            }
            Err(_) => tracing::warn!("Dropping binary frame that is not valid UTF-8"),
        },
        // Ping/pong are answered by tungstenite itself.
        _ => {}
    }
}

/// Send our close frame and wait for the peer's answer
async fn close_gracefully(
    sink: &mut SocketSink,
    stream: &mut SocketStream,
    code: u16,
    reason: String,
    transport: &Weak<TransportInner>,
    generation: u64,
) -> CloseEvent {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.clone().into(),
    };

    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Close frame could not be sent");
        return CloseEvent {
            code,
            reason,
            was_clean: false,
        };
    }

    let echoed = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(incoming) = stream.next().await {
            match incoming {
                Ok(Message::Close(frame)) => return Some(close_event_from(frame)),
                Ok(message) => deliver(transport, generation, message),
                Err(_) => break,
            }
        }
        None
    })
    .await;

    match echoed {
        Ok(Some(event)) => event,
        _ => CloseEvent {
            code,
            reason,
            was_clean: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_offers_subprotocols() {
        let request = build_request(
            "ws://127.0.0.1:9/ws",
            &["chat".to_string(), "json".to_string()],
        )
        .unwrap();
        assert_eq!(
            request.headers().get("Sec-WebSocket-Protocol").unwrap(),
            "chat, json"
        );
    }

    #[test]
    fn test_request_without_subprotocols() {
        let request = build_request("ws://127.0.0.1:9/ws", &[]).unwrap();
        assert!(request.headers().get("Sec-WebSocket-Protocol").is_none());
    }

    #[test]
    fn test_request_rejects_bad_url() {
        assert!(matches!(
            build_request("not a url", &[]),
            Err(Error::WebSocket(_))
        ));
    }

    #[test]
    fn test_close_event_from_frame() {
        let event = close_event_from(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        }));
        assert_eq!(event.code, 1001);
        assert_eq!(event.reason, "bye");
        assert!(event.was_clean);

        assert_eq!(close_event_from(None).code, 1005);
    }
}
