//! Page-side WebSocket bridge to a local backend
//!
//! This crate connects a page to its backend over one long-lived WebSocket
//! and turns the channel into request/response calls. It has two layers:
//!
//! - **Transport**: owns the channel, fans its events out to listeners, and
//!   reopens it on a fixed interval (or a custom strategy) after loss
//! - **Call Bridge**: correlates each call with its reply through two random
//!   ids and settles every call at most once
//!
//! # Core Features
//!
//! - **Listener registry**: `open` / `message` / `error` / `close` events,
//!   delivered in registration order and preserved across reconnects
//! - **Auto-Reconnection**: unbounded attempts, fixed interval by default,
//!   exponential backoff on request
//! - **Payload normalization**: bytes, dates, paths, sets and maps become
//!   JSON-safe before they are sent
//! - **Failure policy**: `Disconnected` on channel close, optional per-call
//!   timeouts, eviction of abandoned calls
//! - **Observability**: structured `tracing` logs and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wsbridge_client::{BridgeBuilder, EventKind};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = BridgeBuilder::new()
//!         .endpoint(wsbridge_client::socket_url("127.0.0.1", 8765))
//!         .build()?;
//!
//!     let (opened_tx, opened_rx) = tokio::sync::oneshot::channel();
//!     let opened_tx = std::sync::Mutex::new(Some(opened_tx));
//!     bridge.transport().on_fn(EventKind::Open, move |_| {
//!         if let Some(tx) = opened_tx.lock().unwrap().take() {
//!             let _ = tx.send(());
//!         }
//!     });
//!
//!     bridge.transport().connect()?;
//!     opened_rx.await?;
//!
//!     let pong = bridge.invoke("ping", json!({"n": 1})).await?;
//!     println!("Result: {}", pong);
//!
//!     bridge.transport().close();
//!     Ok(())
//! }
//! ```

mod bridge;
mod builder;
mod channel;
mod connection_state;
mod endpoint;
mod listener;
mod metrics;
mod options;
mod pending;
mod reconnect;
mod transport;

pub use bridge::{CallBridge, PendingReply};
pub use builder::BridgeBuilder;
pub use connection_state::TransportState;
pub use endpoint::{
    clear_endpoint_url, endpoint_url, set_endpoint_url, socket_url, split_address,
    ENDPOINT_ENV_VAR,
};
pub use listener::{ChannelError, CloseEvent, EventKind, Listener, ListenerRegistry, TransportEvent};
pub use metrics::BridgeMetrics;
pub use options::{TransportConfig, TransportOptions, DEFAULT_RECONNECT_INTERVAL};
pub use pending::{CallIds, PendingCalls};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
pub use transport::Transport;
