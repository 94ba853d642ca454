//! wsbridge - page-side WebSocket bridge
//!
//! This is the main convenience crate that re-exports the wsbridge
//! sub-crates and holds the process-wide default bridge that page code
//! reaches for.
//!
//! # Architecture
//!
//! wsbridge is organized into modular crates:
//!
//! - **wsbridge-core**: frames, codec, payload normalization, errors,
//!   observability
//! - **wsbridge-client**: the reconnecting transport and the call bridge
//!
//! # Default Bridge
//!
//! [`bridge()`] returns one lazily created [`CallBridge`] whose transport
//! follows the process-wide endpoint URL (see [`set_endpoint_url`]). Pages
//! typically publish the endpoint once, connect, and call [`invoke`] from
//! anywhere.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     wsbridge::set_endpoint_url(wsbridge::socket_url("127.0.0.1", 8765));
//!     wsbridge::transport().connect()?;
//!
//!     // ... once the transport reports `open`:
//!     let reply = wsbridge::invoke("ping", json!({"n": 1})).await?;
//!     println!("Result: {}", reply);
//!
//!     Ok(())
//! }
//! ```

use serde_json::Value;
use std::sync::OnceLock;

pub use wsbridge_client as client;
pub use wsbridge_core as core;

pub use wsbridge_client::{
    clear_endpoint_url, endpoint_url, set_endpoint_url, socket_url, split_address, BridgeBuilder,
    CallBridge, EventKind, Transport, TransportConfig, TransportEvent, TransportState,
};
pub use wsbridge_core::{Error, Payload, Result};

static DEFAULT_BRIDGE: OnceLock<CallBridge> = OnceLock::new();

/// The process-wide bridge, created on first use
pub fn bridge() -> &'static CallBridge {
    DEFAULT_BRIDGE.get_or_init(|| {
        tracing::debug!("Creating default bridge");
        CallBridge::new(Transport::new())
    })
}

/// The process-wide bridge's transport
pub fn transport() -> &'static Transport {
    bridge().transport()
}

/// Call `cmd` on the process-wide bridge
pub async fn invoke(cmd: &str, args: impl Into<Payload>) -> Result<Value> {
    bridge().invoke(cmd, args).await
}
