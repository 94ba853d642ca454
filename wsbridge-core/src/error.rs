//! Error types for wsbridge
//!
//! A single `Error` enum covers both halves of the bridge:
//!
//! - **Transport anomalies**: `NoEndpoint`, `SendWhileClosed`, `WebSocket`,
//!   `MalformedFrame`. These are logged and surfaced to transport listeners;
//!   they never tear down the listener registry.
//! - **Call outcomes**: `NotConnected`, `Disconnected`, `Timeout`, `Backend`.
//!   These surface to the invoking caller as the failed outcome of a call.
//!
//! # Backend Errors
//!
//! The backend's `error` payload is opaque. It is carried verbatim in
//! `Error::Backend` so callers can inspect whatever shape their command
//! dispatcher produces.
//!
//! # Examples
//!
//! ```rust
//! use wsbridge_core::Error;
//! use serde_json::json;
//!
//! let error = Error::Backend(json!("nope"));
//! assert!(error.is_backend());
//! assert_eq!(error.backend_value(), Some(&json!("nope")));
//! ```

use thiserror::Error;

/// Result type for wsbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for wsbridge operations
///
/// The enum is `Clone` because a single transport failure (for example a
/// channel close) is delivered to every pending call at once.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// `connect()` was invoked while no endpoint URL is configured
    #[error("No endpoint URL configured")]
    NoEndpoint,

    /// A call was issued while the transport is not open
    #[error("Transport is not connected")]
    NotConnected,

    /// The channel closed while the call was waiting for its reply
    #[error("Channel closed before a reply arrived")]
    Disconnected,

    /// An inbound frame could not be parsed or carries no correlation id
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The backend answered the call through its error id
    ///
    /// The payload is forwarded exactly as received.
    #[error("Backend error: {0}")]
    Backend(serde_json::Value),

    /// `send()` was attempted outside the `Open` state; the frame was dropped
    #[error("Cannot send while the channel is not open")]
    SendWhileClosed,

    /// The call did not receive a reply within its deadline
    #[error("Call timed out")]
    Timeout,

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport layer error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// An endpoint address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error carries a backend-supplied payload
    pub fn is_backend(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// The backend payload, if this is a backend error
    pub fn backend_value(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Backend(value) => Some(value),
            _ => None,
        }
    }

    /// Short, stable label for this error's kind
    ///
    /// Used as a metric attribute and as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoEndpoint => "no_endpoint",
            Error::NotConnected => "not_connected",
            Error::Disconnected => "disconnected",
            Error::MalformedFrame(_) => "malformed_frame",
            Error::Backend(_) => "backend",
            Error::SendWhileClosed => "send_while_closed",
            Error::Timeout => "timeout",
            Error::Serialization(_) => "serialization",
            Error::WebSocket(_) => "websocket",
            Error::InvalidAddress(_) => "invalid_address",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
