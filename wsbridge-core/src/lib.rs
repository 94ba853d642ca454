//! Core types for wsbridge
//!
//! This crate holds the transport-agnostic half of the bridge:
//!
//! - **Frames**: the request and reply shapes exchanged with the backend
//! - **Codec**: JSON encoding of requests and lenient decoding of replies
//! - **Payload**: normalization of arbitrary command arguments into JSON
//! - **Errors**: the error taxonomy shared by transport and call layers
//! - **Observability**: tracing subscriber and OpenTelemetry bootstrap
//!
//! The `wsbridge-client` crate layers the reconnecting transport and the
//! call bridge on top of these pieces.
//!
//! # Example
//!
//! ```rust
//! use wsbridge_core::{codec, Payload, RequestFrame};
//! use serde_json::json;
//!
//! let request = RequestFrame::new("ping", 1, 2, &json!({"n": 1}).into());
//! let text = codec::encode_request(&request).unwrap();
//!
//! let reply = codec::decode_reply(r#"{"result_id":1,"result":{"pong":1}}"#).unwrap();
//! assert_eq!(reply.result, Some(json!({"pong": 1})));
//! # let _ = (text, Payload::Null);
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod observability;
pub mod payload;

pub use error::{Error, Result};
pub use frame::{ReplyFrame, RequestFrame};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use payload::Payload;
