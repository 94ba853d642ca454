//! Wire frames exchanged with the backend
//!
//! Every frame is one JSON text message. The client sends requests; the
//! backend answers each with exactly one reply.
//!
//! ```text
//! request: {"cmd": "<string>", "result_id": <u32>, "error_id": <u32>, "payload": <json>}
//! reply:   {"result_id": <u32>, "result": <json>}
//!      or  {"error_id": <u32>, "error": <json>}
//! ```
//!
//! # Two Ids Per Call
//!
//! A request carries two correlation ids. The backend picks which one to echo
//! depending on the outcome, so a reply routes without any tag field: the id
//! alone tells the client which continuation to run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::Payload;

/// Outbound command request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Command name understood by the backend dispatcher
    pub cmd: String,
    /// Id the backend echoes on success
    pub result_id: u32,
    /// Id the backend echoes on failure
    pub error_id: u32,
    /// Normalized command arguments
    pub payload: Value,
}

impl RequestFrame {
    /// Build a request, normalizing the payload
    ///
    /// A nullish payload is replaced by an empty object.
    pub fn new(cmd: impl Into<String>, result_id: u32, error_id: u32, payload: &Payload) -> Self {
        let payload = if payload.is_nullish() {
            Value::Object(Default::default())
        } else {
            payload.normalize()
        };
        Self {
            cmd: cmd.into(),
            result_id,
            error_id,
            payload,
        }
    }
}

/// Inbound reply as it appears on the wire
///
/// Every field is optional. Routing decides what a frame means.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ReplyFrame {
    /// A success reply
    pub fn success(result_id: u32, result: Value) -> Self {
        Self {
            result_id: Some(result_id),
            result: Some(result),
            ..Default::default()
        }
    }

    /// An error reply
    pub fn failure(error_id: u32, error: Value) -> Self {
        Self {
            error_id: Some(error_id),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Whether the frame names at least one correlation id
    pub fn has_id(&self) -> bool {
        self.result_id.is_some() || self.error_id.is_some()
    }
}
