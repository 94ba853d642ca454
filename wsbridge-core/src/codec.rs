//! Codec for wire frames
//!
//! Encoding is plain serde. Decoding is deliberately lenient: the backend is
//! a separate process and may broadcast frames that are not replies at all,
//! so the decoder extracts what it can and reports anything it cannot route
//! as `Error::MalformedFrame`.
//!
//! # Decoding Rules
//!
//! - The text must parse as JSON, otherwise `MalformedFrame`
//! - The value must be an object, otherwise `MalformedFrame`
//! - `result_id` / `error_id` count only when they are integers in `u32`
//!   range; any other shape is treated as absent
//! - A frame with neither id is `MalformedFrame`
//! - A missing `result` or `error` body decodes as `null`
//!
//! # Examples
//!
//! ```rust
//! use wsbridge_core::{codec, RequestFrame, Payload};
//!
//! let request = RequestFrame::new("ping", 1, 2, &Payload::Null);
//! let text = codec::encode_request(&request).unwrap();
//! assert!(text.contains("\"cmd\":\"ping\""));
//!
//! let reply = codec::decode_reply(r#"{"result_id":1,"result":{"pong":1}}"#).unwrap();
//! assert_eq!(reply.result_id, Some(1));
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::frame::{ReplyFrame, RequestFrame};

/// Encode any serializable value to JSON text
pub fn encode<T: Serialize + ?Sized>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a request frame
pub fn encode_request(request: &RequestFrame) -> Result<String> {
    encode(request)
}

/// Decode an inbound text frame into a routable reply
pub fn decode_reply(data: &str) -> Result<ReplyFrame> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| Error::MalformedFrame(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(Error::MalformedFrame("frame is not a JSON object".to_string()));
    };

    let reply = ReplyFrame {
        result_id: object.get("result_id").and_then(as_correlation_id),
        error_id: object.get("error_id").and_then(as_correlation_id),
        result: Some(object.remove("result").unwrap_or(Value::Null)),
        error: Some(object.remove("error").unwrap_or(Value::Null)),
    };

    if !reply.has_id() {
        return Err(Error::MalformedFrame(
            "frame carries neither result_id nor error_id".to_string(),
        ));
    }

    Ok(reply)
}

fn as_correlation_id(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|id| u32::try_from(id).ok())
}
