//! Transport options and partial updates
//!
//! `TransportOptions` is the full policy a transport runs with. `configure`
//! applies a `TransportConfig`, a partial update in which every field is
//! optional: set fields replace the current value, unset fields keep it.
//!
//! # Loose Object Form
//!
//! Pages configure the transport with a plain object. [`TransportConfig::from_json`]
//! accepts that form and applies the same acceptance rules:
//!
//! - `subprotocols`: replaces when it is an array of strings
//! - `reconnectIntervalMs`: replaces when it is a positive integer
//! - `autoReconnect`: replaces when it is a boolean
//!
//! Keys with any other shape, and unknown keys, are ignored.
//!
//! ```rust
//! use wsbridge_client::{TransportConfig, TransportOptions};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let mut options = TransportOptions::default();
//! options.apply(&TransportConfig::from_json(&json!({"reconnectIntervalMs": 500, "color": "red"})));
//! assert_eq!(options.reconnect_interval, Duration::from_millis(500));
//! assert!(options.auto_reconnect);
//! ```

use serde_json::Value;
use std::time::Duration;

/// Default delay between a channel close and the next connect attempt
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Effective transport policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Subprotocols offered during the handshake, in preference order
    pub subprotocols: Vec<String>,
    /// Base delay before a reconnect attempt
    pub reconnect_interval: Duration,
    /// Whether `connect()` enables automatic reconnection
    pub auto_reconnect: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            subprotocols: Vec::new(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            auto_reconnect: true,
        }
    }
}

impl TransportOptions {
    /// Merge a partial update into these options
    pub fn apply(&mut self, config: &TransportConfig) {
        if let Some(subprotocols) = &config.subprotocols {
            self.subprotocols = subprotocols.clone();
        }
        if let Some(interval) = config.reconnect_interval {
            if !interval.is_zero() {
                self.reconnect_interval = interval;
            }
        }
        if let Some(auto_reconnect) = config.auto_reconnect {
            self.auto_reconnect = auto_reconnect;
        }
    }
}

/// Partial update for [`TransportOptions`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub subprotocols: Option<Vec<String>>,
    pub reconnect_interval: Option<Duration>,
    pub auto_reconnect: Option<bool>,
}

impl TransportConfig {
    /// An update that changes nothing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = Some(protocols.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the reconnect interval; a zero interval is ignored on apply
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    /// Whether applying this update changes nothing
    pub fn is_empty(&self) -> bool {
        self.subprotocols.is_none()
            && self.reconnect_interval.is_none()
            && self.auto_reconnect.is_none()
    }

    /// Read the loose object form used by pages
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let subprotocols = object.get("subprotocols").and_then(|v| {
            v.as_array()?
                .iter()
                .map(|p| p.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        });

        let reconnect_interval = object
            .get("reconnectIntervalMs")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let auto_reconnect = object.get("autoReconnect").and_then(Value::as_bool);

        Self {
            subprotocols,
            reconnect_interval,
            auto_reconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = TransportOptions::default();
        assert!(options.subprotocols.is_empty());
        assert_eq!(options.reconnect_interval, Duration::from_millis(3000));
        assert!(options.auto_reconnect);
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut options = TransportOptions {
            subprotocols: vec!["v1".into()],
            reconnect_interval: Duration::from_millis(42),
            auto_reconnect: false,
        };
        let before = options.clone();

        options.apply(&TransportConfig::new());
        assert_eq!(options, before);

        options.apply(&TransportConfig::from_json(&json!({})));
        assert_eq!(options, before);
    }

    #[test]
    fn test_subset_update_touches_only_named_fields() {
        let mut options = TransportOptions::default();
        options.apply(&TransportConfig::new().auto_reconnect(false));

        assert!(!options.auto_reconnect);
        assert_eq!(options.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
        assert!(options.subprotocols.is_empty());

        options.apply(&TransportConfig::new().subprotocols(["chat", "json"]));
        assert_eq!(options.subprotocols, vec!["chat", "json"]);
        assert!(!options.auto_reconnect);
    }

    #[test]
    fn test_zero_interval_ignored() {
        let mut options = TransportOptions::default();
        options.apply(&TransportConfig::new().reconnect_interval(Duration::ZERO));
        assert_eq!(options.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
    }

    #[test]
    fn test_from_json_accepts_valid_keys() {
        let config = TransportConfig::from_json(&json!({
            "subprotocols": ["a", "b"],
            "reconnectIntervalMs": 250,
            "autoReconnect": false,
        }));
        assert_eq!(config.subprotocols, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(config.reconnect_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.auto_reconnect, Some(false));
    }

    #[test]
    fn test_from_json_ignores_wrong_shapes() {
        let config = TransportConfig::from_json(&json!({
            "subprotocols": ["a", 1],
            "reconnectIntervalMs": -5,
            "autoReconnect": "yes",
            "unknown": true,
        }));
        assert!(config.is_empty());

        let config = TransportConfig::from_json(&json!({"reconnectIntervalMs": 0}));
        assert!(config.is_empty());

        assert!(TransportConfig::from_json(&json!("not an object")).is_empty());
    }
}
