//! Outbound payload normalization
//!
//! Command arguments are not restricted to what JSON can express. A page may
//! hand over timestamps, filesystem paths, raw bytes, sets or maps keyed by
//! numbers. `Payload` models those values, and [`Payload::normalize`] folds
//! any of them into a JSON-safe `serde_json::Value`:
//!
//! | Input                       | Normalized form                    |
//! |-----------------------------|------------------------------------|
//! | null / unit / `None`        | `null`                             |
//! | string, finite number, bool | itself                             |
//! | date                        | ISO-8601 string (UTC, millis, `Z`) |
//! | path                        | its string form                    |
//! | bytes                       | standard base64 of the bytes       |
//! | list or set                 | array of normalized elements       |
//! | map                         | object; keys coerced to strings    |
//! | anything else               | its string form                    |
//!
//! Non-finite floats have no JSON representation and fall into the last row.
//!
//! Normalization is total on acyclic input and its output serializes to JSON
//! without further loss. It is applied to outbound payloads only; values
//! parsed from inbound JSON are already JSON-safe.
//!
//! # Examples
//!
//! ```rust
//! use wsbridge_core::Payload;
//! use serde_json::json;
//!
//! assert_eq!(Payload::bytes([1u8, 2, 3]).normalize(), json!("AQID"));
//!
//! let args: Payload = json!({"n": 1}).into();
//! assert_eq!(args.normalize(), json!({"n": 1}));
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;

/// A command argument before JSON normalization
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number, possibly non-finite
    Float(f64),
    /// Text
    String(String),
    /// Point in time
    Date(DateTime<Utc>),
    /// Filesystem path
    Path(PathBuf),
    /// Raw bytes, sent as base64
    Bytes(Vec<u8>),
    /// Ordered collection
    List(Vec<Payload>),
    /// Unordered collection, sent as an array
    Set(Vec<Payload>),
    /// Key/value mapping with arbitrary keys
    Map(Vec<(Payload, Payload)>),
    /// Opaque value, already reduced to its string form
    Other(String),
}

impl Payload {
    /// Wrap raw bytes
    pub fn bytes(bytes: impl AsRef<[u8]>) -> Self {
        Payload::Bytes(bytes.as_ref().to_vec())
    }

    /// Build a list from anything convertible into payloads
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Payload>,
    {
        Payload::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a map from key/value pairs
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Payload>,
        V: Into<Payload>,
    {
        Payload::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// An empty map, the argument substituted for absent call args
    pub fn empty_map() -> Self {
        Payload::Map(Vec::new())
    }

    /// Capture an opaque value through its `Display` form
    pub fn other(value: impl fmt::Display) -> Self {
        Payload::Other(value.to_string())
    }

    /// Convert any serializable value
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Whether this payload is absent
    pub fn is_nullish(&self) -> bool {
        matches!(self, Payload::Null)
    }

    /// Fold this payload into a JSON-safe value
    pub fn normalize(&self) -> Value {
        match self {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Int(n) => Value::Number((*n).into()),
            Payload::UInt(n) => Value::Number((*n).into()),
            Payload::Float(f) => match Number::from_f64(*f) {
                Some(n) => Value::Number(n),
                None => Value::String(f.to_string()),
            },
            Payload::String(s) => Value::String(s.clone()),
            Payload::Date(at) => Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Payload::Path(path) => Value::String(path.display().to_string()),
            Payload::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
            Payload::List(items) | Payload::Set(items) => {
                Value::Array(items.iter().map(Payload::normalize).collect())
            }
            Payload::Map(entries) => {
                let mut object = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    object.insert(key.key_string(), value.normalize());
                }
                Value::Object(object)
            }
            Payload::Other(s) => Value::String(s.clone()),
        }
    }

    /// String form of a map key
    fn key_string(&self) -> String {
        match self.normalize() {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Null
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.normalize().serialize(serializer)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Payload::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Payload::UInt(u)
                } else {
                    Payload::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::List(items.into_iter().map(Into::into).collect()),
            Value::Object(object) => Payload::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Payload::String(k), v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Null
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::Null, Into::into)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Payload {
            fn from(value: $t) -> Self {
                Payload::Int(value as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Payload {
            fn from(value: $t) -> Self {
                Payload::UInt(value as u64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u16, u32, u64, usize);

// u8 stays a number; byte buffers go through `Vec<u8>` or `&[u8]`.
impl From<u8> for Payload {
    fn from(value: u8) -> Self {
        Payload::UInt(value as u64)
    }
}

impl From<f32> for Payload {
    fn from(value: f32) -> Self {
        Payload::Float(value as f64)
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Float(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::String(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::String(value)
    }
}

impl From<char> for Payload {
    fn from(value: char) -> Self {
        Payload::String(value.to_string())
    }
}

impl<Tz: chrono::TimeZone> From<DateTime<Tz>> for Payload {
    fn from(value: DateTime<Tz>) -> Self {
        Payload::Date(value.with_timezone(&Utc))
    }
}

impl From<SystemTime> for Payload {
    fn from(value: SystemTime) -> Self {
        Payload::Date(value.into())
    }
}

impl From<PathBuf> for Payload {
    fn from(value: PathBuf) -> Self {
        Payload::Path(value)
    }
}

impl From<&Path> for Payload {
    fn from(value: &Path) -> Self {
        Payload::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(value.to_vec())
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(value: Vec<Payload>) -> Self {
        Payload::List(value)
    }
}

impl FromIterator<Payload> for Payload {
    fn from_iter<I: IntoIterator<Item = Payload>>(iter: I) -> Self {
        Payload::List(iter.into_iter().collect())
    }
}

impl<T: Into<Payload>> From<HashSet<T>> for Payload {
    fn from(value: HashSet<T>) -> Self {
        Payload::Set(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Payload>> From<BTreeSet<T>> for Payload {
    fn from(value: BTreeSet<T>) -> Self {
        Payload::Set(value.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<Payload>, V: Into<Payload>> From<HashMap<K, V>> for Payload {
    fn from(value: HashMap<K, V>) -> Self {
        Payload::map(value)
    }
}

impl<K: Into<Payload>, V: Into<Payload>> From<BTreeMap<K, V>> for Payload {
    fn from(value: BTreeMap<K, V>) -> Self {
        Payload::map(value)
    }
}
