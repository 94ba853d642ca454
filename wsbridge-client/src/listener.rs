//! Transport events and the listener registry
//!
//! The transport fans every channel event out to the listeners registered
//! for its kind. There are four kinds, mirroring the channel primitive:
//!
//! - **open**: the channel completed its handshake
//! - **message**: a text frame arrived; the payload is the frame body
//! - **error**: the channel reported a failure
//! - **close**: the channel is gone; carries code, reason and cleanliness
//!
//! # Dispatch Rules
//!
//! - Listeners run in registration order
//! - Registering the same listener twice makes it run twice
//! - `off` removes every registration identity-equal to the given handle
//! - The registry lock is released before any listener runs, so a listener
//!   may register or remove listeners (including itself) while dispatching;
//!   such changes apply from the next event on
//!
//! # Examples
//!
//! ```rust
//! use wsbridge_client::{EventKind, Listener, ListenerRegistry, TransportEvent};
//!
//! let registry = ListenerRegistry::new();
//! let listener = Listener::new(|event| {
//!     if let TransportEvent::Message(text) = event {
//!         println!("frame: {text}");
//!     }
//! });
//!
//! registry.on(EventKind::Message, listener.clone());
//! registry.dispatch(&TransportEvent::Message("{}".into()));
//! registry.off(EventKind::Message, &listener);
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of transport event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Error,
    Close,
}

impl EventKind {
    /// Event name as pages spell it
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Message => "message",
            EventKind::Error => "error",
            EventKind::Close => "close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = wsbridge_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventKind::Open),
            "message" => Ok(EventKind::Message),
            "error" => Ok(EventKind::Error),
            "close" => Ok(EventKind::Close),
            other => Err(wsbridge_core::Error::Internal(format!(
                "unknown event name: {other}"
            ))),
        }
    }
}

/// Details of a channel close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code (1000 for a normal closure, 1006 when no close frame was seen)
    pub code: u16,
    /// Close reason, possibly empty
    pub reason: String,
    /// Whether the closing handshake completed
    pub was_clean: bool,
}

impl CloseEvent {
    /// Close without a closing handshake
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: 1006,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

/// Details of a channel failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelError {
    pub message: String,
}

/// An event delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(ChannelError),
    Close(CloseEvent),
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Open => EventKind::Open,
            TransportEvent::Message(_) => EventKind::Message,
            TransportEvent::Error(_) => EventKind::Error,
            TransportEvent::Close(_) => EventKind::Close,
        }
    }
}

type ListenerFn = dyn Fn(&TransportEvent) + Send + Sync;

/// A registered callback
///
/// Clones share identity: `off` with any clone removes the registration.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn call(&self, event: &TransportEvent) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

/// Mapping event kind → ordered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `kind`
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners.lock().entry(kind).or_default().push(listener);
    }

    /// Remove every registration of `listener` for `kind`
    ///
    /// Returns how many registrations were removed.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> usize {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(&kind) else {
            return 0;
        };
        let before = list.len();
        list.retain(|l| l != listener);
        before - list.len()
    }

    /// Remove all listeners for `kind`
    pub fn off_all(&self, kind: EventKind) {
        self.listeners.lock().remove(&kind);
    }

    /// Number of registrations for `kind`
    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke the listeners registered for the event's kind, in order
    pub fn dispatch(&self, event: &TransportEvent) {
        let snapshot = self
            .listeners
            .lock()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for listener in snapshot {
            listener.call(event);
        }
    }
}
