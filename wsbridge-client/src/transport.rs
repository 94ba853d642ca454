//! The page transport
//!
//! `Transport` owns at most one live WebSocket channel to the backend and
//! re-exposes its events through a listener registry. It survives channel
//! loss: when a channel closes while reconnection is enabled, a timer is
//! armed and a fresh channel is opened when it fires, with every registered
//! listener carried over unchanged.
//!
//! # Lifecycle
//!
//! 1. **Configure** (optional): `configure` merges a partial update into the
//!    options; it may be called at any time
//! 2. **Connect**: `connect` opens a channel to the endpoint URL and enables
//!    reconnection if the options allow it
//! 3. **Use**: `send` writes frames while the channel is open; listeners
//!    receive `open`, `message`, `error` and `close` events
//! 4. **Close**: `close` disables reconnection, cancels a pending retry, and
//!    closes the channel with a normal closure
//!
//! # Sending
//!
//! Frames are never buffered. `send` while the channel is not open logs a
//! warning, drops the frame and returns [`Error::SendWhileClosed`].
//!
//! # Cloning
//!
//! `Transport` is cheaply cloneable using `Arc` internally. All clones
//! share the same channel, options and listeners. Background tasks hold only
//! weak references, so dropping the last clone shuts the channel down.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wsbridge_client::{EventKind, Transport, TransportEvent};
//!
//! # async fn example() -> wsbridge_core::Result<()> {
//! let transport = Transport::with_endpoint("ws://127.0.0.1:8765/ws");
//!
//! transport.on_fn(EventKind::Message, |event| {
//!     if let TransportEvent::Message(text) = event {
//!         println!("frame: {text}");
//!     }
//! });
//!
//! transport.connect()?;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wsbridge_core::{codec, Error, Result};

use crate::channel::{self, ChannelHandle, ChannelTarget, Outbound, NORMAL_CLOSURE, NORMAL_CLOSURE_REASON};
use crate::connection_state::TransportState;
use crate::endpoint;
use crate::listener::{ChannelError, CloseEvent, EventKind, Listener, ListenerRegistry, TransportEvent};
use crate::metrics::BridgeMetrics;
use crate::options::{TransportConfig, TransportOptions};
use crate::reconnect::{FixedDelay, ReconnectionStrategy};

/// WebSocket transport with listener fan-out and automatic reconnection
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

pub(crate) struct TransportInner {
    /// Fixed endpoint; `None` reads the process-wide endpoint on each connect
    endpoint: Option<String>,
    listeners: ListenerRegistry,
    slot: Mutex<Slot>,
    metrics: Option<Arc<BridgeMetrics>>,
}

struct ReconnectTimer {
    token: u64,
    task: JoinHandle<()>,
}

/// Mutable transport state, guarded by one lock
struct Slot {
    state: TransportState,
    options: TransportOptions,
    strategy: Box<dyn ReconnectionStrategy>,
    should_reconnect: bool,
    channel: Option<ChannelHandle>,
    timer: Option<ReconnectTimer>,
    /// Incremented per channel; reports from older channels are ignored
    generation: u64,
    timer_token: u64,
    attempt: u32,
    /// The current channel was opened by the reconnect timer
    reconnecting: bool,
    /// Endpoint of a `connect()` made while closing, opened once closed
    deferred_connect: Option<String>,
}

impl Slot {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("Transport")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &slot.state)
            .field("options", &slot.options)
            .finish()
    }
}

impl Transport {
    /// A transport that connects to the process-wide endpoint URL
    pub fn new() -> Self {
        Self::from_parts(None, TransportOptions::default(), Box::new(FixedDelay), None)
    }

    /// A transport bound to a fixed endpoint URL
    pub fn with_endpoint(url: impl Into<String>) -> Self {
        Self::from_parts(
            Some(url.into()),
            TransportOptions::default(),
            Box::new(FixedDelay),
            None,
        )
    }

    pub(crate) fn from_parts(
        endpoint: Option<String>,
        options: TransportOptions,
        strategy: Box<dyn ReconnectionStrategy>,
        metrics: Option<Arc<BridgeMetrics>>,
    ) -> Self {
        if let Some(metrics) = &metrics {
            metrics.update_connection_state(TransportState::Idle);
        }

        Self {
            inner: Arc::new(TransportInner {
                endpoint,
                listeners: ListenerRegistry::new(),
                slot: Mutex::new(Slot {
                    state: TransportState::Idle,
                    options,
                    strategy,
                    should_reconnect: false,
                    channel: None,
                    timer: None,
                    generation: 0,
                    timer_token: 0,
                    attempt: 0,
                    reconnecting: false,
                    deferred_connect: None,
                }),
                metrics,
            }),
        }
    }

    /// Merge a partial update into the options
    ///
    /// Takes effect from the next connect attempt. Disabling `auto_reconnect`
    /// also cancels a pending reconnect; enabling it while a channel is live
    /// re-arms reconnection for that channel.
    pub fn configure(&self, config: &TransportConfig) {
        let mut slot = self.inner.slot.lock();
        slot.options.apply(config);

        match config.auto_reconnect {
            Some(false) => {
                slot.should_reconnect = false;
                slot.cancel_timer();
                if slot.state == TransportState::ClosedRetrying {
                    self.inner.set_state(&mut slot, TransportState::ClosedFinal);
                }
            }
            Some(true) => {
                if matches!(slot.state, TransportState::Connecting | TransportState::Open) {
                    slot.should_reconnect = true;
                }
            }
            None => {}
        }

        tracing::debug!(options = ?slot.options, "Transport configured");
    }

    /// [`configure`](Self::configure) with the loose object form pages use
    pub fn configure_json(&self, config: &Value) {
        self.configure(&TransportConfig::from_json(config));
    }

    /// Current options
    pub fn options(&self) -> TransportOptions {
        self.inner.slot.lock().options.clone()
    }

    /// Replace the reconnection strategy
    pub fn set_reconnection_strategy(&self, strategy: impl ReconnectionStrategy + 'static) {
        let mut slot = self.inner.slot.lock();
        slot.strategy = Box::new(strategy);
        slot.attempt = 0;
    }

    /// The endpoint URL the next connect would use
    pub fn endpoint(&self) -> Option<String> {
        self.inner.resolve_endpoint()
    }

    /// Open a channel to the endpoint
    ///
    /// Returns immediately; the `open` event reports when the channel is
    /// usable. Does nothing while a channel is already connecting or open.
    /// While closing, the new channel is opened after the old one has
    /// reported its `close` event.
    /// Fails with [`Error::NoEndpoint`] when no endpoint URL is available,
    /// leaving the state unchanged.
    #[tracing::instrument(skip(self))]
    pub fn connect(&self) -> Result<()> {
        let Some(url) = self.inner.resolve_endpoint() else {
            tracing::warn!("connect() called without an endpoint URL");
            self.inner.record_error(&Error::NoEndpoint);
            return Err(Error::NoEndpoint);
        };

        let mut slot = self.inner.slot.lock();
        if slot.state == TransportState::Closing {
            tracing::debug!("Channel still closing, connect deferred");
            slot.deferred_connect = Some(url);
            return Ok(());
        }
        if !slot.state.accepts_connect() {
            tracing::debug!(state = ?slot.state, "Channel already live, connect ignored");
            return Ok(());
        }

        slot.reconnecting = false;
        slot.attempt = 0;
        self.inner.open_channel(&mut slot, url)
    }

    /// Close the channel and disable reconnection
    ///
    /// Closes with code 1000. Idempotent.
    pub fn close(&self) {
        self.close_with(NORMAL_CLOSURE, NORMAL_CLOSURE_REASON);
    }

    /// Close the channel with a specific code and reason
    pub fn close_with(&self, code: u16, reason: impl Into<String>) {
        let mut slot = self.inner.slot.lock();
        slot.should_reconnect = false;
        slot.deferred_connect = None;
        slot.cancel_timer();

        match slot.state {
            TransportState::Connecting | TransportState::Open => {
                let reason = reason.into();
                tracing::info!(code, reason = %reason, "Closing channel");
                if let Some(channel) = &slot.channel {
                    channel.queue(Outbound::Close { code, reason });
                }
                self.inner.set_state(&mut slot, TransportState::Closing);
            }
            TransportState::ClosedRetrying => {
                tracing::info!("Pending reconnect cancelled");
                self.inner.set_state(&mut slot, TransportState::ClosedFinal);
            }
            _ => {}
        }
    }

    /// Serialize `value` and send it as one text frame
    pub fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = codec::encode(value)?;
        self.send_text(text)
    }

    /// Send one text frame as-is
    ///
    /// Fails with [`Error::SendWhileClosed`] unless the channel is open; the
    /// frame is dropped, never queued for later.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        {
            let slot = self.inner.slot.lock();
            if slot.state == TransportState::Open {
                if let Some(channel) = &slot.channel {
                    if channel.queue(Outbound::Frame(text.into())) {
                        return Ok(());
                    }
                }
            }
        }

        tracing::warn!("Dropping frame: channel is not open");
        self.inner.record_error(&Error::SendWhileClosed);
        Err(Error::SendWhileClosed)
    }

    /// Whether the channel is open
    pub fn is_connected(&self) -> bool {
        let slot = self.inner.slot.lock();
        slot.state == TransportState::Open && slot.channel.is_some()
    }

    /// Whether no channel exists
    pub fn is_disconnected(&self) -> bool {
        let slot = self.inner.slot.lock();
        slot.channel.is_none() || !slot.state.has_live_channel()
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransportState {
        self.inner.slot.lock().state
    }

    /// Register a listener for `kind`
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.inner.listeners.on(kind, listener);
    }

    /// Register a closure for `kind`, returning its handle for [`off`](Self::off)
    pub fn on_fn<F>(&self, kind: EventKind, f: F) -> Listener
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        let listener = Listener::new(f);
        self.on(kind, listener.clone());
        listener
    }

    /// Remove every registration of `listener` for `kind`
    pub fn off(&self, kind: EventKind, listener: &Listener) -> usize {
        self.inner.listeners.off(kind, listener)
    }

    /// Remove all listeners for `kind`
    pub fn off_all(&self, kind: EventKind) {
        self.inner.listeners.off_all(kind);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.listeners.count(kind)
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<BridgeMetrics>> {
        self.inner.metrics.as_ref()
    }
}

impl TransportInner {
    fn resolve_endpoint(&self) -> Option<String> {
        self.endpoint.clone().or_else(endpoint::endpoint_url)
    }

    fn set_state(&self, slot: &mut Slot, state: TransportState) {
        slot.state = state;
        if let Some(metrics) = &self.metrics {
            metrics.update_connection_state(state);
        }
    }

    fn record_error(&self, error: &Error) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(error.kind());
        }
    }

    fn open_channel(self: &Arc<Self>, slot: &mut Slot, url: String) -> Result<()> {
        slot.cancel_timer();
        slot.deferred_connect = None;

        let generation = slot.generation + 1;
        let target = ChannelTarget {
            generation,
            url: url.clone(),
            subprotocols: slot.options.subprotocols.clone(),
        };
        let channel = match channel::spawn(Arc::downgrade(self), target) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "Channel could not be started");
                return Err(e);
            }
        };

        slot.generation = generation;
        slot.should_reconnect = slot.options.auto_reconnect;
        slot.channel = Some(channel);
        self.set_state(slot, TransportState::Connecting);

        tracing::info!(url = %url, generation, "Opening channel");
        Ok(())
    }

    /// The channel completed its handshake
    ///
    /// Returns whether the channel is still the current one.
    pub(crate) fn on_open(&self, generation: u64) -> bool {
        let reconnected = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return false;
            }
            if slot.state != TransportState::Connecting {
                // close() won the race; the queued close frame follows
                return true;
            }
            self.set_state(&mut slot, TransportState::Open);
            slot.attempt = 0;
            slot.strategy.reset();
            std::mem::take(&mut slot.reconnecting)
        };

        if reconnected {
            tracing::info!("Reconnected successfully");
            if let Some(metrics) = &self.metrics {
                metrics.record_reconnection_success();
            }
        } else {
            tracing::info!("Channel open");
        }

        self.listeners.dispatch(&TransportEvent::Open);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().generation == generation
    }

    pub(crate) fn on_message(&self, generation: u64, text: String) {
        if self.is_current(generation) {
            self.listeners.dispatch(&TransportEvent::Message(text));
        }
    }

    pub(crate) fn on_error(&self, generation: u64, message: String) {
        if !self.is_current(generation) {
            return;
        }
        tracing::warn!(error = %message, "Channel error");
        self.record_error(&Error::WebSocket(message.clone()));
        self.listeners
            .dispatch(&TransportEvent::Error(ChannelError { message }));
    }

    /// The channel is gone
    ///
    /// Listeners run first, then a reconnect is armed if it is still wanted.
    pub(crate) fn on_close(self: &Arc<Self>, generation: u64, event: CloseEvent) {
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return;
            }
            slot.channel = None;
            self.set_state(&mut slot, TransportState::ClosedFinal);
        }

        tracing::info!(
            code = event.code,
            reason = %event.reason,
            was_clean = event.was_clean,
            "Channel closed"
        );
        self.listeners.dispatch(&TransportEvent::Close(event));

        let mut slot = self.slot.lock();
        // A listener may have reconnected or closed in the meantime.
        if slot.generation != generation || slot.state != TransportState::ClosedFinal {
            return;
        }
        if let Some(url) = slot.deferred_connect.take() {
            slot.reconnecting = false;
            slot.attempt = 0;
            if let Err(e) = self.open_channel(&mut slot, url) {
                tracing::error!(error = %e, "Deferred connect failed");
            }
            return;
        }
        if !(slot.should_reconnect && slot.options.auto_reconnect) {
            return;
        }

        let base = slot.options.reconnect_interval;
        let attempt = slot.attempt;
        let delay = slot.strategy.next_delay(attempt, base);
        slot.attempt = attempt.saturating_add(1);
        self.arm_reconnect(&mut slot, delay);

        tracing::info!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    fn arm_reconnect(self: &Arc<Self>, slot: &mut Slot, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No tokio runtime to schedule a reconnect on");
            return;
        };

        slot.timer_token += 1;
        let token = slot.timer_token;
        let transport = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = transport.upgrade() {
                inner.reconnect_due(token);
            }
        });

        slot.timer = Some(ReconnectTimer { token, task });
        self.set_state(slot, TransportState::ClosedRetrying);
    }

    fn reconnect_due(self: &Arc<Self>, token: u64) {
        let url = self.resolve_endpoint();

        let mut slot = self.slot.lock();
        if slot.timer.as_ref().map(|t| t.token) != Some(token) {
            return;
        }
        // Detach rather than abort: this is the timer task itself.
        slot.timer = None;

        if slot.state != TransportState::ClosedRetrying
            || !(slot.should_reconnect && slot.options.auto_reconnect)
        {
            return;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_reconnection_attempt();
        }

        let Some(url) = url else {
            tracing::warn!("Endpoint URL disappeared, giving up reconnecting");
            slot.should_reconnect = false;
            self.set_state(&mut slot, TransportState::ClosedFinal);
            return;
        };

        slot.reconnecting = true;
        if let Err(e) = self.open_channel(&mut slot, url) {
            tracing::warn!(error = %e, "Reconnect attempt failed");
            self.set_state(&mut slot, TransportState::ClosedFinal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unreachable_transport() -> Transport {
        // Port 9 (discard) is closed on test machines.
        Transport::with_endpoint("ws://127.0.0.1:9/ws")
    }

    #[test]
    fn test_new_transport_is_idle_and_disconnected() {
        let transport = unreachable_transport();
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(transport.is_disconnected());
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_send_while_idle_fails() {
        let transport = unreachable_transport();
        assert!(matches!(
            transport.send(&serde_json::json!({"cmd": "ping"})),
            Err(Error::SendWhileClosed)
        ));
        assert!(matches!(
            transport.send_text("raw"),
            Err(Error::SendWhileClosed)
        ));
    }

    #[test]
    fn test_close_is_idempotent_when_idle() {
        let transport = unreachable_transport();
        transport.close();
        transport.close();
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(transport.is_disconnected());
    }

    #[test]
    fn test_connect_outside_runtime_fails() {
        let transport = unreachable_transport();
        assert!(matches!(transport.connect(), Err(Error::Internal(_))));
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_configure_merges() {
        let transport = unreachable_transport();
        transport.configure(&TransportConfig::new().reconnect_interval(Duration::from_millis(10)));
        transport.configure_json(&serde_json::json!({"subprotocols": ["v2"]}));

        let options = transport.options();
        assert_eq!(options.reconnect_interval, Duration::from_millis(10));
        assert_eq!(options.subprotocols, vec!["v2"]);
        assert!(options.auto_reconnect);
    }

    #[test]
    fn test_endpoint_override() {
        let transport = unreachable_transport();
        assert_eq!(transport.endpoint().as_deref(), Some("ws://127.0.0.1:9/ws"));
    }

    #[test]
    fn test_listener_delegation() {
        let transport = unreachable_transport();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener = transport.on_fn(EventKind::Open, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        transport.on(EventKind::Open, listener.clone());
        assert_eq!(transport.listener_count(EventKind::Open), 2);

        transport.inner.listeners.dispatch(&TransportEvent::Open);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert_eq!(transport.off(EventKind::Open, &listener), 2);
        transport.off_all(EventKind::Close);
        assert_eq!(transport.listener_count(EventKind::Open), 0);
    }

    #[tokio::test]
    async fn test_refused_connect_reports_error_then_close() {
        let transport = unreachable_transport();
        transport.configure(&TransportConfig::new().auto_reconnect(false));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for kind in [EventKind::Open, EventKind::Error, EventKind::Close] {
            let tx = tx.clone();
            transport.on_fn(kind, move |event| {
                let _ = tx.send(event.kind());
            });
        }

        transport.connect().unwrap();
        assert_eq!(transport.state(), TransportState::Connecting);
        assert!(!transport.is_disconnected());

        assert_eq!(rx.recv().await, Some(EventKind::Error));
        assert_eq!(rx.recv().await, Some(EventKind::Close));
        assert_eq!(transport.state(), TransportState::ClosedFinal);
        assert!(transport.is_disconnected());
    }

    #[tokio::test]
    async fn test_close_cancels_pending_reconnect() {
        let transport = unreachable_transport();
        transport.configure(&TransportConfig::new().reconnect_interval(Duration::from_secs(60)));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        transport.on_fn(EventKind::Close, move |_| {
            let _ = tx.send(());
        });

        transport.connect().unwrap();
        rx.recv().await.unwrap();
        assert_eq!(transport.state(), TransportState::ClosedRetrying);

        transport.close();
        assert_eq!(transport.state(), TransportState::ClosedFinal);
        assert!(transport.inner.slot.lock().timer.is_none());
    }
}
