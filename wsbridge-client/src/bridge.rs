//! The call bridge
//!
//! `CallBridge` layers request/response calls on a [`Transport`]. Each call
//! is written as one request frame carrying two fresh correlation ids; the
//! backend answers with a reply frame naming one of them, and the bridge
//! routes that reply to the waiting caller.
//!
//! # Routing
//!
//! The bridge registers one `message` listener on the transport. For every
//! inbound frame:
//!
//! 1. Frames that are not JSON objects with an id are logged and dropped
//! 2. A `result_id` that is the result id of a live call settles it with
//!    `result`
//! 3. Otherwise an `error_id` that is the error id of a live call fails it
//!    with [`Error::Backend`] carrying `error`
//! 4. Anything else is dropped; the backend broadcasts replies to every
//!    page, so replies for other pages' calls are routine
//!
//! # Failure Policy
//!
//! - Calls made while the transport is not open fail with
//!   [`Error::NotConnected`] before anything is sent
//! - Every transport `close` event fails all pending calls with
//!   [`Error::Disconnected`]
//! - With a call timeout configured, a call that sees no reply in time fails
//!   with [`Error::Timeout`]. The deadline runs from `call()` whether or not
//!   the reply is being awaited, and a reply arriving after it is dropped
//! - Dropping a [`PendingReply`] abandons the call and frees its entry
//!
//! # Examples
//!
//! ```rust,no_run
//! use wsbridge_client::{CallBridge, Transport};
//! use serde_json::json;
//!
//! # async fn example() -> wsbridge_core::Result<()> {
//! let bridge = CallBridge::new(Transport::with_endpoint("ws://127.0.0.1:8765/ws"));
//! bridge.transport().connect()?;
//!
//! // ... once the transport reports `open`:
//! let pong = bridge.invoke("ping", json!({"n": 1})).await?;
//! println!("{pong}");
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wsbridge_core::{codec, Error, Payload, RequestFrame, Result};

use crate::listener::{EventKind, Listener, TransportEvent};
use crate::metrics::BridgeMetrics;
use crate::pending::{CallIds, Outcome, PendingCalls};
use crate::transport::Transport;

/// Request/response calls over a transport
#[derive(Clone)]
pub struct CallBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    transport: Transport,
    pending: PendingCalls,
    call_timeout: Option<Duration>,
    router: Listener,
    reaper: Listener,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.transport.off(EventKind::Message, &self.router);
        self.transport.off(EventKind::Close, &self.reaper);
    }
}

impl std::fmt::Debug for CallBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBridge")
            .field("transport", &self.inner.transport)
            .field("pending", &self.inner.pending.len())
            .field("call_timeout", &self.inner.call_timeout)
            .finish()
    }
}

impl CallBridge {
    /// Layer a bridge on `transport`; calls never time out
    pub fn new(transport: Transport) -> Self {
        Self::from_parts(transport, None)
    }

    /// Layer a bridge on `transport` with a per-call timeout
    pub fn with_call_timeout(transport: Transport, timeout: Duration) -> Self {
        Self::from_parts(transport, Some(timeout))
    }

    pub(crate) fn from_parts(transport: Transport, call_timeout: Option<Duration>) -> Self {
        let pending = PendingCalls::new();

        let router = {
            let pending = pending.clone();
            let metrics = transport.metrics().cloned();
            Listener::new(move |event| {
                if let TransportEvent::Message(text) = event {
                    route_reply(&pending, metrics.as_deref(), text);
                }
            })
        };

        let reaper = {
            let pending = pending.clone();
            Listener::new(move |_| {
                let rejected = pending.fail_all(Error::Disconnected);
                if rejected > 0 {
                    tracing::info!(count = rejected, "Channel closed, pending calls rejected");
                }
            })
        };

        transport.on(EventKind::Message, router.clone());
        transport.on(EventKind::Close, reaper.clone());

        Self {
            inner: Arc::new(BridgeInner {
                transport,
                pending,
                call_timeout,
                router,
                reaper,
            }),
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.inner.call_timeout
    }

    /// Number of calls awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Start a call and return its reply future
    ///
    /// Everything except waiting happens before this returns: the
    /// connection check, id allocation, registration and the send. A nullish
    /// `args` is sent as an empty object.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the transport is not open
    /// - [`Error::SendWhileClosed`] if the channel closed under the call
    /// - [`Error::Internal`] if a call timeout is set and there is no tokio
    ///   runtime to time it on
    #[tracing::instrument(skip(self, args), fields(cmd = %cmd))]
    pub fn call(&self, cmd: &str, args: impl Into<Payload>) -> Result<PendingReply> {
        let transport = &self.inner.transport;
        let metrics = transport.metrics().cloned();

        if !transport.is_connected() {
            tracing::debug!("Transport not open, call rejected");
            if let Some(metrics) = &metrics {
                metrics.record_call(cmd, Error::NotConnected.kind(), 0.0);
            }
            return Err(Error::NotConnected);
        }

        let runtime = Handle::try_current().ok();
        if self.inner.call_timeout.is_some() && runtime.is_none() {
            return Err(Error::Internal(
                "call timeout requires a tokio runtime".to_string(),
            ));
        }

        let pending = &self.inner.pending;
        let (ids, rx) = pending.register();
        let frame = RequestFrame::new(cmd, ids.result_id, ids.error_id, &args.into());

        if let Err(e) = codec::encode_request(&frame).and_then(|text| transport.send_text(text)) {
            pending.evict(ids.result_id);
            if let Some(metrics) = &metrics {
                metrics.record_call(cmd, e.kind(), 0.0);
            }
            return Err(e);
        }

        tracing::debug!(
            result_id = ids.result_id,
            error_id = ids.error_id,
            "Request sent, waiting for reply"
        );

        let deadline = match (self.inner.call_timeout, runtime) {
            (Some(timeout), Some(runtime)) => Some(spawn_deadline(
                &runtime,
                pending.clone(),
                ids.result_id,
                cmd.to_string(),
                timeout,
            )),
            _ => None,
        };

        Ok(PendingReply {
            ids,
            cmd: cmd.to_string(),
            rx,
            pending: pending.clone(),
            started: Instant::now(),
            deadline,
            metrics,
            done: false,
        })
    }

    /// Call `cmd` and wait for its reply
    pub async fn invoke(&self, cmd: &str, args: impl Into<Payload>) -> Result<Value> {
        self.call(cmd, args)?.await
    }

    /// Call `cmd` and deserialize its reply into `R`
    pub async fn invoke_as<R: DeserializeOwned>(
        &self,
        cmd: &str,
        args: impl Into<Payload>,
    ) -> Result<R> {
        let value = self.invoke(cmd, args).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Fail the call with [`Error::Timeout`] once `timeout` elapses
///
/// The entry is removed at expiry, so a late reply finds nothing to settle.
fn spawn_deadline(
    runtime: &Handle,
    pending: PendingCalls,
    result_id: u32,
    cmd: String,
    timeout: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        if pending.fail(result_id, Error::Timeout) {
            tracing::warn!(cmd = %cmd, timeout_ms = timeout.as_millis() as u64, "Call timed out");
        }
    })
}

/// Route one inbound frame to the call it answers
fn route_reply(pending: &PendingCalls, metrics: Option<&BridgeMetrics>, text: &str) {
    let reply = match codec::decode_reply(text) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed frame");
            if let Some(metrics) = metrics {
                metrics.record_dropped_frame("malformed");
            }
            return;
        }
    };

    if let Some(result_id) = reply.result_id {
        if pending.complete_result(result_id, reply.result.unwrap_or_default()) {
            tracing::debug!(result_id, "Reply routed");
            return;
        }
    }

    if let Some(error_id) = reply.error_id {
        if pending.complete_error(error_id, reply.error.unwrap_or_default()) {
            tracing::debug!(error_id, "Error reply routed");
            return;
        }
    }

    tracing::debug!(
        result_id = ?reply.result_id,
        error_id = ?reply.error_id,
        "Dropping reply for an unknown call"
    );
    if let Some(metrics) = metrics {
        metrics.record_dropped_frame("unknown_id");
    }
}

/// The eventual outcome of one call
///
/// Resolves to the backend's `result`, or fails with [`Error::Backend`],
/// [`Error::Disconnected`] or [`Error::Timeout`]. Dropping it before it
/// resolves abandons the call.
#[must_use = "a call's reply is lost unless its PendingReply is awaited"]
pub struct PendingReply {
    ids: CallIds,
    cmd: String,
    rx: oneshot::Receiver<Outcome>,
    pending: PendingCalls,
    started: Instant,
    /// Timer task failing the call at its deadline
    deadline: Option<JoinHandle<()>>,
    metrics: Option<Arc<BridgeMetrics>>,
    done: bool,
}

impl PendingReply {
    /// The correlation ids this call was sent with
    pub fn ids(&self) -> CallIds {
        self.ids
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn cancel_deadline(&mut self) {
        if let Some(task) = self.deadline.take() {
            task.abort();
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.done = true;
        self.cancel_deadline();
        let elapsed = self.started.elapsed().as_secs_f64();

        match &outcome {
            Ok(_) => {
                tracing::debug!(cmd = %self.cmd, duration_secs = elapsed, "Call completed");
            }
            Err(e) => {
                tracing::debug!(cmd = %self.cmd, error = %e, duration_secs = elapsed, "Call failed");
            }
        }

        if let Some(metrics) = &self.metrics {
            let status = match &outcome {
                Ok(_) => "success",
                Err(e) => e.kind(),
            };
            metrics.record_call(&self.cmd, status, elapsed);
        }

        outcome
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(Err(Error::Internal(
                "PendingReply polled after completion".to_string(),
            )));
        }

        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(received) => {
                // A dropped sender means the table went away with the bridge.
                let outcome = received.unwrap_or(Err(Error::Disconnected));
                Poll::Ready(this.finish(outcome))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.cancel_deadline();
        if !self.done && self.pending.evict(self.ids.result_id) {
            tracing::debug!(cmd = %self.cmd, "Pending call abandoned");
        }
    }
}
