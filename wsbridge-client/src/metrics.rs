//! Bridge metrics
//!
//! OpenTelemetry instruments describing transport health and call traffic.
//! They record into whatever meter provider is installed globally (see
//! `wsbridge_core::init_observability`), or into a caller-supplied meter.
//!
//! # Metrics Collected
//!
//! - **connection_state**: current transport state (gauge)
//! - **calls_total** / **call_duration**: calls by command and outcome
//! - **errors_total**: failures by error kind
//! - **reconnection_attempts** / **reconnection_success**: reconnect activity
//! - **frames_dropped**: inbound frames that routed to no pending call

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

use crate::connection_state::TransportState;

pub struct BridgeMetrics {
    /// Transport state (see `TransportState::metric_code`)
    pub connection_state: Gauge<i64>,
    pub calls_total: Counter<u64>,
    /// Call duration in seconds
    pub call_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
    pub frames_dropped: Counter<u64>,
}

impl BridgeMetrics {
    /// Instruments on the global meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("wsbridge.connection.state")
                .with_description("Transport state (0=idle, 1=connecting, 2=open, 3=closing, 4=closed-retrying, 5=closed-final)")
                .build(),
            calls_total: meter
                .u64_counter("wsbridge.calls.total")
                .with_description("Total number of calls issued")
                .build(),
            call_duration: meter
                .f64_histogram("wsbridge.call.duration")
                .with_description("Time from invoke to routed reply, in seconds")
                .build(),
            errors_total: meter
                .u64_counter("wsbridge.errors.total")
                .with_description("Total number of errors by kind")
                .build(),
            reconnection_attempts: meter
                .u64_counter("wsbridge.reconnection.attempts")
                .with_description("Total number of reconnect attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("wsbridge.reconnection.success")
                .with_description("Total number of reconnects that reached open")
                .build(),
            frames_dropped: meter
                .u64_counter("wsbridge.frames.dropped")
                .with_description("Inbound frames that matched no pending call")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: TransportState) {
        self.connection_state.record(state.metric_code(), &[]);
    }

    pub fn record_call(&self, cmd: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("cmd", cmd.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    pub fn record_dropped_frame(&self, reason: &str) {
        self.frames_dropped
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }
}
