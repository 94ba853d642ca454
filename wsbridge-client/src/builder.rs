//! Bridge builder for configuring the transport and call policy
//!
//! The `BridgeBuilder` provides a fluent API for assembling a transport and
//! the call bridge on top of it. It allows you to:
//! - Pin the endpoint URL, or follow the process-wide one
//! - Set transport options and the reconnection strategy
//! - Set a per-call timeout
//! - Configure observability (OpenTelemetry)
//!
//! Building does not connect; call `bridge.transport().connect()` when ready.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wsbridge_client::{BridgeBuilder, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # fn example() -> wsbridge_core::Result<()> {
//! let bridge = BridgeBuilder::new()
//!     .endpoint("ws://127.0.0.1:8765/ws")
//!     .reconnect_strategy(ExponentialBackoff::default())
//!     .call_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! bridge.transport().connect()?;
//!
//! // With observability
//! let observed = BridgeBuilder::new()
//!     .with_default_observability()
//!     .service_name("my-page")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use wsbridge_core::{Error, ObservabilityConfig, Result};

use crate::bridge::CallBridge;
use crate::metrics::BridgeMetrics;
use crate::options::{TransportConfig, TransportOptions};
use crate::reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
use crate::transport::Transport;

/// Builder for configuring and creating a CallBridge
pub struct BridgeBuilder {
    endpoint: Option<String>,
    options: TransportOptions,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    call_timeout: Option<Duration>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            options: TransportOptions::default(),
            reconnect_strategy: None,
            call_timeout: None,
            observability_config: None,
            service_name: None,
            metrics: None,
        }
    }

    /// Connect to this URL instead of the process-wide endpoint
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Merge a partial options update
    pub fn options(mut self, config: TransportConfig) -> Self {
        self.options.apply(&config);
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.options
            .apply(&TransportConfig::new().reconnect_interval(interval));
        self
    }

    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .apply(&TransportConfig::new().subprotocols(protocols));
        self
    }

    /// Shape reconnect delays with `strategy` (default: fixed interval)
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self.options.auto_reconnect = true;
        self
    }

    /// Reconnect with default exponential backoff
    pub fn with_default_reconnect(self) -> Self {
        self.reconnect_strategy(ExponentialBackoff::default())
    }

    /// Disable automatic reconnection
    pub fn without_reconnect(mut self) -> Self {
        self.options.auto_reconnect = false;
        self.reconnect_strategy = None;
        self
    }

    /// Fail calls that see no reply within `timeout`
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Record into existing metrics instead of initializing observability
    pub fn with_metrics(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the transport and bridge
    ///
    /// With observability enabled this installs the global subscriber and
    /// providers, so it must run inside a tokio runtime.
    pub fn build(self) -> Result<CallBridge> {
        let metrics = match (self.metrics, self.observability_config) {
            (Some(metrics), _) => Some(metrics),
            (None, Some(mut config)) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }

                wsbridge_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;

                Some(Arc::new(BridgeMetrics::new(config.service_name)))
            }
            (None, None) => None,
        };

        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay));

        let transport = Transport::from_parts(self.endpoint, self.options, strategy, metrics);
        Ok(CallBridge::from_parts(transport, self.call_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_state::TransportState;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[test]
    fn test_builder_defaults() {
        let builder = BridgeBuilder::new();
        assert!(builder.endpoint.is_none());
        assert_eq!(builder.options, TransportOptions::default());
        assert!(builder.reconnect_strategy.is_none());
        assert!(builder.call_timeout.is_none());
        assert!(builder.observability_config.is_none());
    }

    #[test]
    fn test_builder_options() {
        let builder = BridgeBuilder::new()
            .endpoint("ws://127.0.0.1:9/ws")
            .reconnect_interval(Duration::from_millis(50))
            .subprotocols(["v1"])
            .options(TransportConfig::new().auto_reconnect(false))
            .call_timeout(Duration::from_secs(2));

        assert_eq!(builder.endpoint.as_deref(), Some("ws://127.0.0.1:9/ws"));
        assert_eq!(builder.options.reconnect_interval, Duration::from_millis(50));
        assert_eq!(builder.options.subprotocols, vec!["v1"]);
        assert!(!builder.options.auto_reconnect);
        assert_eq!(builder.call_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_reconnect_toggles() {
        let builder = BridgeBuilder::new().without_reconnect();
        assert!(!builder.options.auto_reconnect);

        let builder = builder.with_default_reconnect();
        assert!(builder.options.auto_reconnect);
        assert!(builder.reconnect_strategy.is_some());
    }

    #[test]
    fn test_build_does_not_connect() {
        let bridge = BridgeBuilder::new()
            .endpoint("ws://127.0.0.1:9/ws")
            .call_timeout(Duration::from_millis(250))
            .build()
            .unwrap();

        assert_eq!(bridge.transport().state(), TransportState::Idle);
        assert_eq!(bridge.call_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(
            bridge.transport().endpoint().as_deref(),
            Some("ws://127.0.0.1:9/ws")
        );
    }

    #[test]
    fn test_build_with_metrics() {
        let provider = SdkMeterProvider::builder().build();
        let metrics = Arc::new(BridgeMetrics::new_with_meter(&provider.meter("test")));

        let bridge = BridgeBuilder::new()
            .endpoint("ws://127.0.0.1:9/ws")
            .with_metrics(metrics)
            .build()
            .unwrap();
        assert!(bridge.transport().metrics().is_some());
    }

    #[test]
    fn test_observability_service_name() {
        let builder = BridgeBuilder::new()
            .with_default_observability()
            .service_name("page");
        assert!(builder.observability_config.is_some());
        assert_eq!(builder.service_name.as_deref(), Some("page"));
    }
}
