//! Transport state machine
//!
//! # States
//!
//! - **Idle**: never connected
//! - **Connecting**: a channel is performing its handshake
//! - **Open**: the channel is usable; `send` writes frames
//! - **Closing**: `close()` was requested; waiting for the channel to finish.
//!   A `connect()` here is held until the channel has closed
//! - **ClosedRetrying**: the channel closed and a reconnect timer is armed
//! - **ClosedFinal**: the channel closed and nothing will reopen it until an
//!   explicit `connect()`
//!
//! # Transitions
//!
//! ```text
//! Idle ──connect──► Connecting ──open──► Open ──close()──► Closing
//!                     │   ▲                │                 │
//!                close│   │timer      close│            close│
//!                     ▼   │                ▼                 ▼
//!               ClosedRetrying ◄──────(retry?)──────► ClosedFinal
//!                                                        │
//!                                     connect() ─────────┘
//! ```

/// Lifecycle state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    ClosedRetrying,
    ClosedFinal,
}

impl TransportState {
    /// Whether a channel exists and has not finished closing
    pub fn has_live_channel(&self) -> bool {
        matches!(
            self,
            TransportState::Connecting | TransportState::Open | TransportState::Closing
        )
    }

    /// Whether no channel exists at all
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TransportState::Idle | TransportState::ClosedRetrying | TransportState::ClosedFinal
        )
    }

    /// Whether `connect()` may open a new channel from this state
    pub fn accepts_connect(&self) -> bool {
        self.is_closed()
    }

    /// Numeric code for the connection-state gauge
    pub fn metric_code(&self) -> i64 {
        match self {
            TransportState::Idle => 0,
            TransportState::Connecting => 1,
            TransportState::Open => 2,
            TransportState::Closing => 3,
            TransportState::ClosedRetrying => 4,
            TransportState::ClosedFinal => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(TransportState::default(), TransportState::Idle);
    }

    #[test]
    fn test_live_and_closed_are_disjoint() {
        for state in [
            TransportState::Idle,
            TransportState::Connecting,
            TransportState::Open,
            TransportState::Closing,
            TransportState::ClosedRetrying,
            TransportState::ClosedFinal,
        ] {
            assert_ne!(state.has_live_channel(), state.is_closed(), "{state:?}");
        }
    }

    #[test]
    fn test_connect_gating() {
        assert!(TransportState::Idle.accepts_connect());
        assert!(TransportState::ClosedRetrying.accepts_connect());
        assert!(TransportState::ClosedFinal.accepts_connect());
        assert!(!TransportState::Closing.accepts_connect());
        assert!(!TransportState::Connecting.accepts_connect());
        assert!(!TransportState::Open.accepts_connect());
    }
}
