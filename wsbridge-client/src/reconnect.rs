//! Reconnection strategies
//!
//! When a channel closes while reconnection is enabled, the transport arms a
//! timer and opens a fresh channel when it fires. The strategy decides how
//! long that timer runs. Attempts are unbounded: a strategy only shapes the
//! delay, it never gives up. Callers wanting a cap can watch the `close`
//! events and reconfigure or `close()` the transport themselves.
//!
//! # Built-in Strategies
//!
//! - **FixedDelay**: always the configured reconnect interval (default)
//! - **ExponentialBackoff**: the interval doubled per attempt, capped, with
//!   optional jitter
//!
//! # Examples
//!
//! ```rust
//! use wsbridge_client::{ExponentialBackoff, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(30));
//! let base = Duration::from_millis(100);
//! assert_eq!(backoff.next_delay(0, base), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(3, base), Duration::from_millis(800));
//! ```

use std::time::Duration;

/// Trait for reconnection strategies
///
/// `base` is the transport's current `reconnect_interval`, so a
/// `configure` call changes the delay of the next attempt even when a custom
/// strategy is installed.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before reconnect attempt number `attempt` (0-indexed)
    fn next_delay(&mut self, attempt: u32, base: Duration) -> Duration;

    /// Called when a channel opens successfully
    fn reset(&mut self) {}
}

/// Fixed-interval reconnection
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay;

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, _attempt: u32, base: Duration) -> Duration {
        base
    }
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_delay: Duration,
    jitter: bool,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Backoff doubling from the reconnect interval up to `max_delay`
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay,
            jitter: false,
            current_attempt: 0,
        }
    }

    /// Add a random 0-25% on top of each delay
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(30)).with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32, base: Duration) -> Duration {
        self.current_attempt = attempt;

        let base_ms = base.as_millis() as u64;
        let scaled = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        let delay = scaled.min(self.max_delay.as_millis() as u64);

        if self.jitter && delay >= 4 {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Duration::from_millis(delay + jitter_ms);
        }

        Duration::from_millis(delay)
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
