//! Endpoint URL configuration
//!
//! The page bootstrap publishes one process-wide endpoint URL, which every
//! `connect()` reads afresh. It is set with [`set_endpoint_url`]; when it
//! is unset, the `WSBRIDGE_SOCKET_URL` environment variable is consulted.
//! A transport built with an explicit endpoint ignores both.
//!
//! The backend serves its socket at `ws://<host>:<port>/ws`; [`socket_url`]
//! and [`split_address`] build and validate that form.

use parking_lot::RwLock;
use wsbridge_core::{Error, Result};

/// Environment variable consulted when no endpoint URL is set
pub const ENDPOINT_ENV_VAR: &str = "WSBRIDGE_SOCKET_URL";

static ENDPOINT_URL: RwLock<Option<String>> = parking_lot::const_rwlock(None);

/// Publish the process-wide endpoint URL
pub fn set_endpoint_url(url: impl Into<String>) {
    *ENDPOINT_URL.write() = Some(url.into());
}

/// Forget the process-wide endpoint URL
pub fn clear_endpoint_url() {
    *ENDPOINT_URL.write() = None;
}

/// The process-wide endpoint URL, falling back to the environment
pub fn endpoint_url() -> Option<String> {
    if let Some(url) = ENDPOINT_URL.read().clone() {
        return Some(url);
    }
    std::env::var(ENDPOINT_ENV_VAR)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// The backend socket URL for a host and port
///
/// ```rust
/// assert_eq!(wsbridge_client::socket_url("127.0.0.1", 8765), "ws://127.0.0.1:8765/ws");
/// ```
pub fn socket_url(host: &str, port: u16) -> String {
    format!("ws://{}:{}/ws", host, port)
}

/// Split a `host:port` address
///
/// The split happens at the last colon, so bracketed IPv6 hosts keep their
/// inner colons.
pub fn split_address(address: &str) -> Result<(String, u16)> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(Error::InvalidAddress(format!(
            "{address:?}: expected 'host:port'"
        )));
    };

    if host.is_empty() {
        return Err(Error::InvalidAddress("host part must not be empty".to_string()));
    }
    if port.is_empty() {
        return Err(Error::InvalidAddress("port part must not be empty".to_string()));
    }

    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidAddress(format!("{port:?}: port must be 0-65535")))?;

    Ok((host.to_string(), port))
}
