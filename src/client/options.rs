//! Connection options and credentials.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gremlin_socket::{ConnectionOptions, Credentials};
//!
//! let options = ConnectionOptions::new()
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_credentials(Credentials::new("stephen", "password"))
//!     .without_ping();
//! assert!(options.ping_interval.is_none());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Error, Result};
use crate::protocol::Codec;

// ============================================================================
// Constants
// ============================================================================

/// Deadline applied to submissions that carry none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum requests registered on one connection at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

/// Frames buffered per request before the read loop has to wait.
pub const DEFAULT_SINK_CAPACITY: usize = 64;

/// How long the read loop waits on a full sink before giving up.
pub const DEFAULT_SINK_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Keepalive ping period.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Silence after which a connection is considered dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

// ============================================================================
// Credentials
// ============================================================================

/// Username/password for SASL PLAIN authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// SASL PLAIN token: base64 of `\0username\0password`.
    #[must_use]
    pub fn sasl_token(&self) -> String {
        let mut raw = Vec::with_capacity(2 + self.username.len() + self.password.len());
        raw.push(0);
        raw.extend_from_slice(self.username.as_bytes());
        raw.push(0);
        raw.extend_from_slice(self.password.as_bytes());
        BASE64.encode(raw)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Per-connection tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    /// Deadline for submissions made without an explicit one.
    pub request_timeout: Duration,

    /// Bound on establishing the WebSocket session.
    pub connect_timeout: Duration,

    /// Maximum requests in flight on the connection.
    pub max_in_flight: usize,

    /// Frames buffered per request.
    pub sink_capacity: usize,

    /// How long the read loop may block on a full sink.
    pub sink_send_timeout: Duration,

    /// Keepalive ping period (`None` disables pings).
    pub ping_interval: Option<Duration>,

    /// Inbound silence that closes the connection (`None` disables).
    pub idle_timeout: Option<Duration>,

    /// Credentials answered to 407 challenges.
    pub credentials: Option<Credentials>,

    /// Frame codec.
    pub codec: Codec,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            sink_send_timeout: DEFAULT_SINK_SEND_TIMEOUT,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            credentials: None,
            codec: Codec::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the default request deadline.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the handshake bound.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the in-flight request limit.
    #[inline]
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Sets the per-request frame buffer.
    #[inline]
    #[must_use]
    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    /// Sets how long the read loop may wait on a slow consumer.
    #[inline]
    #[must_use]
    pub fn with_sink_send_timeout(mut self, timeout: Duration) -> Self {
        self.sink_send_timeout = timeout;
        self
    }

    /// Sets the keepalive ping period.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    /// Disables keepalive pings.
    #[inline]
    #[must_use]
    pub fn without_ping(mut self) -> Self {
        self.ping_interval = None;
        self
    }

    /// Sets the idle bound.
    #[inline]
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Disables idle detection.
    #[inline]
    #[must_use]
    pub fn without_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Sets SASL credentials.
    #[inline]
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the frame codec.
    #[inline]
    #[must_use]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Checks option values for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero capacities, zero durations, or a
    /// ping period not shorter than the idle bound.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::config("max_in_flight must be at least 1"));
        }
        if self.sink_capacity == 0 {
            return Err(Error::config("sink_capacity must be at least 1"));
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::config("timeouts must be non-zero"));
        }
        if self.ping_interval.is_some_and(|p| p.is_zero()) {
            return Err(Error::config("ping_interval must be non-zero"));
        }
        if let (Some(ping), Some(idle)) = (self.ping_interval, self.idle_timeout)
            && ping >= idle
        {
            return Err(Error::config(format!(
                "ping_interval ({}ms) must be shorter than idle_timeout ({}ms)",
                ping.as_millis(),
                idle.as_millis()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::new();
        assert_eq!(options.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(options.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(options.ping_interval, Some(DEFAULT_PING_INTERVAL));
        assert!(options.credentials.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = ConnectionOptions::new()
            .with_sink_capacity(4)
            .with_idle_timeout(Duration::from_secs(5))
            .with_ping_interval(Duration::from_secs(1));

        assert_eq!(options.sink_capacity, 4);
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(5)));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_ping_must_be_shorter_than_idle() {
        let options = ConnectionOptions::new()
            .with_ping_interval(Duration::from_secs(10))
            .with_idle_timeout(Duration::from_secs(5));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ConnectionOptions::new().with_sink_capacity(0).validate().is_err());
        assert!(ConnectionOptions::new().with_max_in_flight(0).validate().is_err());
    }

    #[test]
    fn test_sasl_token() {
        let credentials = Credentials::new("stephen", "password");
        // base64("\0stephen\0password")
        assert_eq!(credentials.sasl_token(), "AHN0ZXBoZW4AcGFzc3dvcmQ=");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("user", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
