//! Builder pattern for pool configuration.
//!
//! Provides a fluent API for configuring and connecting a
//! [`ConnectionPool`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gremlin_socket::{ConnectionOptions, ConnectionPool};
//!
//! # async fn example() -> gremlin_socket::Result<()> {
//! let pool = ConnectionPool::builder()
//!     .url("ws://localhost:8182/gremlin")
//!     .size(8)
//!     .options(ConnectionOptions::new().with_request_timeout(Duration::from_secs(5)))
//!     .build()
//!     .await?;
//! # pool.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identifiers::{IdGenerator, UuidGenerator};
use crate::transport::{ConnectionPool, PoolConfig};

use super::options::ConnectionOptions;

// ============================================================================
// PoolBuilder
// ============================================================================

/// Builder for configuring a [`ConnectionPool`].
///
/// Use [`ConnectionPool::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct PoolBuilder {
    /// Server endpoint.
    url: Option<String>,
    /// Per-member options.
    options: ConnectionOptions,
    /// Sizing and replacement policy.
    config: PoolConfig,
    /// Request-id source for `execute*` calls.
    id_generator: Option<Arc<dyn IdGenerator>>,
}

// ============================================================================
// PoolBuilder Implementation
// ============================================================================

impl PoolBuilder {
    /// Creates a builder with default settings and no URL.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the number of members.
    #[inline]
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.config.size = size;
        self
    }

    /// Sets the options every member connects with.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables replacement of dead members.
    #[inline]
    #[must_use]
    pub fn replace_dead(mut self, enabled: bool) -> Self {
        self.config.replace_dead = enabled;
        self
    }

    /// Sets the first replacement backoff delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Sets the backoff ceiling.
    #[inline]
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay = delay;
        self
    }

    /// Limits replacement attempts per dead member (`None` for unlimited).
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the request-id generator used by the `execute*` calls.
    #[inline]
    #[must_use]
    pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Validates the configuration and connects every member.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing or settings are inconsistent
    /// - [`Error::InvalidUrl`] if the URL does not parse
    /// - Any connect error from a member
    pub async fn build(self) -> Result<Arc<ConnectionPool>> {
        let url = self.validate_url()?;
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UuidGenerator));
        ConnectionPool::connect_with_generator(&url, self.options, self.config, id_generator).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl PoolBuilder {
    /// Validates the URL configuration.
    fn validate_url(&self) -> Result<String> {
        self.url.clone().ok_or_else(|| {
            Error::config(
                "Server URL is required. Use .url() to set it.\n\
                 Example: ConnectionPool::builder().url(\"ws://localhost:8182/gremlin\")",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::pool::DEFAULT_POOL_SIZE;

    #[test]
    fn test_new_uses_defaults() {
        let builder = PoolBuilder::new();
        assert!(builder.url.is_none());
        assert_eq!(builder.config.size, DEFAULT_POOL_SIZE);
        assert!(builder.config.replace_dead);
    }

    #[test]
    fn test_setters() {
        let builder = PoolBuilder::new()
            .url("ws://localhost:8182/gremlin")
            .size(2)
            .replace_dead(false)
            .reconnect_delay(Duration::from_millis(5))
            .max_reconnect_delay(Duration::from_millis(20))
            .max_reconnect_attempts(None);

        assert_eq!(builder.url.as_deref(), Some("ws://localhost:8182/gremlin"));
        assert_eq!(builder.config.size, 2);
        assert!(!builder.config.replace_dead);
        assert_eq!(builder.config.max_reconnect_attempts, None);
    }

    #[tokio::test]
    async fn test_build_without_url_fails() {
        let err = PoolBuilder::new().build().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_rejects_zero_size() {
        let err = PoolBuilder::new()
            .url("ws://localhost:8182/gremlin")
            .size(0)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_rejects_bad_url() {
        let err = PoolBuilder::new().url("not a url").build().await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
