//! Error types for the Gremlin client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use gremlin_socket::{Executor, Result};
//!
//! async fn example(pool: &ConnectionPool) -> Result<()> {
//!     let batches = pool.execute("g.V().count()").await?;
//!     println!("{} batches", batches.len());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::WebSocket`], [`Error::Io`] |
//! | Protocol | [`Error::Protocol`], [`Error::Decode`], [`Error::DuplicateRequest`], [`Error::TooManyPending`] |
//! | Encoding | [`Error::UnsupportedBinding`], [`Error::EmptyScript`], [`Error::Json`] |
//! | Server | [`Error::Server`] |
//! | Execution | [`Error::RequestTimeout`], [`Error::PoolExhausted`] |
//! | Collaborators | [`Error::ScriptNotFound`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when pool or connection configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Server URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport-level failure (refused, reset, closed by peer).
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake or idle bound exceeded.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection was closed locally while the request was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Inbound frame could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// A request with this id is still registered on the connection.
    #[error("Duplicate request id: {request_id}")]
    DuplicateRequest {
        /// The colliding request ID.
        request_id: RequestId,
    },

    /// Too many requests in flight on one connection.
    #[error("Too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Requests currently registered.
        pending: usize,
        /// Configured limit.
        max: usize,
    },

    // ========================================================================
    // Encoding Errors
    // ========================================================================
    /// A binding value cannot be represented on the wire.
    #[error("Unsupported binding '{name}': {reason}")]
    UnsupportedBinding {
        /// Binding name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An eval request was submitted without script text.
    #[error("Script is empty")]
    EmptyScript,

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Terminal non-success status returned by the server.
    #[error("Server error {code}: {message}")]
    Server {
        /// Status code from the response.
        code: u16,
        /// Human-readable status message.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// No terminal frame arrived before the local deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// No healthy pool member was available.
    #[error("Connection pool exhausted: no healthy member among {size}")]
    PoolExhausted {
        /// Number of members in the pool.
        size: usize,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// Script source could not resolve an identifier.
    #[error("Script not found: {identifier}")]
    ScriptNotFound {
        /// The identifier that was looked up.
        identifier: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a duplicate request error.
    #[inline]
    pub fn duplicate_request(request_id: RequestId) -> Self {
        Self::DuplicateRequest { request_id }
    }

    /// Creates an unsupported binding error.
    #[inline]
    pub fn unsupported_binding(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedBinding {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a server error.
    #[inline]
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a pool exhausted error.
    #[inline]
    pub fn pool_exhausted(size: usize) -> Self {
        Self::PoolExhausted { size }
    }

    /// Creates a script not found error.
    #[inline]
    pub fn script_not_found(identifier: impl Into<String>) -> Self {
        Self::ScriptNotFound {
            identifier: identifier.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this error means the carrying connection is dead.
    ///
    /// The pool demotes a member when a submission fails with one of these.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if this is a protocol-level error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::Decode { .. }
                | Self::DuplicateRequest { .. }
                | Self::TooManyPending { .. }
        )
    }

    /// Returns `true` if the server answered with a terminal error status.
    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// Returns the server status code, if this is a server error.
    #[inline]
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, possibly on another member.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
                | Self::PoolExhausted { .. }
                | Self::TooManyPending { .. }
        ) || matches!(self, Self::Server { code: 598, .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
