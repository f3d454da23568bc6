//! WebSocket transport layer.
//!
//! This module multiplexes Gremlin requests over WebSocket sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌──────────────────┐
//! │  ConnectionPool  │                              │  Gremlin Server  │
//! │  ┌────────────┐  │         WebSocket            │                  │
//! │  │ Connection │◄─┼─────────────────────────────►│  /gremlin        │
//! │  │ Connection │◄─┼─────────────────────────────►│                  │
//! │  └────────────┘  │                              │                  │
//! └──────────────────┘                              └──────────────────┘
//! ```
//!
//! # Request Lifecycle
//!
//! 1. `Connection::submit*` encodes the request and registers its id
//! 2. The connection's writer task puts the frame on the wire
//! 3. The reader loop routes inbound frames by `requestId` into the request's sink
//! 4. `ResponseStream` yields frames until the terminal one
//! 5. The entry is removed on the terminal frame, timeout, drop or teardown
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `correlation` | Request id to response sink table |
//! | `pool` | Round-robin pool with health tracking |
//! | `stream` | Per-request response stream |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Request/response correlation table.
pub(crate) mod correlation;

/// Connection pool.
pub mod pool;

/// Streamed responses.
pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionState};
pub use pool::{ConnectionPool, MemberStatus, PoolConfig};
pub use stream::ResponseStream;
