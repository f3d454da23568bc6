//! Gremlin Socket - Multiplexing WebSocket client for Gremlin servers.
//!
//! This library submits Gremlin traversal scripts to a graph-database
//! server over persistent WebSocket sessions and hands back the result
//! batches, either all at once or as a stream.
//!
//! # Architecture
//!
//! The client follows a single-writer, single-reader model:
//!
//! - **Connection**: one WebSocket, one writer task, one reader loop, any number of callers
//! - **Correlation**: each in-flight request id maps to its own bounded sink
//! - **Streaming**: partial (206) frames flow to the caller as they arrive
//! - **Pool**: several connections, round-robin, dead members replaced
//!
//! Key design principles:
//!
//! - Frames for one request arrive in server-send order
//! - A request id is registered once and removed exactly once
//! - A transport or framing failure fails every request on that connection
//! - No silent retries
//!
//! # Quick Start
//!
//! ```no_run
//! use gremlin_socket::{ConnectionPool, Executor, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pool = ConnectionPool::builder()
//!         .url("ws://localhost:8182/gremlin")
//!         .size(4)
//!         .build()
//!         .await?;
//!
//!     let batches = pool.execute("g.V().hasLabel('person').values('name')").await?;
//!     for batch in &batches {
//!         let names: Vec<String> = batch.data().decode()?;
//!         println!("{names:?}");
//!     }
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Executor`] trait, options, pool builder, script sources |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request ids and id generators |
//! | [`protocol`] | Wire messages and frame codec |
//! | [`transport`] | Connection, correlation, streams, pool |

// ============================================================================
// Modules
// ============================================================================

/// Client-facing API.
///
/// - [`Executor`] - Shared submission contract
/// - [`ConnectionOptions`] - Per-connection tuning
/// - [`PoolBuilder`] - Fluent pool configuration
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Request identifiers.
///
/// Newtype wrapper around the UUID `requestId` plus pluggable generators.
pub mod identifiers;

/// Gremlin Server wire protocol.
///
/// Request/response structures and the mime-prefixed frame codec.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connections, their event loops, and the pool.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ConnectionOptions, Credentials, Executor, FsScriptSource, PoolBuilder, ScriptSource,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{IdGenerator, RequestId, SequentialGenerator, UuidGenerator};

// Protocol types
pub use protocol::{AsyncResponse, Codec, Request, Response, StatusCode, Value};

// Transport types
pub use transport::{Connection, ConnectionPool, ConnectionState, ResponseStream};
