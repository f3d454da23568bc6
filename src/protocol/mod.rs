//! Gremlin Server wire protocol.
//!
//! This module defines the messages exchanged with the server and the
//! codec that turns them into WebSocket frames.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Request`] | Client → Server | Script submission (`op: eval`) |
//! | authentication | Client → Server | SASL answer to a 407 challenge |
//! | [`Response`] | Server → Client | One result batch (206 partial, 200 final) or an error |
//!
//! A request produces zero or more 206 frames followed by exactly one
//! terminal frame, all carrying the request's `requestId`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Mime-prefixed frame encoding/decoding |
//! | `request` | Request type |
//! | `response` | Response envelope and status codes |
//! | `value` | Binding value union |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encoding and decoding.
pub mod codec;

/// Request message type.
pub mod request;

/// Response envelope, status codes, streamed elements.
pub mod response;

/// Binding values.
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, DEFAULT_MIME_TYPE, Framing};
pub use request::{DEFAULT_LANGUAGE, DEFAULT_PROCESSOR, Operation, Request};
pub use response::{
    AsyncResponse, Response, ResponseResult, ResultData, Status, StatusClass, StatusCode,
};
pub use value::{Bindings, MAX_BINDING_DEPTH, Value, validate_bindings};
