//! Type-safe identifiers and request-id generation.
//!
//! Gremlin servers correlate responses to requests by a UUID `requestId`.
//! [`RequestId`] wraps that UUID so it cannot be confused with other
//! strings, and [`IdGenerator`] lets callers choose how ids are minted.
//!
//! # Example
//!
//! ```
//! use gremlin_socket::identifiers::{IdGenerator, RequestId, SequentialGenerator};
//!
//! let random = RequestId::generate();
//! let sequential = SequentialGenerator::new();
//! assert_ne!(sequential.next_id(), sequential.next_id());
//! # let _ = random;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating a request with its response frames.
///
/// Must be unique among the requests currently in flight on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random (v4) request ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// IdGenerator
// ============================================================================

/// Source of request IDs.
///
/// Implementations only need to avoid handing out an id that is still in
/// flight on the same connection.
pub trait IdGenerator: fmt::Debug + Send + Sync {
    /// Returns the next request ID.
    fn next_id(&self) -> RequestId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    #[inline]
    fn next_id(&self) -> RequestId {
        RequestId::generate()
    }
}

/// Monotonic counter rendered as a UUID.
///
/// Handy in tests and logs where readable, ordered ids help.
#[derive(Debug)]
pub struct SequentialGenerator {
    next: AtomicU64,
}

impl Default for SequentialGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialGenerator {
    /// Creates a generator starting at 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialGenerator {
    fn next_id(&self) -> RequestId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        RequestId(Uuid::from_u128(u128::from(n)))
    }
}

// ============================================================================
// Tests
// ============================================================================
