//! Request message type.
//!
//! A [`Request`] carries one traversal script plus its bindings. The wire
//! layout is produced by [`Codec`](super::Codec):
//!
//! ```json
//! {
//!   "requestId": "uuid",
//!   "op": "eval",
//!   "processor": "",
//!   "args": {
//!     "gremlin": "g.V(x).label()",
//!     "bindings": { "x": "1234" },
//!     "language": "gremlin-groovy"
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::{IdGenerator, RequestId};

use super::value::{Bindings, Value};

// ============================================================================
// Constants
// ============================================================================

/// Script language used when none is given.
pub const DEFAULT_LANGUAGE: &str = "gremlin-groovy";

/// Processor used when none is given (the server's standard one).
pub const DEFAULT_PROCESSOR: &str = "";

// ============================================================================
// Operation
// ============================================================================

/// Server operation requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Evaluate a script.
    #[default]
    Eval,
}

impl Operation {
    /// Wire name of the operation.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eval => "eval",
        }
    }

    /// Returns `true` if the operation is meaningless without a script.
    #[inline]
    #[must_use]
    pub const fn requires_script(self) -> bool {
        match self {
            Self::Eval => true,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Request
// ============================================================================

/// A script submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Operation to perform.
    pub operation: Operation,

    /// Server-side processor name.
    pub processor: String,

    /// Traversal script, opaque to the client.
    pub script: String,

    /// Named values referenced by the script.
    pub bindings: Bindings,

    /// Script language.
    pub language: String,

    /// Traversal source rebindings (`g` -> `graph.traversal()` name).
    pub aliases: BTreeMap<String, String>,
}

impl Request {
    /// Creates an eval request with an auto-generated ID.
    #[inline]
    #[must_use]
    pub fn eval(script: impl Into<String>) -> Self {
        Self::with_id(RequestId::generate(), script)
    }

    /// Creates an eval request with an ID drawn from `generator`.
    #[inline]
    #[must_use]
    pub fn eval_with(generator: &dyn IdGenerator, script: impl Into<String>) -> Self {
        Self::with_id(generator.next_id(), script)
    }

    /// Creates an eval request with a specific ID.
    #[must_use]
    pub fn with_id(id: RequestId, script: impl Into<String>) -> Self {
        Self {
            id,
            operation: Operation::Eval,
            processor: DEFAULT_PROCESSOR.to_string(),
            script: script.into(),
            bindings: Bindings::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            aliases: BTreeMap::new(),
        }
    }

    /// Replaces all bindings.
    #[inline]
    #[must_use]
    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Adds a single binding.
    #[inline]
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// Replaces all aliases.
    #[inline]
    #[must_use]
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Sets the script language.
    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the processor.
    #[inline]
    #[must_use]
    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = processor.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_defaults() {
        let request = Request::eval("g.V().count()");
        assert_eq!(request.operation, Operation::Eval);
        assert_eq!(request.language, DEFAULT_LANGUAGE);
        assert_eq!(request.processor, DEFAULT_PROCESSOR);
        assert!(request.bindings.is_empty());
        assert!(request.aliases.is_empty());
    }

    #[test]
    fn test_request_with_id() {
        let id = RequestId::generate();
        let request = Request::with_id(id, "g.V()");
        assert_eq!(request.id, id);
    }

    #[test]
    fn test_bind_accumulates() {
        let request = Request::eval("g.V(x).has('age', gt(y))")
            .bind("x", "1234")
            .bind("y", 30);

        assert_eq!(request.bindings.len(), 2);
        assert_eq!(request.bindings["y"], Value::Int(30));
    }

    #[test]
    fn test_operation_wire_name() {
        assert_eq!(Operation::Eval.to_string(), "eval");
        assert_eq!(
            serde_json::to_string(&Operation::Eval).expect("serialize"),
            "\"eval\""
        );
        assert!(Operation::Eval.requires_script());
    }
}
