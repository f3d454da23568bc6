//! Binding values sent alongside a traversal script.
//!
//! Bindings are a mapping from variable name to a tagged [`Value`]. The
//! JSON wire format cannot carry every value the enum can hold (non-finite
//! floats, absurd nesting), so [`validate_bindings`] runs before encoding.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Deepest nesting of lists/maps accepted in a single binding.
pub const MAX_BINDING_DEPTH: usize = 32;

// ============================================================================
// Types
// ============================================================================

/// Named substitution values for a script.
pub type Bindings = BTreeMap<String, Value>;

/// A binding value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON `null`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number. Must be finite to be encoded.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Nested mapping.
    Map(BTreeMap<String, Value>),
}

// ============================================================================
// Validation
// ============================================================================

impl Value {
    /// Checks that this value can be written in the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBinding`] naming `name` when a float is
    /// NaN or infinite, or nesting exceeds [`MAX_BINDING_DEPTH`].
    pub fn validate(&self, name: &str) -> Result<()> {
        self.validate_at(name, 0)
    }

    fn validate_at(&self, name: &str, depth: usize) -> Result<()> {
        if depth > MAX_BINDING_DEPTH {
            return Err(Error::unsupported_binding(
                name,
                format!("nesting deeper than {MAX_BINDING_DEPTH}"),
            ));
        }

        match self {
            Self::Float(f) if !f.is_finite() => Err(Error::unsupported_binding(
                name,
                format!("non-finite number {f}"),
            )),
            Self::List(items) => items
                .iter()
                .try_for_each(|item| item.validate_at(name, depth + 1)),
            Self::Map(entries) => entries
                .values()
                .try_for_each(|item| item.validate_at(name, depth + 1)),
            _ => Ok(()),
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Validates every entry of a bindings map.
///
/// # Errors
///
/// Returns [`Error::UnsupportedBinding`] for an empty name or the first
/// value that fails [`Value::validate`].
pub fn validate_bindings(bindings: &Bindings) -> Result<()> {
    for (name, value) in bindings {
        if name.is_empty() {
            return Err(Error::unsupported_binding(name, "empty binding name"));
        }
        value.validate(name)?;
    }
    Ok(())
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    #[inline]
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    #[inline]
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_serializes_untagged() {
        let value = Value::List(vec![Value::Null, 1.into(), 2.5.into(), "x".into(), true.into()]);
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#"[null,1,2.5,"x",true]"#);
    }

    #[test]
    fn test_deserialize_keeps_int_and_float_apart() {
        let value: Value = serde_json::from_str("[1, 1.0]").expect("parse");
        assert_eq!(value, Value::List(vec![Value::Int(1), Value::Float(1.0)]));
    }

    #[test]
    fn test_nan_is_unsupported() {
        let mut bindings = Bindings::new();
        bindings.insert("x".into(), Value::Float(f64::NAN));

        let err = validate_bindings(&bindings).unwrap_err();
        assert!(matches!(err, Error::UnsupportedBinding { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_nested_infinity_is_unsupported() {
        let mut inner = BTreeMap::new();
        inner.insert("limit".to_string(), Value::Float(f64::INFINITY));
        let value = Value::List(vec![Value::Map(inner)]);

        assert!(value.validate("filters").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = Value::Null;
        for _ in 0..=MAX_BINDING_DEPTH + 1 {
            value = Value::List(vec![value]);
        }
        assert!(value.validate("deep").is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut bindings = Bindings::new();
        bindings.insert(String::new(), Value::Int(1));
        assert!(validate_bindings(&bindings).is_err());
    }

    #[test]
    fn test_from_json_value() {
        let value: Value = json!({"id": "1234", "n": 3, "tags": ["a"]}).into();
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map["id"], Value::String("1234".into()));
        assert_eq!(map["n"], Value::Int(3));
        assert_eq!(map["tags"], Value::List(vec!["a".into()]));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("v")), Value::String("v".into()));
    }
}
