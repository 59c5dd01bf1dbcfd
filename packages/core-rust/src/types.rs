use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Property map attached to interceptors, messages, and exchanges.
///
/// Uses `BTreeMap` so that iteration (and therefore anything derived from it,
/// such as logging or tracking output) is deterministic.
pub type Properties = BTreeMap<String, Value>;

/// Generic runtime value for property maps.
///
/// Supports all JSON-compatible types. Interceptor metadata such as priorities,
/// categories, and service restrictions are all carried as `Value`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object (ordered map of string keys to values).
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
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
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Builds a [`Properties`] map from `(key, value)` pairs.
///
/// ```
/// use esb_core::types::{properties, Value};
///
/// let props = properties([("esb.interceptor.priority", Value::Int(5))]);
/// assert_eq!(props.len(), 1);
/// ```
pub fn properties<K, V, I>(pairs: I) -> Properties
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Bool(true).as_int(), None);
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::Null.as_str(), None);
    }

    #[test]
    fn kind_names_every_variant() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::Float(1.5).kind(), "float");
        assert_eq!(Value::Array(vec![]).kind(), "array");
        assert_eq!(Value::Map(BTreeMap::new()).kind(), "map");
    }

    #[test]
    fn converts_from_json() {
        let json = serde_json::json!({
            "enabled": true,
            "priority": 3,
            "weight": 0.5,
            "services": ["orders", "billing"],
        });

        let Value::Map(map) = Value::from(json) else {
            panic!("expected map");
        };
        assert_eq!(map["enabled"], Value::Bool(true));
        assert_eq!(map["priority"], Value::Int(3));
        assert_eq!(map["weight"], Value::Float(0.5));
        assert_eq!(
            map["services"],
            Value::Array(vec![Value::from("orders"), Value::from("billing")])
        );
    }

    #[test]
    fn properties_helper_builds_sorted_map() {
        let props = properties([("b", Value::Int(2)), ("a", Value::Int(1))]);
        let keys: Vec<_> = props.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
