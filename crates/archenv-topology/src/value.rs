//! Property value trees
//!
//! Snapshot properties are arbitrary nested documents. They are converted into
//! an explicit [`PropertyValue`] tree once, at parse time, so the differ can
//! walk them with exhaustive matches instead of probing dynamic types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Property mapping, in snapshot order
pub type PropertyMap = IndexMap<String, PropertyValue>;

/// Leaf value of a property tree
///
/// Equality treats NaN as equal to itself, so a value always equals its own
/// clone and diffing a topology against itself is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
}

/// Node of a property tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Leaf
    Scalar(Scalar),
    /// Ordered list, compared positionally
    Sequence(Vec<PropertyValue>),
    /// Keyed children
    Mapping(PropertyMap),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl PropertyValue {
    /// Null leaf
    #[inline]
    #[must_use]
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    /// Child of a mapping node
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        match self {
            Self::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// String leaf contents
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// True for a null leaf
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }
}

impl From<serde_yaml::Value> for PropertyValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Scalar(Scalar::Int(i)),
                None => Self::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Sequence(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Mapping(map) => Self::Mapping(
                map.into_iter()
                    .map(|(k, v)| (key_to_string(k), Self::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Self::from(tagged.value),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

/// Mapping keys become strings; non-string YAML keys keep their literal text
pub(crate) fn key_to_string(key: serde_yaml::Value) -> String {
    use serde_yaml::Value;

    match key {
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
