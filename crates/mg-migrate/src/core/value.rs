//! Tagged value type used at the boundary between the SQL and graph worlds.
//!
//! Every cell read from a source row and every bound statement parameter is
//! a [`Value`]. The domain is deliberately small: what the destination's
//! property model can store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Property map with unique string keys and stable insertion order.
///
/// Insertion order matters: property maps are rendered into statements in
/// the order keys were inserted, which keeps the emitted statement stream
/// deterministic for a given source row order.
pub type PropertyMap = IndexMap<String, Value>;

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    /// 64-bit signed integer. Smaller source integer widths widen to this.
    Int(i64),
    /// IEEE-754 double. Covers float32, float64 and numeric source columns.
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(PropertyMap),
}

impl Value {
    /// Check if this value is the null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Return the integer payload, if this is an integer value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the string payload, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<PropertyMap> for Value {
    fn from(v: PropertyMap) -> Self {
        Value::Map(v)
    }
}

/// A single row of values, positionally aligned with the declared columns.
pub type Row = Vec<Value>;
