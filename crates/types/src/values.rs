//! Field values and grouping keys

use crate::errors::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field value of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// UTF-8 text
    Text(String),
}

impl Value {
    /// Name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    /// Whether the value is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    /// Read the value as an unsigned integer, e.g. for timestamps
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Read the value as a float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One component of a grouping key. Floats are not allowed as keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
}

impl TryFrom<&Value> for KeyPart {
    type Error = TypesError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(KeyPart::Null),
            Value::Bool(v) => Ok(KeyPart::Bool(*v)),
            Value::Int(v) => Ok(KeyPart::Int(*v)),
            Value::UInt(v) => Ok(KeyPart::UInt(*v)),
            Value::Text(v) => Ok(KeyPart::Text(v.clone())),
            Value::Float(_) => Err(TypesError::UnhashableKey {
                type_name: value.type_name(),
            }),
        }
    }
}

impl From<&KeyPart> for Value {
    fn from(part: &KeyPart) -> Self {
        match part {
            KeyPart::Null => Value::Null,
            KeyPart::Bool(v) => Value::Bool(*v),
            KeyPart::Int(v) => Value::Int(*v),
            KeyPart::UInt(v) => Value::UInt(*v),
            KeyPart::Text(v) => Value::Text(v.clone()),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

/// Grouping key of a keyed window: one part per `group_by` field
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<KeyPart>);

impl GroupKey {
    /// Key with a single text component
    pub fn text(value: impl Into<String>) -> Self {
        GroupKey(vec![KeyPart::Text(value.into())])
    }

    /// Key parts
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("|"))
    }
}
