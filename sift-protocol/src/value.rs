use std::fmt;

use serde::{Deserialize, Serialize};

/// An attribute value attached to an entry.
///
/// Attribute maps are flat; nested values are not supported. Numeric
/// comparisons treat integers and floats uniformly through
/// [`as_f64`](Self::as_f64).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    I64(i64),
    /// A floating point value.
    F64(f64),
    /// A string value.
    String(String),
}

impl AttrValue {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value, if this is an integer or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::I64(i) => Some(*i as f64),
            AttrValue::F64(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::I64(i) => write!(f, "{i}"),
            AttrValue::F64(x) => write!(f, "{x}"),
            AttrValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::I64(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::F64(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}
