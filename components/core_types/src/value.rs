//! Guest value representation.
//!
//! The guest language has three kinds of values: 64-bit integers with
//! wrapping arithmetic, booleans and `null`. Values are small, `Copy`, and
//! hashable so the compiler can use them as constant keys during value
//! numbering.

use crate::TypeInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents any guest value.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let n = Value::Int(7);
/// let flag = Value::Bool(true);
///
/// assert_eq!(n.as_int(), Some(7));
/// assert_eq!(flag.as_bool(), Some(true));
/// assert_eq!(Value::default(), Value::Null);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Value {
    /// Signed 64-bit integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// The absent value; uninitialized locals and missing arguments read as null
    #[default]
    Null,
}

impl Value {
    /// Returns the type tag of this value.
    pub fn type_info(&self) -> TypeInfo {
        match self {
            Value::Int(_) => TypeInfo::Int,
            Value::Bool(_) => TypeInfo::Bool,
            Value::Null => TypeInfo::Null,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Checks if this value is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
