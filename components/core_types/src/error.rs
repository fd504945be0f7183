//! Guest error types.
//!
//! Guest errors are part of the guest language's semantics: they are raised
//! identically by the interpreter and by compiled code, and they are never
//! treated as compiler faults.

use std::fmt;
use thiserror::Error;

/// The kind of guest error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An operation received an operand of the wrong type
    TypeError,
    /// The guest call depth limit was exceeded
    StackOverflow,
    /// A call referenced a call target that is not registered
    UnknownCallTarget,
    /// Internal engine error (corrupt frame state, malformed compiled code)
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::StackOverflow => "StackOverflow",
            ErrorKind::UnknownCallTarget => "UnknownCallTarget",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A guest error with a human-readable message.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, GuestError};
///
/// let error = GuestError::type_error("cannot add Bool and Int");
/// assert_eq!(error.kind, ErrorKind::TypeError);
/// assert_eq!(error.message, "cannot add Bool and Int");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct GuestError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl GuestError {
    /// Create a new guest error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Create an `InternalError`
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}
