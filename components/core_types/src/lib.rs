//! Core guest value types, profile vocabulary and error handling.
//!
//! This crate provides the foundational types shared by the AST interpreter
//! and the partial-evaluation compiler.
//!
//! # Overview
//!
//! - [`Value`] - Guest values (integers, booleans, null)
//! - [`GuestError`] - Errors raised by guest semantics
//! - [`ErrorKind`] - Kinds of guest errors
//! - [`TypeInfo`] - Type tags observed by profiles and proven by the compiler
//! - [`TypeFeedback`] - Per-position type lattice used for speculation
//! - [`BranchProfile`] - Snapshot of a conditional's taken/not-taken counts
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, GuestError, TypeInfo, Value};
//!
//! let num = Value::Int(42);
//! assert_eq!(num.type_info(), TypeInfo::Int);
//! assert_eq!(num.as_int(), Some(42));
//!
//! let error = GuestError::new(ErrorKind::TypeError, "expected Int");
//! assert_eq!(error.to_string(), "TypeError: expected Int");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod profile;
mod value;

pub use error::{ErrorKind, GuestError};
pub use profile::{BranchOutcome, BranchProfile, TypeFeedback, TypeInfo};
pub use value::Value;
