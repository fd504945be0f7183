//! AST interpreter for the guest language
//!
//! This crate provides:
//! - The guest AST node catalog with stable pre-order node ids
//! - Guest operator semantics shared with the compiler
//! - Lock-free per-root profiles (argument types, branch counts)
//! - A tree-walking interpreter that can resume part-way through a root
//!   from a frame snapshot
//!
//! # Example
//!
//! ```
//! use core_types::{GuestError, Value};
//! use interpreter::{CallDispatch, CallTargetId, Interpreter, Node, RootNode};
//!
//! struct NoCalls;
//!
//! impl CallDispatch for NoCalls {
//!     fn call(&self, _: CallTargetId, _: Vec<Value>) -> Result<Value, GuestError> {
//!         Err(GuestError::internal("no calls"))
//!     }
//! }
//!
//! let root = RootNode::new("add", 2, Node::ret(Node::add(Node::arg(0), Node::arg(1))));
//! let result = Interpreter::new(&root, &NoCalls)
//!     .execute(vec![Value::Int(40), Value::Int(2)])
//!     .unwrap();
//! assert_eq!(result, Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod call_frame;
pub mod dispatch;
pub mod ops;
pub mod profile;
pub mod vm;

// Re-export main types at crate root
pub use ast::{AstNodeId, BinaryOp, CallSiteId, CallTargetId, Node, NodeKind, RootNode, UnaryOp};
pub use call_frame::{CallFrame, FrameSnapshot, ResumeMode};
pub use dispatch::CallDispatch;
pub use profile::RootProfile;
pub use vm::Interpreter;
