//! Call dispatch seam between the interpreter and the runtime
//!
//! The interpreter never resolves call targets itself. A `Call` node hands
//! the target id and evaluated arguments to a [`CallDispatch`], which may run
//! the callee interpreted or compiled.

use crate::ast::CallTargetId;
use core_types::{GuestError, Value};

/// Executes guest calls on behalf of the interpreter
pub trait CallDispatch: Sync {
    /// Invoke `target` with `arguments`
    fn call(&self, target: CallTargetId, arguments: Vec<Value>) -> Result<Value, GuestError>;
}
