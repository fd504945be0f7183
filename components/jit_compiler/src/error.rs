//! Compilation error taxonomy
//!
//! Inlining rejections and deoptimizations are not errors: rejections are
//! recorded in the plan and deoptimizations are an execution outcome. What
//! remains is listed here; every variant aborts the compilation attempt and
//! leaves the call target interpreted-only.

use crate::ir::GraphError;
use core_types::GuestError;
use interpreter::CallTargetId;
use thiserror::Error;

/// Reasons a compilation (or a compiler verification) failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    /// Internal inconsistency while partially evaluating
    #[error("evaluation fault in {target}: {message}")]
    EvaluationFault {
        /// Root being evaluated
        target: String,
        /// What went wrong
        message: String,
    },
    /// A call site names a call target the runtime does not know
    #[error("unresolved call target {0}")]
    UnresolvedCallTarget(CallTargetId),
    /// The graph handed to a later stage is structurally invalid
    #[error("malformed graph: {0}")]
    MalformedGraph(#[from] GraphError),
    /// A post-condition check on compiler output failed
    #[error("verification failed: {0}")]
    Verification(String),
    /// Code generation could not produce executable code
    #[error("backend failure: {0}")]
    Backend(String),
    /// The guest program failed while warming up a profile
    #[error("guest error: {0}")]
    Guest(#[from] GuestError),
}

impl CompilationError {
    /// Shorthand for an evaluation fault
    pub fn fault(target: &str, message: impl Into<String>) -> Self {
        CompilationError::EvaluationFault {
            target: target.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompilationError>;
