//! Partial-evaluation JIT compiler for the guest AST interpreter
//!
//! This crate provides:
//! - Call targets: interpreted and profiled until hot, then compiled
//! - Inlining: a pluggable policy and a deterministic per-compilation plan
//! - Partial evaluation: specializes a root and its inlined callees into a
//!   sea-of-nodes graph with frame states at every deoptimization point
//! - Canonicalization and dead code elimination over that graph
//! - Deoptimization: resuming the interpreter from materialized frames
//!
//! # Example
//!
//! ```
//! use core_types::Value;
//! use interpreter::{Node, RootNode};
//! use jit_compiler::{CompilerOptions, Runtime};
//!
//! let runtime = Runtime::with_options(CompilerOptions::default().with_compilation_threshold(2));
//! let add = runtime.create_call_target(RootNode::new(
//!     "add",
//!     2,
//!     Node::ret(Node::add(Node::arg(0), Node::arg(1))),
//! ));
//!
//! for i in 0..2 {
//!     add.invoke(&runtime, &[Value::Int(i), Value::Int(1)]).unwrap();
//! }
//! assert!(add.is_compiled());
//! assert_eq!(add.invoke(&runtime, &[Value::Int(40), Value::Int(2)]).unwrap(), Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_target;
pub mod codegen;
pub mod compiled_code;
pub mod config;
pub mod deopt;
pub mod error;
pub mod inlining;
pub mod ir;
pub mod optimizing;
pub mod partial_eval;
pub mod phases;
pub mod runtime;
pub mod testing;

// Re-export main types at crate root
pub use call_target::{CallTarget, CallTargetState, CompilationStatus};
pub use codegen::{Backend, GraphBackend};
pub use compiled_code::{CompiledCode, ExecutionResult};
pub use config::CompilerOptions;
pub use deopt::{DeoptInfo, DeoptReason, Deoptimization, Deoptimizer};
pub use error::{CompilationError, CompileResult};
pub use inlining::{
    DefaultInliningPolicy, InliningCandidate, InliningContext, InliningDecision, InliningPlan, InliningPolicy,
    InliningRejection,
};
pub use ir::{GraphPrinter, StructuredGraph};
pub use optimizing::{Compilation, CompilerStats, OptimizingCompiler};
pub use partial_eval::PartialEvaluator;
pub use phases::{CanonicalizerPhase, DeadCodeEliminationPhase, Optimizer};
pub use runtime::Runtime;
pub use testing::PartialEvaluationTester;
