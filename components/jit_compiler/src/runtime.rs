//! Runtime: the call target registry and call dispatch
//!
//! The runtime owns every [`CallTarget`], the optimizing compiler and the
//! deoptimizer. It is the [`CallDispatch`] both the interpreter and compiled
//! code go through, so a guest call always reaches the callee's current tier.

use crate::call_target::CallTarget;
use crate::config::CompilerOptions;
use crate::deopt::Deoptimizer;
use crate::optimizing::OptimizingCompiler;
use core_types::{ErrorKind, GuestError, Value};
use interpreter::{CallDispatch, CallTargetId, RootNode};
use parking_lot::RwLock;
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Keeps the per-thread guest call depth balanced
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> Result<Self, GuestError> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= limit {
                return Err(GuestError::new(
                    ErrorKind::StackOverflow,
                    format!("guest call depth exceeded {}", limit),
                ));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Guest runtime
#[derive(Debug)]
pub struct Runtime {
    options: CompilerOptions,
    targets: RwLock<Vec<Arc<CallTarget>>>,
    compiler: OptimizingCompiler,
    deoptimizer: Deoptimizer,
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    /// Create a runtime with the given options
    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            compiler: OptimizingCompiler::new(options.clone()),
            options,
            targets: RwLock::new(Vec::new()),
            deoptimizer: Deoptimizer::new(),
        }
    }

    /// Use a custom compiler (policy or backend)
    pub fn with_compiler(mut self, compiler: OptimizingCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// The optimizing compiler
    pub fn compiler(&self) -> &OptimizingCompiler {
        &self.compiler
    }

    /// The deoptimizer and its history
    pub fn deoptimizer(&self) -> &Deoptimizer {
        &self.deoptimizer
    }

    /// Register a root and return its call target
    pub fn create_call_target(&self, root: RootNode) -> Arc<CallTarget> {
        let mut targets = self.targets.write();
        let id = CallTargetId(targets.len() as u32);
        let target = Arc::new(CallTarget::new(id, root));
        tracing::trace!(%id, name = target.name(), "call target created");
        targets.push(Arc::clone(&target));
        target
    }

    /// Look up a call target
    pub fn call_target(&self, id: CallTargetId) -> Option<Arc<CallTarget>> {
        self.targets.read().get(id.index()).cloned()
    }

    /// Number of registered call targets
    pub fn call_target_count(&self) -> usize {
        self.targets.read().len()
    }

    /// Invoke a call target by id
    pub fn invoke(&self, id: CallTargetId, arguments: &[Value]) -> Result<Value, GuestError> {
        let target = self.call_target(id).ok_or_else(|| {
            GuestError::new(ErrorKind::UnknownCallTarget, format!("unknown call target {}", id))
        })?;
        target.invoke(self, arguments)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl CallDispatch for Runtime {
    fn call(&self, target: CallTargetId, arguments: Vec<Value>) -> Result<Value, GuestError> {
        let _depth = DepthGuard::enter(self.options.max_call_depth)?;
        self.invoke(target, &arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interpreter::Node;

    #[test]
    fn test_registry_assigns_dense_ids() {
        let runtime = Runtime::new();
        let a = runtime.create_call_target(RootNode::new("a", 0, Node::ret(Node::constant(1))));
        let b = runtime.create_call_target(RootNode::new("b", 0, Node::ret(Node::constant(2))));

        assert_eq!(a.id(), CallTargetId(0));
        assert_eq!(b.id(), CallTargetId(1));
        assert_eq!(runtime.call_target_count(), 2);
        assert!(Arc::ptr_eq(&runtime.call_target(b.id()).unwrap(), &b));
        assert!(runtime.call_target(CallTargetId(7)).is_none());
    }

    #[test]
    fn test_unknown_target() {
        let runtime = Runtime::new();
        let err = runtime.invoke(CallTargetId(3), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownCallTarget);
    }

    #[test]
    fn test_calls_between_targets() {
        let runtime = Runtime::with_options(CompilerOptions::default().with_auto_compile(false));
        let double = runtime.create_call_target(RootNode::new("double", 1, Node::ret(Node::add(Node::arg(0), Node::arg(0)))));
        let caller = runtime.create_call_target(RootNode::new(
            "caller",
            1,
            Node::ret(Node::call(double.id(), vec![Node::arg(0)])),
        ));

        assert_eq!(runtime.invoke(caller.id(), &[Value::Int(21)]).unwrap(), Value::Int(42));
        assert_eq!(double.invocation_count(), 1);
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let runtime = Runtime::with_options(CompilerOptions {
            max_call_depth: 64,
            auto_compile: false,
            ..CompilerOptions::default()
        });
        // Target 0 calls itself forever
        let looping = runtime.create_call_target(RootNode::new(
            "looping",
            0,
            Node::ret(Node::call(CallTargetId(0), vec![])),
        ));

        let err = runtime.invoke(looping.id(), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackOverflow);
    }
}
