//! Test support for partial evaluation
//!
//! [`PartialEvaluationTester`] owns a runtime with automatic compilation
//! turned off, warms roots up with sample arguments so their profiles are
//! populated, and checks properties of the resulting graphs.

use crate::call_target::CallTarget;
use crate::config::CompilerOptions;
use crate::error::{CompilationError, CompileResult};
use crate::ir::{GraphPrinter, NodeKind, StructuredGraph};
use crate::phases;
use crate::runtime::Runtime;
use core_types::Value;
use interpreter::RootNode;
use std::sync::Arc;

/// Interpreted runs before a root is partially evaluated
const WARMUP_CALLS: usize = 3;

/// Harness for partial evaluation tests
#[derive(Debug)]
pub struct PartialEvaluationTester {
    runtime: Runtime,
}

impl PartialEvaluationTester {
    /// Harness with default options and automatic compilation off
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    /// Harness with custom options; automatic compilation is always off
    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            runtime: Runtime::with_options(options.with_auto_compile(false)),
        }
    }

    /// Runtime the roots are registered in (register callees here)
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Register `root`, warm it up and return its optimized graph
    ///
    /// Frame states are still attached.
    pub fn partial_eval(&self, root: RootNode, arguments: &[Value]) -> CompileResult<StructuredGraph> {
        let target = self.warm_up(root, arguments)?;
        let compilation = self.runtime.compiler().partial_evaluate(&self.runtime, &target)?;
        Ok(compilation.graph)
    }

    /// Strip frame states and re-optimize so graphs compare by shape
    pub fn remove_frame_states(&self, graph: &mut StructuredGraph) {
        phases::remove_frame_states(graph);
        self.runtime.compiler().optimize(graph);
    }

    /// Check that everything reachable from `root` was inlined
    ///
    /// Invokes are counted after frame states are stripped, so only calls
    /// the optimizer could not remove are reported.
    pub fn assert_partial_eval_no_invokes(&self, root: RootNode, arguments: &[Value]) -> CompileResult<StructuredGraph> {
        let mut graph = self.partial_eval(root, arguments)?;
        self.remove_frame_states(&mut graph);
        let invokes = graph.count(|kind| matches!(kind, NodeKind::Invoke { .. }));
        if invokes > 0 {
            return Err(CompilationError::Verification(format!(
                "{} invoke(s) left in {}:\n{}",
                invokes,
                graph.name(),
                GraphPrinter::canonical(&graph)
            )));
        }
        Ok(graph)
    }

    /// Check that `actual` partially evaluates to the same graph as
    /// `expected`, ignoring frame states
    pub fn assert_partial_eval_equals(&self, expected: RootNode, actual: RootNode, arguments: &[Value]) -> CompileResult<()> {
        let mut expected_graph = self.partial_eval(expected, arguments)?;
        let mut actual_graph = self.partial_eval(actual, arguments)?;
        self.remove_frame_states(&mut expected_graph);
        self.remove_frame_states(&mut actual_graph);

        let expected_text = GraphPrinter::canonical(&expected_graph);
        let actual_text = GraphPrinter::canonical(&actual_graph);
        if expected_text != actual_text {
            return Err(CompilationError::Verification(format!(
                "graphs differ\nexpected:\n{}actual:\n{}",
                expected_text, actual_text
            )));
        }
        Ok(())
    }

    /// Register `root`, warm it up and compile it
    pub fn compile_helper(&self, root: RootNode, arguments: &[Value]) -> CompileResult<Arc<CallTarget>> {
        let target = self.warm_up(root, arguments)?;
        target.request_compilation(&self.runtime)?;
        Ok(target)
    }

    fn warm_up(&self, root: RootNode, arguments: &[Value]) -> CompileResult<Arc<CallTarget>> {
        let target = self.runtime.create_call_target(root);
        for _ in 0..WARMUP_CALLS {
            target.invoke(&self.runtime, arguments)?;
        }
        Ok(target)
    }
}

impl Default for PartialEvaluationTester {
    fn default() -> Self {
        Self::new()
    }
}
