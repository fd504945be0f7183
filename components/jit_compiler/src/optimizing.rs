//! Optimizing compiler pipeline
//!
//! One compilation runs these stages in order:
//! 1. Build the inlining plan from the call tree and the inlining policy
//! 2. Partially evaluate the root under that plan
//! 3. Canonicalize and eliminate dead code to a joint fixpoint
//! 4. Hand the graph to the backend
//!
//! Any stage failing aborts the compilation; nothing is installed.

use crate::call_target::CallTarget;
use crate::codegen::{Backend, GraphBackend};
use crate::compiled_code::CompiledCode;
use crate::config::CompilerOptions;
use crate::error::CompileResult;
use crate::inlining::{DefaultInliningPolicy, InliningPlan, InliningPolicy};
use crate::ir::{NodeKind, StructuredGraph};
use crate::partial_eval::PartialEvaluator;
use crate::phases::{OptimizationStats, Optimizer};
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Statistics for optimizing compilations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerStats {
    /// Compilations that produced code
    pub compilations: u64,
    /// Compilations that failed at any stage
    pub failures: u64,
    /// Call sites inlined across all compilations
    pub sites_inlined: u64,
    /// Graph nodes right after partial evaluation
    pub nodes_before_optimization: usize,
    /// Graph nodes handed to the backend
    pub nodes_after_optimization: usize,
}

/// Output of the compiler front end: an optimized graph and the plan it
/// was evaluated under
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Optimized graph, frame states still attached
    pub graph: StructuredGraph,
    /// Inlining decisions used
    pub plan: InliningPlan,
    /// What the optimizer did
    pub optimization: OptimizationStats,
}

/// Optimizing JIT compiler
///
/// Holds the pluggable inlining policy and backend. Safe to share between
/// threads; statistics are kept behind a lock.
pub struct OptimizingCompiler {
    options: CompilerOptions,
    policy: Arc<dyn InliningPolicy>,
    backend: Arc<dyn Backend>,
    stats: Mutex<CompilerStats>,
}

impl OptimizingCompiler {
    /// Create a compiler with the default policy and backend
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            policy: Arc::new(DefaultInliningPolicy::from_options(&options)),
            backend: Arc::new(GraphBackend::new()),
            options,
            stats: Mutex::new(CompilerStats::default()),
        }
    }

    /// Replace the inlining policy
    pub fn with_policy(mut self, policy: Arc<dyn InliningPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the backend
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Decide inlining for every call site reachable from `target`
    pub fn build_plan(&self, runtime: &Runtime, target: &CallTarget) -> CompileResult<InliningPlan> {
        InliningPlan::build(runtime, target, self.policy.as_ref(), self.options.inlining_budget)
    }

    /// Run the optimization phases on `graph`
    pub fn optimize(&self, graph: &mut StructuredGraph) -> OptimizationStats {
        Optimizer::new()
            .with_max_passes(self.options.canonicalizer_iterations)
            .optimize(graph)
    }

    /// Plan, partially evaluate and optimize `target` without emitting code
    pub fn partial_evaluate(&self, runtime: &Runtime, target: &Arc<CallTarget>) -> CompileResult<Compilation> {
        let plan = self.build_plan(runtime, target)?;
        let mut graph = PartialEvaluator::new(runtime).evaluate(target, &plan)?;
        let nodes_before = graph.node_count();
        let optimization = self.optimize(&mut graph);

        tracing::debug!(
            target = target.name(),
            nodes_before,
            nodes_after = graph.node_count(),
            rounds = optimization.rounds,
            rewrites = optimization.canonicalizer.total(),
            removed = optimization.dead_nodes,
            "graph optimized"
        );

        let mut stats = self.stats.lock();
        stats.sites_inlined += plan.stats().sites_inlined;
        stats.nodes_before_optimization += nodes_before;
        Ok(Compilation {
            graph,
            plan,
            optimization,
        })
    }

    /// Compile `target` all the way to installable code
    pub fn compile(&self, runtime: &Runtime, target: &Arc<CallTarget>) -> CompileResult<CompiledCode> {
        let span = tracing::info_span!("compile", target = target.name(), backend = self.backend.name());
        let _enter = span.enter();

        let result = self.partial_evaluate(runtime, target).and_then(|compilation| {
            let nodes = compilation.graph.node_count();
            let invokes = compilation
                .graph
                .count(|kind| matches!(kind, NodeKind::Invoke { .. }));
            let code = self.backend.emit(compilation.graph, target)?;
            Ok((code, nodes, invokes))
        });

        let mut stats = self.stats.lock();
        match result {
            Ok((code, nodes, invokes)) => {
                stats.compilations += 1;
                stats.nodes_after_optimization += nodes;
                tracing::info!(nodes, invokes, "compilation finished");
                Ok(code)
            }
            Err(err) => {
                stats.failures += 1;
                tracing::debug!(error = %err, "compilation failed");
                Err(err)
            }
        }
    }

    /// Snapshot of compilation statistics
    pub fn stats(&self) -> CompilerStats {
        self.stats.lock().clone()
    }

    /// Reset compilation statistics
    pub fn reset_stats(&self) {
        *self.stats.lock() = CompilerStats::default();
    }
}

impl Default for OptimizingCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl fmt::Debug for OptimizingCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizingCompiler")
            .field("options", &self.options)
            .field("backend", &self.backend.name())
            .finish()
    }
}
