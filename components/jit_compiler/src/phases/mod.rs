//! Graph optimization phases
//!
//! Every phase rewrites a [`StructuredGraph`] in place and reports how many
//! changes it made. [`Optimizer`] alternates canonicalization and dead code
//! elimination until neither changes the graph.

pub mod canonicalizer;
pub mod dead_code;
pub mod frame_states;

pub use canonicalizer::{CanonicalizerPhase, CanonicalizerStats};
pub use dead_code::DeadCodeEliminationPhase;
pub use frame_states::{remove_frame_states, FrameStateRemovalPhase};

use crate::ir::StructuredGraph;

/// A graph-to-graph rewrite
pub trait Phase {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Rewrite `graph`, returning the number of changes made
    fn apply(&self, graph: &mut StructuredGraph) -> usize;
}

/// Summary of one optimizer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Canonicalize + DCE rounds executed
    pub rounds: usize,
    /// Accumulated canonicalizer counts
    pub canonicalizer: CanonicalizerStats,
    /// Nodes removed by dead code elimination
    pub dead_nodes: usize,
}

/// Canonicalizer followed by dead code elimination, repeated to a joint
/// fixpoint
#[derive(Debug, Clone)]
pub struct Optimizer {
    canonicalizer: CanonicalizerPhase,
    dead_code: DeadCodeEliminationPhase,
    max_passes: usize,
}

impl Optimizer {
    /// Create an optimizer with default caps
    pub fn new() -> Self {
        Self {
            canonicalizer: CanonicalizerPhase::new(),
            dead_code: DeadCodeEliminationPhase::new(),
            max_passes: 32,
        }
    }

    /// Set the maximum number of rounds (also caps canonicalizer rounds)
    pub fn with_max_passes(mut self, max: usize) -> Self {
        self.max_passes = max.max(1);
        self.canonicalizer = self.canonicalizer.with_max_iterations(self.max_passes);
        self
    }

    /// Optimize `graph` in place
    pub fn optimize(&self, graph: &mut StructuredGraph) -> OptimizationStats {
        let mut stats = OptimizationStats::default();
        for _ in 0..self.max_passes {
            stats.rounds += 1;
            let canonical = self.canonicalizer.run(graph);
            let removed = self.dead_code.run(graph);
            tracing::trace!(
                graph = graph.name(),
                rewrites = canonical.total(),
                removed,
                "optimization round"
            );

            let changed = canonical.total() + removed;
            accumulate(&mut stats.canonicalizer, &canonical);
            stats.dead_nodes += removed;
            if changed == 0 {
                break;
            }
        }
        stats
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

fn accumulate(total: &mut CanonicalizerStats, round: &CanonicalizerStats) {
    total.rounds += round.rounds;
    total.folded += round.folded;
    total.simplified += round.simplified;
    total.value_numbered += round.value_numbered;
    total.control_simplified += round.control_simplified;
    total.guards_removed += round.guards_removed;
}
