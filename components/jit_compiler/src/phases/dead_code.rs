//! Dead code elimination
//!
//! Unreachable control is cut first; everything not reachable through
//! data, control or state edges from a live fixed node is then swept.

use crate::ir::{NodeId, StructuredGraph};
use crate::phases::Phase;
use std::collections::HashSet;

/// Mark-and-sweep over the graph, repeated until nothing is removed
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadCodeEliminationPhase;

impl DeadCodeEliminationPhase {
    /// Create the phase
    pub fn new() -> Self {
        Self
    }

    /// Remove dead nodes; returns how many were removed
    pub fn run(&self, graph: &mut StructuredGraph) -> usize {
        let mut total = 0;
        loop {
            let removed = graph.kill_unreachable_control() + sweep(graph);
            if removed == 0 {
                return total;
            }
            total += removed;
        }
    }
}

impl Phase for DeadCodeEliminationPhase {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn apply(&self, graph: &mut StructuredGraph) -> usize {
        self.run(graph)
    }
}

fn sweep(graph: &mut StructuredGraph) -> usize {
    let mut live: HashSet<NodeId> = graph.reachable_control();
    let mut worklist: Vec<NodeId> = live.iter().copied().collect();
    while let Some(id) = worklist.pop() {
        let Some(node) = graph.get(id) else {
            continue;
        };
        for edge in node.edges() {
            if graph.contains(edge) && live.insert(edge) {
                worklist.push(edge);
            }
        }
    }

    let dead: Vec<NodeId> = graph.node_ids().into_iter().filter(|id| !live.contains(id)).collect();
    for id in &dead {
        graph.remove(*id);
    }
    dead.len()
}
