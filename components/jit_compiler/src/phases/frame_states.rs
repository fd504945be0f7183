//! Frame state stripping
//!
//! Once a graph no longer needs to deoptimize (or a test wants to compare
//! shapes without deoptimization metadata) every `state` edge and every
//! `FrameState` node can be dropped.

use crate::ir::{NodeKind, StructuredGraph};
use crate::phases::Phase;

/// Remove frame states from the graph
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStateRemovalPhase;

impl Phase for FrameStateRemovalPhase {
    fn name(&self) -> &'static str {
        "frame-state-removal"
    }

    fn apply(&self, graph: &mut StructuredGraph) -> usize {
        remove_frame_states(graph)
    }
}

/// Drop all `state` edges and `FrameState` nodes; returns the number of
/// nodes removed
pub fn remove_frame_states(graph: &mut StructuredGraph) -> usize {
    graph.clear_states();
    let states = graph.filter(|kind| matches!(kind, NodeKind::FrameState(_)));
    for id in &states {
        graph.remove(*id);
    }
    states.len()
}
