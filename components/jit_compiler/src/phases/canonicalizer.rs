//! Canonicalizer pass
//!
//! Local rewrites applied until nothing changes:
//! - Constant folding of operators whose inputs are all constants
//! - Identity and absorbing-element simplification (`x + 0`, `x * 1`,
//!   `x * 0`, `x - x`, `!!x`, `x == x`, `x < x`)
//! - Value numbering of equivalent floating nodes
//! - Phi, merge and constant-condition `If` simplification
//! - Removal of guards that are statically true or dominated by an
//!   identical guard
//!
//! Fixed nodes are never reordered; side effects keep their order.

use crate::ir::{GuardCheck, Node, NodeId, NodeKind, StructuredGraph};
use crate::phases::Phase;
use core_types::Value;
use interpreter::{ops, BinaryOp, UnaryOp};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Counts of rewrites performed by one canonicalizer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalizerStats {
    /// Rounds executed (the last one found nothing to do unless capped)
    pub rounds: usize,
    /// Operators replaced by constants
    pub folded: usize,
    /// Algebraic simplifications
    pub simplified: usize,
    /// Floating nodes merged into an equivalent node
    pub value_numbered: usize,
    /// Phis, merges and branches removed
    pub control_simplified: usize,
    /// Guards removed
    pub guards_removed: usize,
}

impl CanonicalizerStats {
    /// Total number of rewrites
    pub fn total(&self) -> usize {
        self.folded + self.simplified + self.value_numbered + self.control_simplified + self.guards_removed
    }
}

type ValueKey = (NodeKind, Vec<NodeId>, Vec<NodeId>, Option<NodeId>);

/// Canonicalization pass with an iteration cap
#[derive(Debug, Clone)]
pub struct CanonicalizerPhase {
    max_iterations: usize,
}

impl CanonicalizerPhase {
    /// Create a canonicalizer with the default cap
    pub fn new() -> Self {
        Self { max_iterations: 32 }
    }

    /// Set the maximum number of rounds
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Canonicalize `graph` in place
    pub fn run(&self, graph: &mut StructuredGraph) -> CanonicalizerStats {
        let mut stats = CanonicalizerStats::default();
        for _ in 0..self.max_iterations {
            stats.rounds += 1;
            let before = stats.total();

            self.value_number(graph, &mut stats);
            for id in graph.node_ids() {
                if graph.contains(id) {
                    self.canonicalize(graph, id, &mut stats);
                }
            }

            if stats.total() == before {
                break;
            }
        }
        stats
    }

    fn value_number(&self, graph: &mut StructuredGraph, stats: &mut CanonicalizerStats) {
        let mut table: HashMap<ValueKey, NodeId> = HashMap::new();
        for id in graph.node_ids() {
            let Some(node) = graph.get(id) else {
                continue;
            };
            if !(node.kind.is_pure() || node.kind == NodeKind::Phi) || has_dead_edge(graph, node) {
                continue;
            }
            let key = (node.kind.clone(), node.inputs.clone(), node.control.clone(), node.state);
            match table.entry(key) {
                Entry::Occupied(existing) => {
                    replace_value(graph, id, *existing.get());
                    stats.value_numbered += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }
    }

    fn canonicalize(&self, graph: &mut StructuredGraph, id: NodeId, stats: &mut CanonicalizerStats) {
        let node = graph[id].clone();
        if has_dead_edge(graph, &node) {
            return;
        }
        match node.kind {
            NodeKind::Binary(op) => canonicalize_binary(graph, id, op, &node, stats),
            NodeKind::Unary(op) => canonicalize_unary(graph, id, op, &node, stats),
            NodeKind::Phi => simplify_phi(graph, id, &node, stats),
            NodeKind::Merge | NodeKind::LoopBegin => simplify_merge(graph, id, &node, stats),
            NodeKind::If => simplify_if(graph, id, &node, stats),
            NodeKind::Guard { check, .. } => simplify_guard(graph, id, check, &node, stats),
            _ => {}
        }
    }
}

impl Default for CanonicalizerPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for CanonicalizerPhase {
    fn name(&self) -> &'static str {
        "canonicalizer"
    }

    fn apply(&self, graph: &mut StructuredGraph) -> usize {
        self.run(graph).total()
    }
}

fn has_dead_edge(graph: &StructuredGraph, node: &Node) -> bool {
    node.edges().any(|edge| !graph.contains(edge))
}

fn replace_value(graph: &mut StructuredGraph, old: NodeId, new: NodeId) {
    graph.replace_at_usages(old, new);
    graph.remove(old);
}

fn constant_of(graph: &StructuredGraph, id: NodeId) -> Option<Value> {
    graph.get(id).and_then(|node| node.kind.as_constant())
}

fn canonicalize_binary(
    graph: &mut StructuredGraph,
    id: NodeId,
    op: BinaryOp,
    node: &Node,
    stats: &mut CanonicalizerStats,
) {
    let (x, y) = (node.inputs[0], node.inputs[1]);
    let (cx, cy) = (constant_of(graph, x), constant_of(graph, y));

    if let (Some(a), Some(b)) = (cx, cy) {
        // Folding errors stay in the graph and raise at run time
        if let Ok(value) = ops::binary(op, a, b) {
            let constant = graph.constant(value);
            replace_value(graph, id, constant);
            stats.folded += 1;
        }
        return;
    }

    if op.is_commutative() && cx.is_some() {
        graph[id].inputs.swap(0, 1);
        stats.simplified += 1;
        return;
    }

    let zero = Some(Value::Int(0));
    let one = Some(Value::Int(1));
    let replacement = match op {
        BinaryOp::Add if cy == zero => Some(x),
        BinaryOp::Sub if cy == zero => Some(x),
        BinaryOp::Sub if x == y => Some(graph.constant(Value::Int(0))),
        BinaryOp::Mul if cy == one => Some(x),
        BinaryOp::Mul if cy == zero => Some(graph.constant(Value::Int(0))),
        BinaryOp::Equal if x == y => Some(graph.constant(Value::Bool(true))),
        BinaryOp::LessThan if x == y => Some(graph.constant(Value::Bool(false))),
        _ => None,
    };
    if let Some(replacement) = replacement {
        replace_value(graph, id, replacement);
        stats.simplified += 1;
    }
}

fn canonicalize_unary(
    graph: &mut StructuredGraph,
    id: NodeId,
    op: UnaryOp,
    node: &Node,
    stats: &mut CanonicalizerStats,
) {
    let x = node.inputs[0];
    if let Some(value) = constant_of(graph, x) {
        if let Ok(value) = ops::unary(op, value) {
            let constant = graph.constant(value);
            replace_value(graph, id, constant);
            stats.folded += 1;
        }
        return;
    }
    // !!x => x, -(-x) => x
    let inner = &graph[x];
    if inner.kind == NodeKind::Unary(op) {
        let original = inner.inputs[0];
        replace_value(graph, id, original);
        stats.simplified += 1;
    }
}

fn simplify_phi(graph: &mut StructuredGraph, id: NodeId, node: &Node, stats: &mut CanonicalizerStats) {
    let mut distinct = node.inputs.iter().copied().filter(|input| *input != id);
    let Some(first) = distinct.next() else {
        return;
    };
    if distinct.all(|input| input == first) {
        replace_value(graph, id, first);
        stats.control_simplified += 1;
    }
}

/// A merge left with a single predecessor is spliced out, its phis
/// replaced by their only input
fn simplify_merge(graph: &mut StructuredGraph, id: NodeId, node: &Node, stats: &mut CanonicalizerStats) {
    if node.control.len() != 1 {
        return;
    }
    let predecessor = node.control[0];
    for phi in graph.phis_of(id) {
        let input = graph[phi].inputs[0];
        replace_value(graph, phi, input);
    }
    graph.replace_control(id, predecessor);
    graph.remove(id);
    stats.control_simplified += 1;
}

fn simplify_if(graph: &mut StructuredGraph, id: NodeId, node: &Node, stats: &mut CanonicalizerStats) {
    let Some(Value::Bool(condition)) = constant_of(graph, node.inputs[0]) else {
        return;
    };
    let successors = graph.successors(id);
    let [on_true, on_false] = successors[..] else {
        return;
    };
    let taken = if condition { on_true } else { on_false };

    graph.replace_control(taken, node.control[0]);
    graph.remove(taken);
    graph.remove(id);
    graph.kill_unreachable_control();
    stats.control_simplified += 1;
}

fn simplify_guard(
    graph: &mut StructuredGraph,
    id: NodeId,
    check: GuardCheck,
    node: &Node,
    stats: &mut CanonicalizerStats,
) {
    let input = node.inputs[0];
    let redundant = match (constant_of(graph, input), check) {
        (Some(value), _) => check.holds(&value),
        (None, GuardCheck::Type(info)) => graph[input].kind.stamp() == Some(info),
        (None, GuardCheck::Condition(_)) => false,
    } || dominated_by_same_guard(graph, node.control[0], check, input);

    if redundant {
        graph.unlink_fixed(id);
        stats.guards_removed += 1;
    }
}

/// Walk up the single-predecessor control chain looking for an identical
/// guard; merges stop the walk
fn dominated_by_same_guard(
    graph: &StructuredGraph,
    mut current: NodeId,
    check: GuardCheck,
    input: NodeId,
) -> bool {
    while let Some(node) = graph.get(current) {
        match &node.kind {
            NodeKind::Guard { check: other, .. } if *other == check && node.inputs[0] == input => {
                return true
            }
            NodeKind::Start | NodeKind::Merge | NodeKind::LoopBegin => return false,
            _ => match node.control.first() {
                Some(pred) => current = *pred,
                None => return false,
            },
        }
    }
    false
}
