//! Graph rendering
//!
//! [`GraphPrinter::canonical`] produces a deterministic text form that does
//! not depend on arena indices: fixed nodes are numbered breadth-first from
//! start (`IfTrue` before `IfFalse`), then floating nodes depth-first through
//! the inputs and states of the fixed nodes. Two graphs with the same shape
//! render identically no matter in which order their nodes were created.

use crate::ir::graph::StructuredGraph;
use crate::ir::node::NodeId;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write;

/// One node of a [`GraphDump`]
#[derive(Debug, Clone, Serialize)]
pub struct DumpNode {
    /// Arena index
    pub id: u32,
    /// Rendered kind
    pub kind: String,
    /// Data inputs
    pub inputs: Vec<u32>,
    /// Control edges
    pub control: Vec<u32>,
    /// Frame state edge
    pub state: Option<u32>,
}

/// Serializable snapshot of a graph for debugging
#[derive(Debug, Clone, Serialize)]
pub struct GraphDump {
    /// Graph name
    pub name: String,
    /// Live nodes in arena order
    pub nodes: Vec<DumpNode>,
}

/// Renders graphs for comparison and debugging
pub struct GraphPrinter;

impl GraphPrinter {
    /// Deterministic text rendering suitable for equality checks
    pub fn canonical(graph: &StructuredGraph) -> String {
        let order = Self::canonical_order(graph);
        let numbers: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(n, id)| (*id, n)).collect();
        let number = |id: &NodeId| {
            numbers
                .get(id)
                .map_or_else(|| "?".to_string(), |n| n.to_string())
        };

        let mut out = String::new();
        for (n, id) in order.iter().enumerate() {
            let node = &graph[*id];
            let _ = write!(out, "{} {}", n, node.kind);
            if !node.inputs.is_empty() {
                let inputs: Vec<String> = node.inputs.iter().map(number).collect();
                let _ = write!(out, " inputs=[{}]", inputs.join(","));
            }
            if !node.control.is_empty() {
                let control: Vec<String> = node.control.iter().map(number).collect();
                let _ = write!(out, " control=[{}]", control.join(","));
            }
            if let Some(state) = &node.state {
                let _ = write!(out, " state={}", number(state));
            }
            out.push('\n');
        }
        out
    }

    /// Node visiting order used by [`GraphPrinter::canonical`]
    pub fn canonical_order(graph: &StructuredGraph) -> Vec<NodeId> {
        let successors = graph.successor_map();
        let mut order = Vec::new();
        let mut seen = HashSet::new();

        let mut worklist = VecDeque::from([graph.start()]);
        while let Some(id) = worklist.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(next) = successors.get(&id) {
                worklist.extend(next.iter().copied());
            }
        }

        let fixed = order.clone();
        for id in fixed {
            Self::visit_floating(graph, id, &mut order, &mut seen, true);
        }
        // Leftovers (unreachable code) fall back to arena order
        for (id, _) in graph.iter() {
            if !seen.contains(&id) {
                seen.insert(id);
                order.push(id);
            }
        }
        order
    }

    fn visit_floating(
        graph: &StructuredGraph,
        id: NodeId,
        order: &mut Vec<NodeId>,
        seen: &mut HashSet<NodeId>,
        is_root: bool,
    ) {
        if !is_root {
            if !seen.insert(id) {
                return;
            }
            order.push(id);
        }
        let Some(node) = graph.get(id) else {
            return;
        };
        let edges: Vec<NodeId> = node.inputs.iter().copied().chain(node.state).collect();
        for edge in edges {
            if graph.get(edge).is_some_and(|n| !n.kind.is_fixed()) {
                Self::visit_floating(graph, edge, order, seen, false);
            }
        }
    }

    /// Serializable node list in arena order
    pub fn dump(graph: &StructuredGraph) -> GraphDump {
        GraphDump {
            name: graph.name().to_string(),
            nodes: graph
                .iter()
                .map(|(id, node)| DumpNode {
                    id: id.0,
                    kind: node.kind.to_string(),
                    inputs: node.inputs.iter().map(|n| n.0).collect(),
                    control: node.control.iter().map(|n| n.0).collect(),
                    state: node.state.map(|n| n.0),
                })
                .collect(),
        }
    }

    /// Dump as pretty-printed JSON
    pub fn to_json(graph: &StructuredGraph) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::dump(graph))
    }
}
