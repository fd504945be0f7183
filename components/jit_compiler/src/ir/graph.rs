//! Arena-backed graph
//!
//! All nodes live in one `Vec`; a [`NodeId`] is an index into it and stays
//! valid until the node is removed. Removal leaves a tombstone so other
//! handles never shift. The graph is owned by a single compilation and is
//! mutated in place by one pass at a time.

use crate::ir::node::{Node, NodeId, NodeKind};
use core_types::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Structural problems found by [`StructuredGraph::verify`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The start node is missing or not a `Start`
    #[error("graph has no start node")]
    MissingStart,
    /// More than one `Start` node
    #[error("extra start node {0}")]
    ExtraStart(NodeId),
    /// An edge points at a removed node
    #[error("{node} references removed node {target}")]
    DanglingEdge {
        /// Node holding the edge
        node: NodeId,
        /// Removed node
        target: NodeId,
    },
    /// Wrong number of inputs or control edges for the node's kind
    #[error("{node} ({kind}) has {found} {edge} edges, expected {expected}")]
    BadArity {
        /// Offending node
        node: NodeId,
        /// Kind name
        kind: String,
        /// Which edge list
        edge: &'static str,
        /// Expected count (or lower bound)
        expected: usize,
        /// Actual count
        found: usize,
    },
    /// A control edge points at a floating node (or a phi's at a non-merge)
    #[error("{node} has control edge to {target}, which cannot be a control predecessor")]
    BadControl {
        /// Node holding the edge
        node: NodeId,
        /// Edge target
        target: NodeId,
    },
    /// A fixed node has the wrong number of control successors
    #[error("{node} has {found} control successors")]
    BadSuccessors {
        /// Offending node
        node: NodeId,
        /// Actual count
        found: usize,
    },
    /// A deoptimizing node lacks a valid frame state chain
    #[error("{0} can deoptimize but has no valid frame state")]
    MissingFrameState(NodeId),
}

/// Mutable data/control-flow graph for one compilation
#[derive(Debug, Clone)]
pub struct StructuredGraph {
    name: String,
    nodes: Vec<Option<Node>>,
    start: NodeId,
    constants: HashMap<Value, NodeId>,
}

impl StructuredGraph {
    /// Create a graph holding only its start node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: vec![Some(Node::new(NodeKind::Start))],
            start: NodeId(0),
            constants: HashMap::new(),
        }
    }

    /// Graph name (the root it was built from)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique start node
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Append a node
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    /// Append a fixed node after `predecessor`
    pub fn add_fixed(&mut self, kind: NodeKind, predecessor: NodeId) -> NodeId {
        self.add(Node::new(kind).with_control(vec![predecessor]))
    }

    /// Constant node for `value`, shared with earlier requests while it lives
    pub fn constant(&mut self, value: Value) -> NodeId {
        if let Some(&id) = self.constants.get(&value) {
            if self.get(id).is_some_and(|node| node.kind == NodeKind::Constant(value)) {
                return id;
            }
        }
        let id = self.add(Node::new(NodeKind::Constant(value)));
        self.constants.insert(value, id);
        id
    }

    /// Live node, if any
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Live node, mutably
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Whether `id` names a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Live nodes in arena order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| (NodeId(index as u32), node)))
    }

    /// Handles of all live nodes in arena order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of live nodes whose kind satisfies `predicate`
    pub fn count(&self, predicate: impl Fn(&NodeKind) -> bool) -> usize {
        self.iter().filter(|(_, node)| predicate(&node.kind)).count()
    }

    /// Live nodes whose kind satisfies `predicate`
    pub fn filter(&self, predicate: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| predicate(&node.kind))
            .map(|(id, _)| id)
            .collect()
    }

    /// Remove a node, leaving a tombstone
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.get_mut(id.index()).and_then(Option::take)
    }

    /// Redirect every data and state edge pointing at `old` to `new`
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) {
        for node in self.nodes.iter_mut().flatten() {
            for input in node.inputs.iter_mut() {
                if *input == old {
                    *input = new;
                }
            }
            if node.state == Some(old) {
                node.state = Some(new);
            }
        }
    }

    /// Redirect every control edge pointing at `old` to `new`
    pub fn replace_control(&mut self, old: NodeId, new: NodeId) {
        for node in self.nodes.iter_mut().flatten() {
            for control in node.control.iter_mut() {
                if *control == old {
                    *control = new;
                }
            }
        }
    }

    /// Remove a fixed node with one predecessor, splicing its successor
    /// onto that predecessor
    pub fn unlink_fixed(&mut self, id: NodeId) -> Option<Node> {
        let predecessor = *self.get(id)?.control.first()?;
        self.replace_control(id, predecessor);
        self.remove(id)
    }

    /// Fixed nodes whose control predecessors include `id`
    ///
    /// For an `If`, the `IfTrue` projection comes first.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let mut successors: Vec<NodeId> = self
            .iter()
            .filter(|(_, node)| node.kind.is_fixed() && node.control.contains(&id))
            .map(|(succ, _)| succ)
            .collect();
        successors.sort_by_key(|succ| match self[*succ].kind {
            NodeKind::IfTrue => 0,
            NodeKind::IfFalse => 1,
            _ => 2,
        });
        successors
    }

    /// Successor map for every live fixed node, computed in one sweep
    pub fn successor_map(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut map: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (id, node) in self.iter().filter(|(_, node)| node.kind.is_fixed()) {
            for &pred in &node.control {
                let entry = map.entry(pred).or_default();
                if !entry.contains(&id) {
                    entry.push(id);
                }
            }
        }
        for successors in map.values_mut() {
            successors.sort_by_key(|succ| match self[*succ].kind {
                NodeKind::IfTrue => (0, *succ),
                NodeKind::IfFalse => (1, *succ),
                _ => (2, *succ),
            });
        }
        map
    }

    /// Phis attached to a merge, in arena order
    pub fn phis_of(&self, merge: NodeId) -> Vec<NodeId> {
        self.filter(|kind| *kind == NodeKind::Phi)
            .into_iter()
            .filter(|phi| self[*phi].control.first() == Some(&merge))
            .collect()
    }

    /// Data and state users of each live node
    pub fn usages(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut usages: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (id, node) in self.iter() {
            for input in node.inputs.iter().copied().chain(node.state) {
                usages.entry(input).or_default().push(id);
            }
        }
        usages
    }

    /// Fixed nodes reachable from start along control successors
    pub fn reachable_control(&self) -> HashSet<NodeId> {
        let successors = self.successor_map();
        let mut reached = HashSet::new();
        let mut worklist = VecDeque::from([self.start]);
        while let Some(id) = worklist.pop_front() {
            if !reached.insert(id) {
                continue;
            }
            if let Some(next) = successors.get(&id) {
                worklist.extend(next.iter().copied());
            }
        }
        reached
    }

    /// Delete fixed nodes that control flow can no longer reach, dropping
    /// their edges into merges (and the matching phi inputs)
    ///
    /// Returns the number of nodes removed.
    pub fn kill_unreachable_control(&mut self) -> usize {
        let reached = self.reachable_control();
        let dead: Vec<NodeId> = self
            .iter()
            .filter(|(id, node)| node.kind.is_fixed() && !reached.contains(id))
            .map(|(id, _)| id)
            .collect();
        if dead.is_empty() {
            return 0;
        }
        for id in &dead {
            self.remove(*id);
        }

        let merges = self.filter(NodeKind::is_merge);
        for merge in merges {
            let control = self[merge].control.clone();
            let live: Vec<bool> = control.iter().map(|pred| self.contains(*pred)).collect();
            if live.iter().all(|alive| *alive) {
                continue;
            }
            for phi in self.phis_of(merge) {
                let node = &mut self[phi];
                node.inputs = node
                    .inputs
                    .iter()
                    .zip(&live)
                    .filter(|(_, alive)| **alive)
                    .map(|(input, _)| *input)
                    .collect();
            }
            let kept: Vec<NodeId> = control
                .into_iter()
                .zip(&live)
                .filter(|(_, alive)| **alive)
                .map(|(pred, _)| pred)
                .collect();
            self[merge].control = kept;
        }
        dead.len()
    }

    /// Drop every frame state edge
    pub fn clear_states(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.state = None;
        }
    }

    /// Check structural well-formedness
    pub fn verify(&self) -> Result<(), GraphError> {
        match self.get(self.start) {
            Some(node) if node.kind == NodeKind::Start => {}
            _ => return Err(GraphError::MissingStart),
        }

        let successors = self.successor_map();
        for (id, node) in self.iter() {
            if node.kind == NodeKind::Start && id != self.start {
                return Err(GraphError::ExtraStart(id));
            }
            for target in node.edges() {
                if !self.contains(target) {
                    return Err(GraphError::DanglingEdge { node: id, target });
                }
            }
            self.verify_arity(id, node)?;

            if node.kind.is_fixed() {
                let found = successors.get(&id).map_or(0, Vec::len);
                let expected = match node.kind {
                    NodeKind::Return | NodeKind::Deoptimize { .. } => 0,
                    NodeKind::If => 2,
                    _ => 1,
                };
                if found != expected {
                    return Err(GraphError::BadSuccessors { node: id, found });
                }
            }
        }
        Ok(())
    }

    /// Check that every deoptimizing node has a frame state chain
    pub fn verify_frame_states(&self) -> Result<(), GraphError> {
        for (id, node) in self.iter() {
            if !node.kind.can_deoptimize() {
                continue;
            }
            let mut state = node.state;
            let mut depth = 0;
            if state.is_none() {
                return Err(GraphError::MissingFrameState(id));
            }
            while let Some(current) = state {
                match self.get(current) {
                    Some(Node {
                        kind: NodeKind::FrameState(desc),
                        inputs,
                        state: outer,
                        ..
                    }) if inputs.len() == desc.value_count() => state = *outer,
                    _ => return Err(GraphError::MissingFrameState(id)),
                }
                depth += 1;
                if depth > self.nodes.len() {
                    return Err(GraphError::MissingFrameState(id));
                }
            }
        }
        Ok(())
    }

    fn verify_arity(&self, id: NodeId, node: &Node) -> Result<(), GraphError> {
        let arity = |edge: &'static str, expected: usize, found: usize, at_least: bool| {
            let ok = if at_least { found >= expected } else { found == expected };
            if ok {
                Ok(())
            } else {
                Err(GraphError::BadArity {
                    node: id,
                    kind: node.kind.to_string(),
                    edge,
                    expected,
                    found,
                })
            }
        };

        let inputs = node.inputs.len();
        let control = node.control.len();
        match &node.kind {
            NodeKind::Start => {
                arity("input", 0, inputs, false)?;
                arity("control", 0, control, false)?;
            }
            NodeKind::Return | NodeKind::If | NodeKind::Guard { .. } => {
                arity("input", 1, inputs, false)?;
                arity("control", 1, control, false)?;
            }
            NodeKind::IfTrue | NodeKind::IfFalse => {
                arity("input", 0, inputs, false)?;
                arity("control", 1, control, false)?;
                if self.get(node.control[0]).map(|pred| &pred.kind) != Some(&NodeKind::If) {
                    return Err(GraphError::BadControl {
                        node: id,
                        target: node.control[0],
                    });
                }
            }
            NodeKind::Merge | NodeKind::LoopBegin => {
                arity("input", 0, inputs, false)?;
                arity("control", 1, control, true)?;
            }
            NodeKind::Invoke { .. } => arity("control", 1, control, false)?,
            NodeKind::Deoptimize { .. } => {
                arity("input", 0, inputs, false)?;
                arity("control", 1, control, false)?;
            }
            NodeKind::Parameter(_) | NodeKind::Constant(_) => {
                arity("input", 0, inputs, false)?;
                arity("control", 0, control, false)?;
            }
            NodeKind::Binary(_) => {
                arity("input", 2, inputs, false)?;
                arity("control", 0, control, false)?;
            }
            NodeKind::Unary(_) => {
                arity("input", 1, inputs, false)?;
                arity("control", 0, control, false)?;
            }
            NodeKind::Phi => {
                arity("control", 1, control, false)?;
                let merge = node.control[0];
                match self.get(merge) {
                    Some(owner) if owner.kind.is_merge() => {
                        arity("input", owner.control.len(), inputs, false)?
                    }
                    _ => return Err(GraphError::BadControl { node: id, target: merge }),
                }
            }
            NodeKind::FrameState(desc) => {
                arity("input", desc.value_count(), inputs, false)?;
                arity("control", 0, control, false)?;
            }
        }

        if node.kind.is_fixed() {
            for &pred in &node.control {
                if !self.get(pred).is_some_and(|pred| pred.kind.is_fixed()) {
                    return Err(GraphError::BadControl { node: id, target: pred });
                }
            }
        }
        Ok(())
    }
}

impl Index<NodeId> for StructuredGraph {
    type Output = Node;

    /// Panics if the node was removed
    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("{} is not a live node of graph '{}'", id, self.name),
        }
    }
}

impl IndexMut<NodeId> for StructuredGraph {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("{} is not a live node", id),
        }
    }
}
