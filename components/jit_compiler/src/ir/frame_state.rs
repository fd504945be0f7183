//! Frame state descriptions
//!
//! A `FrameState` node records what the interpreter needs to continue a
//! root at one program point. Its inputs are, in order, the argument
//! values, the local slot values and the operand stack (bottom first). Its
//! `state` edge points at the caller's frame state when the root was
//! inlined, so one chain describes every virtual frame.

use crate::ir::graph::StructuredGraph;
use crate::ir::node::{NodeId, NodeKind};
use interpreter::{AstNodeId, CallTargetId, FrameSnapshot, ResumeMode};
use core_types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape and position of one virtual interpreter frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameStateDesc {
    /// Root the frame belongs to
    pub target: CallTargetId,
    /// Resume point
    pub node: AstNodeId,
    /// How to resume at `node`
    pub mode: ResumeMode,
    /// Number of argument inputs
    pub arguments: u32,
    /// Number of local inputs
    pub locals: u32,
    /// Number of operand stack inputs
    pub stack: u32,
}

impl FrameStateDesc {
    /// Total number of value inputs
    pub fn value_count(&self) -> usize {
        (self.arguments + self.locals + self.stack) as usize
    }
}

impl fmt::Display for FrameStateDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameState({}{}, {:?}, args={}, locals={}, stack={})",
            self.target, self.node, self.mode, self.arguments, self.locals, self.stack
        )
    }
}

/// Rebuild the interpreter frames described by the state chain at `state`
///
/// `value_of` supplies the runtime value of each input node. Returns `None`
/// if the chain is broken or a value is unavailable.
pub fn materialize(
    graph: &StructuredGraph,
    state: NodeId,
    value_of: &mut dyn FnMut(NodeId) -> Option<Value>,
) -> Option<FrameSnapshot> {
    let node = graph.get(state)?;
    let NodeKind::FrameState(desc) = &node.kind else {
        return None;
    };
    if node.inputs.len() != desc.value_count() {
        return None;
    }

    let mut values = Vec::with_capacity(node.inputs.len());
    for input in &node.inputs {
        values.push(value_of(*input)?);
    }
    let stack = values.split_off((desc.arguments + desc.locals) as usize);
    let locals = values.split_off(desc.arguments as usize);

    let outer = match node.state {
        Some(outer) => Some(Box::new(materialize(graph, outer, value_of)?)),
        None => None,
    };

    Some(FrameSnapshot {
        target: desc.target,
        node: desc.node,
        mode: desc.mode,
        arguments: values,
        locals,
        stack,
        outer,
    })
}
