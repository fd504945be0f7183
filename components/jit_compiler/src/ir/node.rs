//! Graph node kinds
//!
//! Nodes are either *fixed* (they sit on the control-flow chain and have
//! control predecessors) or *floating* (pure values placed only by their
//! data dependencies).

use crate::deopt::DeoptReason;
use crate::ir::frame_state::FrameStateDesc;
use core_types::{TypeInfo, Value};
use interpreter::{BinaryOp, CallSiteId, CallTargetId, UnaryOp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a node in its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// What a guard checks about its single input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardCheck {
    /// The value has the given type
    Type(TypeInfo),
    /// The value is the given boolean
    Condition(bool),
}

impl GuardCheck {
    /// Whether `value` passes this check
    pub fn holds(&self, value: &Value) -> bool {
        match self {
            GuardCheck::Type(info) => info.matches(value),
            GuardCheck::Condition(expected) => value.as_bool() == Some(*expected),
        }
    }
}

/// Kinds of graph nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    // Fixed nodes
    /// Unique entry
    Start,
    /// Exit with the value of input 0
    Return,
    /// Two-way branch on input 0; successors are one `IfTrue` and one `IfFalse`
    If,
    /// Projection taken when the condition is true
    IfTrue,
    /// Projection taken when the condition is false
    IfFalse,
    /// Join of forward control paths
    Merge,
    /// Loop header; control input 0 is the entry, the rest are back edges
    LoopBegin,
    /// Residual call; inputs are the arguments
    Invoke {
        /// Callee
        target: CallTargetId,
        /// Call site in the enclosing root
        call_site: CallSiteId,
    },
    /// Speculative check on input 0; deoptimizes through its frame state
    Guard {
        /// Check performed
        check: GuardCheck,
        /// Reason reported on failure
        reason: DeoptReason,
    },
    /// Unconditional transfer to the interpreter
    Deoptimize {
        /// Reason reported
        reason: DeoptReason,
    },

    // Floating nodes
    /// Incoming argument
    Parameter(usize),
    /// Compile-time constant
    Constant(Value),
    /// Binary operation on inputs 0 and 1
    Binary(BinaryOp),
    /// Unary operation on input 0
    Unary(UnaryOp),
    /// Value join; control input 0 is the merge, input i flows from its predecessor i
    Phi,
    /// Interpreter state description; see [`FrameStateDesc`]
    FrameState(FrameStateDesc),
}

impl NodeKind {
    /// Whether the node sits on the control-flow chain
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            NodeKind::Start
                | NodeKind::Return
                | NodeKind::If
                | NodeKind::IfTrue
                | NodeKind::IfFalse
                | NodeKind::Merge
                | NodeKind::LoopBegin
                | NodeKind::Invoke { .. }
                | NodeKind::Guard { .. }
                | NodeKind::Deoptimize { .. }
        )
    }

    /// Whether the node joins control paths
    pub fn is_merge(&self) -> bool {
        matches!(self, NodeKind::Merge | NodeKind::LoopBegin)
    }

    /// Whether the node ends a control path
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Return | NodeKind::Deoptimize { .. })
    }

    /// Whether the node can transfer execution back to the interpreter
    pub fn can_deoptimize(&self) -> bool {
        matches!(
            self,
            NodeKind::Guard { .. } | NodeKind::Deoptimize { .. } | NodeKind::Invoke { .. }
        )
    }

    /// Whether the node is a pure value that may be shared or recomputed
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            NodeKind::Parameter(_)
                | NodeKind::Constant(_)
                | NodeKind::Binary(_)
                | NodeKind::Unary(_)
                | NodeKind::FrameState(_)
        )
    }

    /// Constant payload, if any
    pub fn as_constant(&self) -> Option<Value> {
        match self {
            NodeKind::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Type every value of this node is known to have
    pub fn stamp(&self) -> Option<TypeInfo> {
        match self {
            NodeKind::Constant(value) => Some(value.type_info()),
            NodeKind::Binary(op) => Some(op.result_type()),
            NodeKind::Unary(op) => Some(op.result_type()),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Start => write!(f, "Start"),
            NodeKind::Return => write!(f, "Return"),
            NodeKind::If => write!(f, "If"),
            NodeKind::IfTrue => write!(f, "IfTrue"),
            NodeKind::IfFalse => write!(f, "IfFalse"),
            NodeKind::Merge => write!(f, "Merge"),
            NodeKind::LoopBegin => write!(f, "LoopBegin"),
            NodeKind::Invoke { target, call_site } => write!(f, "Invoke({}{})", target, call_site),
            NodeKind::Guard { check, reason } => write!(f, "Guard({:?}, {:?})", check, reason),
            NodeKind::Deoptimize { reason } => write!(f, "Deoptimize({:?})", reason),
            NodeKind::Parameter(index) => write!(f, "Parameter({})", index),
            NodeKind::Constant(value) => write!(f, "Constant({})", value),
            NodeKind::Binary(op) => write!(f, "{}", op.mnemonic()),
            NodeKind::Unary(op) => write!(f, "{}", op.mnemonic()),
            NodeKind::Phi => write!(f, "Phi"),
            NodeKind::FrameState(desc) => write!(f, "{}", desc),
        }
    }
}

/// A graph node: kind plus edges to other nodes
///
/// Edges are arena handles; a node does not own what it points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    /// Kind of the node
    pub kind: NodeKind,
    /// Data inputs
    pub inputs: Vec<NodeId>,
    /// Control predecessors (fixed nodes) or the owning merge (phis)
    pub control: Vec<NodeId>,
    /// Frame state for deoptimizing nodes; outer state for frame states
    pub state: Option<NodeId>,
}

impl Node {
    /// Create a node with no edges
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            control: Vec::new(),
            state: None,
        }
    }

    /// Set data inputs
    pub fn with_inputs(mut self, inputs: Vec<NodeId>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set control predecessors
    pub fn with_control(mut self, control: Vec<NodeId>) -> Self {
        self.control = control;
        self
    }

    /// Set the frame state
    pub fn with_state(mut self, state: Option<NodeId>) -> Self {
        self.state = state;
        self
    }

    /// Every edge target: inputs, control, then state
    pub fn edges(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs
            .iter()
            .chain(self.control.iter())
            .copied()
            .chain(self.state)
    }
}
