//! Interpreter frames and resumable frame snapshots

use crate::ast::{AstNodeId, CallTargetId};
use core_types::Value;
use serde::{Deserialize, Serialize};

/// Activation record of one interpreted invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Arguments as passed by the caller
    pub arguments: Vec<Value>,
    /// Local slots, initialized to null
    pub locals: Vec<Value>,
}

impl CallFrame {
    /// Create a new call frame
    pub fn new(arguments: Vec<Value>, local_count: usize) -> Self {
        Self {
            arguments,
            locals: vec![Value::Null; local_count],
        }
    }

    /// Read an argument; missing arguments read as null
    pub fn argument(&self, index: usize) -> Value {
        self.arguments.get(index).copied().unwrap_or_default()
    }
}

/// Where interpretation picks up when a snapshot is resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResumeMode {
    /// Re-run the root from the beginning with the recorded arguments
    Start,
    /// The node's operands are on the stack; the node has not acted yet
    BeforeNode,
    /// The call node has returned; its result is the last stack entry
    AfterCall,
}

/// Materialized interpreter state of one frame, plus its callers
///
/// `stack` is ordered bottom to top: the pending operands of the outermost
/// enclosing node come first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Root this frame belongs to
    pub target: CallTargetId,
    /// Resume point
    pub node: AstNodeId,
    /// How to resume at `node`
    pub mode: ResumeMode,
    /// Argument values
    pub arguments: Vec<Value>,
    /// Local slot values
    pub locals: Vec<Value>,
    /// Operand stack
    pub stack: Vec<Value>,
    /// Caller frame when this frame was inlined
    pub outer: Option<Box<FrameSnapshot>>,
}

impl FrameSnapshot {
    /// Number of frames in the chain, this one included
    pub fn depth(&self) -> usize {
        1 + self.outer.as_ref().map_or(0, |outer| outer.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_frame_new() {
        let frame = CallFrame::new(vec![Value::Int(1)], 2);
        assert_eq!(frame.locals, vec![Value::Null, Value::Null]);
        assert_eq!(frame.argument(0), Value::Int(1));
        assert_eq!(frame.argument(5), Value::Null);
    }

    #[test]
    fn test_snapshot_depth() {
        let outer = FrameSnapshot {
            target: CallTargetId(0),
            node: AstNodeId(3),
            mode: ResumeMode::AfterCall,
            arguments: vec![],
            locals: vec![],
            stack: vec![],
            outer: None,
        };
        let inner = FrameSnapshot {
            target: CallTargetId(1),
            node: AstNodeId(1),
            mode: ResumeMode::BeforeNode,
            arguments: vec![],
            locals: vec![],
            stack: vec![Value::Int(1)],
            outer: Some(Box::new(outer)),
        };
        assert_eq!(inner.depth(), 2);
    }
}
