//! AST interpreter
//!
//! Executes a [`RootNode`] directly, recording profile feedback as it goes,
//! and can resume a root part-way through from a [`FrameSnapshot`] taken by
//! compiled code that deoptimized.

use crate::ast::{AstNodeId, Node, NodeKind, RootNode};
use crate::call_frame::{CallFrame, FrameSnapshot, ResumeMode};
use crate::dispatch::CallDispatch;
use crate::ops;
use crate::profile::RootProfile;
use core_types::{GuestError, Value};
use std::collections::VecDeque;

/// How evaluating a node finished
#[derive(Debug, Clone, Copy, PartialEq)]
enum Completion {
    Normal(Value),
    Return(Value),
}

impl Completion {
    fn into_value(self) -> Value {
        match self {
            Completion::Normal(value) | Completion::Return(value) => value,
        }
    }
}

/// Evaluate a node for its value, propagating a `Return` to the caller
macro_rules! eval_value {
    ($self:ident, $node:expr) => {
        match $self.eval($node)? {
            Completion::Normal(value) => value,
            ret @ Completion::Return(_) => return Ok(ret),
        }
    };
}

/// Tree-walking interpreter for one activation of a root
pub struct Interpreter<'a> {
    root: &'a RootNode,
    dispatch: &'a dyn CallDispatch,
    profile: Option<&'a RootProfile>,
    frame: CallFrame,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter for `root` that routes calls through `dispatch`
    pub fn new(root: &'a RootNode, dispatch: &'a dyn CallDispatch) -> Self {
        Self {
            root,
            dispatch,
            profile: None,
            frame: CallFrame::new(Vec::new(), root.local_count()),
        }
    }

    /// Record branch feedback into `profile` while executing
    pub fn with_profile(mut self, profile: &'a RootProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Run the root from the beginning
    pub fn execute(mut self, arguments: Vec<Value>) -> Result<Value, GuestError> {
        let root = self.root;
        self.frame = CallFrame::new(arguments, root.local_count());
        Ok(self.eval(root.body())?.into_value())
    }

    /// Continue the root from a snapshot of this frame
    ///
    /// Only the innermost frame is resumed; `snapshot.outer` is left to the
    /// caller, which feeds this frame's result into the outer frame's stack.
    pub fn resume(mut self, snapshot: &FrameSnapshot) -> Result<Value, GuestError> {
        tracing::trace!(
            root = self.root.name(),
            node = %snapshot.node,
            mode = ?snapshot.mode,
            "resuming interpreter"
        );

        if snapshot.mode == ResumeMode::Start {
            return self.execute(snapshot.arguments.clone());
        }

        let root = self.root;
        let mut frame = CallFrame::new(snapshot.arguments.clone(), root.local_count());
        for (slot, value) in frame.locals.iter_mut().zip(&snapshot.locals) {
            *slot = *value;
        }
        self.frame = frame;

        let path = root.path_to(snapshot.node).ok_or_else(|| {
            GuestError::internal(format!(
                "resume point {} not found in {}",
                snapshot.node,
                root.name()
            ))
        })?;
        let mut stack: VecDeque<Value> = snapshot.stack.iter().copied().collect();
        let completion = self.resume_along(&path, &mut stack, snapshot.mode)?;
        Ok(completion.into_value())
    }

    fn eval(&mut self, node: &Node) -> Result<Completion, GuestError> {
        match node.kind() {
            NodeKind::Constant(value) => Ok(Completion::Normal(*value)),
            NodeKind::ReadArgument(index) => Ok(Completion::Normal(self.frame.argument(*index))),
            NodeKind::ReadLocal(slot) => Ok(Completion::Normal(self.read_local(*slot)?)),
            NodeKind::Block(children) => self.eval_block(children, 0, Value::Null),
            _ => {
                let mut operands = Vec::new();
                for operand in node.operands() {
                    operands.push(eval_value!(self, operand));
                }
                self.complete(node, operands)
            }
        }
    }

    fn eval_block(
        &mut self,
        children: &[Node],
        from: usize,
        mut last: Value,
    ) -> Result<Completion, GuestError> {
        for child in &children[from..] {
            last = eval_value!(self, child);
        }
        Ok(Completion::Normal(last))
    }

    /// Perform a node's own action once its operands are known
    fn complete(&mut self, node: &Node, operands: Vec<Value>) -> Result<Completion, GuestError> {
        let operand = |index: usize| {
            operands.get(index).copied().ok_or_else(|| {
                GuestError::internal(format!("missing operand {} for node {}", index, node.id()))
            })
        };

        match node.kind() {
            NodeKind::WriteLocal(slot, _) => {
                let value = operand(0)?;
                self.write_local(*slot, value)?;
                Ok(Completion::Normal(value))
            }
            NodeKind::Binary(op, _, _) => {
                Ok(Completion::Normal(ops::binary(*op, operand(0)?, operand(1)?)?))
            }
            NodeKind::Unary(op, _) => Ok(Completion::Normal(ops::unary(*op, operand(0)?)?)),
            NodeKind::If(_, then_branch, else_branch) => {
                if self.condition(node.id(), operand(0)?)? {
                    self.eval(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch)
                } else {
                    Ok(Completion::Normal(Value::Null))
                }
            }
            NodeKind::While(_, body) => {
                if !self.condition(node.id(), operand(0)?)? {
                    return Ok(Completion::Normal(Value::Null));
                }
                eval_value!(self, body);
                self.run_loop(node)
            }
            NodeKind::Return(_) => Ok(Completion::Return(operand(0)?)),
            NodeKind::Call(target, _) => {
                Ok(Completion::Normal(self.dispatch.call(*target, operands)?))
            }
            _ => Err(GuestError::internal(format!(
                "node {} takes no operands",
                node.id()
            ))),
        }
    }

    fn run_loop(&mut self, node: &Node) -> Result<Completion, GuestError> {
        let NodeKind::While(condition, body) = node.kind() else {
            return Err(GuestError::internal(format!("node {} is not a loop", node.id())));
        };
        loop {
            let value = eval_value!(self, condition);
            if !self.condition(node.id(), value)? {
                return Ok(Completion::Normal(Value::Null));
            }
            eval_value!(self, body);
        }
    }

    /// Descend `path` towards the resume point, consuming the pending
    /// operands of each enclosing node from the front of `stack`
    fn resume_along(
        &mut self,
        path: &[&Node],
        stack: &mut VecDeque<Value>,
        mode: ResumeMode,
    ) -> Result<Completion, GuestError> {
        let node = path[0];
        if path.len() == 1 {
            return self.resume_at(node, stack, mode);
        }

        let next = path[1].id();
        let operands = node.operands();
        if let Some(position) = operands.iter().position(|operand| operand.id() == next) {
            let mut values = Vec::with_capacity(operands.len());
            for _ in 0..position {
                values.push(pop_operand(stack, node.id())?);
            }
            match self.resume_along(&path[1..], stack, mode)? {
                Completion::Normal(value) => values.push(value),
                ret @ Completion::Return(_) => return Ok(ret),
            }
            for operand in &operands[position + 1..] {
                values.push(eval_value!(self, operand));
            }
            return self.complete(node, values);
        }

        match node.kind() {
            NodeKind::Block(children) => {
                let index = children
                    .iter()
                    .position(|child| child.id() == next)
                    .ok_or_else(|| broken_path(node.id()))?;
                let last = match self.resume_along(&path[1..], stack, mode)? {
                    Completion::Normal(value) => value,
                    ret @ Completion::Return(_) => return Ok(ret),
                };
                self.eval_block(children, index + 1, last)
            }
            NodeKind::If(..) => self.resume_along(&path[1..], stack, mode),
            NodeKind::While(..) => {
                if let ret @ Completion::Return(_) = self.resume_along(&path[1..], stack, mode)? {
                    return Ok(ret);
                }
                self.run_loop(node)
            }
            _ => Err(broken_path(node.id())),
        }
    }

    fn resume_at(
        &mut self,
        node: &Node,
        stack: &mut VecDeque<Value>,
        mode: ResumeMode,
    ) -> Result<Completion, GuestError> {
        let completion = match mode {
            ResumeMode::BeforeNode => {
                let count = node.operands().len();
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(pop_operand(stack, node.id())?);
                }
                if !stack.is_empty() {
                    return Err(GuestError::internal(format!(
                        "{} extra stack values at {}",
                        stack.len(),
                        node.id()
                    )));
                }
                return self.complete(node, values);
            }
            ResumeMode::AfterCall => {
                if !matches!(node.kind(), NodeKind::Call(..)) {
                    return Err(GuestError::internal(format!(
                        "after-call resume at non-call node {}",
                        node.id()
                    )));
                }
                Completion::Normal(pop_operand(stack, node.id())?)
            }
            ResumeMode::Start => {
                return Err(GuestError::internal("start resume inside a root"));
            }
        };
        if !stack.is_empty() {
            return Err(GuestError::internal(format!(
                "{} extra stack values at {}",
                stack.len(),
                node.id()
            )));
        }
        Ok(completion)
    }

    fn condition(&mut self, node: AstNodeId, value: Value) -> Result<bool, GuestError> {
        let taken = ops::condition(value)?;
        if let Some(profile) = self.profile {
            profile.record_branch(node, taken);
        }
        Ok(taken)
    }

    fn read_local(&self, slot: usize) -> Result<Value, GuestError> {
        self.frame
            .locals
            .get(slot)
            .copied()
            .ok_or_else(|| GuestError::internal(format!("local slot {} out of range", slot)))
    }

    fn write_local(&mut self, slot: usize, value: Value) -> Result<(), GuestError> {
        let local = self
            .frame
            .locals
            .get_mut(slot)
            .ok_or_else(|| GuestError::internal(format!("local slot {} out of range", slot)))?;
        *local = value;
        Ok(())
    }
}

fn pop_operand(stack: &mut VecDeque<Value>, node: AstNodeId) -> Result<Value, GuestError> {
    stack
        .pop_front()
        .ok_or_else(|| GuestError::internal(format!("operand stack underflow at {}", node)))
}

fn broken_path(node: AstNodeId) -> GuestError {
    GuestError::internal(format!("resume path does not continue below {}", node))
}
