//! Partial evaluation of interpreter roots into graphs
//!
//! The evaluator walks a root's AST the way the interpreter would, but over
//! graph values instead of runtime values:
//! - Operations whose operands are all constants are folded on the spot
//! - Everything else becomes a residual graph node
//! - Call sites the [`InliningPlan`] marks inline are evaluated in place,
//!   their returns joined into the caller's continuation
//! - Remaining call sites become `Invoke` nodes
//!
//! Speculation comes from the call target's profile: monomorphic arguments
//! get entry type guards and one-sided branches are replaced by a guard.
//! Every guard, deoptimization and invoke carries a frame state that lets
//! the interpreter take over at exactly that point.

use crate::call_target::CallTarget;
use crate::deopt::DeoptReason;
use crate::error::{CompilationError, CompileResult};
use crate::inlining::{InliningPlan, PlanEntry};
use crate::ir::{FrameStateDesc, GuardCheck, Node as GraphNode, NodeId, NodeKind as GraphKind, StructuredGraph};
use crate::runtime::Runtime;
use core_types::{BranchOutcome, TypeInfo, Value};
use interpreter::{ops, AstNodeId, CallTargetId, Node, NodeKind, ResumeMode, RootNode};
use std::collections::HashMap;
use std::sync::Arc;

/// Unwrap a value on a live path; a path that ended propagates `None`
macro_rules! live {
    ($value:expr) => {
        match $value {
            Some(value) => value,
            None => return Ok(None),
        }
    };
}

/// Types proven by guards on the current control path
type Facts = HashMap<NodeId, TypeInfo>;

/// A control path reaching a join point
#[derive(Debug, Clone)]
struct Arrival {
    control: NodeId,
    value: NodeId,
    locals: Vec<NodeId>,
    facts: Facts,
}

/// How a branch will be emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    /// Only this side is reachable (constant or guarded)
    Fixed(bool),
    /// Both sides are emitted
    Dynamic,
    /// The path deoptimized
    Dead,
}

/// Virtual interpreter frame of one (possibly inlined) activation
struct Frame<'p> {
    target: Arc<CallTarget>,
    arguments: Vec<NodeId>,
    locals: Vec<NodeId>,
    /// Pending operands of enclosing nodes, bottom to top
    stack: Vec<NodeId>,
    plan: &'p [PlanEntry],
    outer_state: Option<NodeId>,
    returns: Vec<Arrival>,
}

/// Turns a call target plus its inlining plan into a graph
pub struct PartialEvaluator<'r> {
    runtime: &'r Runtime,
}

impl<'r> PartialEvaluator<'r> {
    /// Create an evaluator resolving callees through `runtime`
    pub fn new(runtime: &'r Runtime) -> Self {
        Self { runtime }
    }

    /// Evaluate `target` under `plan`
    ///
    /// Argument and branch speculation is taken from the target's profile.
    /// Any internal inconsistency aborts with an error; no partial graph is
    /// returned.
    pub fn evaluate(&self, target: &Arc<CallTarget>, plan: &InliningPlan) -> CompileResult<StructuredGraph> {
        if plan.root() != target.id() {
            return Err(CompilationError::fault(
                target.name(),
                format!("inlining plan was built for {}", plan.root()),
            ));
        }

        let root = Arc::clone(target.root());
        let mut graph = StructuredGraph::new(target.name());
        let argument_count = root.parameter_count().max(argument_count(root.body()));
        let arguments = (0..argument_count)
            .map(|index| graph.add(GraphNode::new(GraphKind::Parameter(index))))
            .collect();
        let null = graph.constant(Value::Null);
        let start = graph.start();

        let mut evaluation = Evaluation {
            runtime: self.runtime,
            graph,
            frame: Frame {
                target: Arc::clone(target),
                arguments,
                locals: vec![null; root.local_count()],
                stack: Vec::new(),
                plan: plan.entries(),
                outer_state: None,
                returns: Vec::new(),
            },
            control: Some(start),
            facts: Facts::new(),
        };
        evaluation.run_root(&root)?;

        let graph = evaluation.graph;
        graph.verify()?;
        tracing::debug!(
            target = target.name(),
            nodes = graph.node_count(),
            invokes = graph.count(|kind| matches!(kind, GraphKind::Invoke { .. })),
            "partial evaluation finished"
        );
        Ok(graph)
    }
}

/// One partial evaluation in progress
struct Evaluation<'r, 'p> {
    runtime: &'r Runtime,
    graph: StructuredGraph,
    frame: Frame<'p>,
    /// Fixed node the next fixed node attaches to; `None` once the path ended
    control: Option<NodeId>,
    facts: Facts,
}

impl<'p> Evaluation<'_, 'p> {
    fn run_root(&mut self, root: &RootNode) -> CompileResult<()> {
        self.guard_entry_types(root)?;
        let completed = self.eval(root.body())?;
        if let Some(arrival) = self.finish_frame(completed)? {
            self.graph.add(
                GraphNode::new(GraphKind::Return)
                    .with_inputs(vec![arrival.value])
                    .with_control(vec![arrival.control]),
            );
        }
        Ok(())
    }

    fn guard_entry_types(&mut self, root: &RootNode) -> CompileResult<()> {
        let profile = self.frame.target.profile();
        let speculated: Vec<(usize, TypeInfo)> = (0..root.parameter_count())
            .filter_map(|index| profile.argument_feedback(index).monomorphic().map(|info| (index, info)))
            .collect();
        if speculated.is_empty() {
            return Ok(());
        }

        let state = self.frame_state(root.body().id(), ResumeMode::Start);
        for (index, info) in speculated {
            let parameter = self.frame.arguments[index];
            self.guard_with_state(state, parameter, GuardCheck::Type(info), DeoptReason::TypeGuardFailure)?;
        }
        Ok(())
    }

    fn eval(&mut self, node: &Node) -> CompileResult<Option<NodeId>> {
        let depth = self.frame.stack.len();
        let result = self.eval_node(node);
        if matches!(result, Ok(None)) {
            self.frame.stack.truncate(depth);
        }
        result
    }

    fn eval_node(&mut self, node: &Node) -> CompileResult<Option<NodeId>> {
        match node.kind() {
            NodeKind::Constant(value) => Ok(Some(self.graph.constant(*value))),
            NodeKind::ReadArgument(index) => {
                let value = match self.frame.arguments.get(*index) {
                    Some(value) => *value,
                    None => self.graph.constant(Value::Null),
                };
                Ok(Some(value))
            }
            NodeKind::ReadLocal(slot) => match self.frame.locals.get(*slot) {
                Some(value) => Ok(Some(*value)),
                None => Err(self.fault(format!("read of local slot {} out of range", slot))),
            },
            NodeKind::Block(children) => {
                let mut last = self.graph.constant(Value::Null);
                for child in children {
                    last = live!(self.eval(child)?);
                }
                Ok(Some(last))
            }
            NodeKind::If(condition, then_branch, else_branch) => {
                self.eval_if(node.id(), condition, then_branch, else_branch.as_deref())
            }
            NodeKind::While(condition, body) => self.eval_while(node.id(), condition, body),
            _ => {
                let operands = node.operands();
                for operand in &operands {
                    let value = live!(self.eval(operand)?);
                    self.frame.stack.push(value);
                }
                let base = self.frame.stack.len() - operands.len();
                let values = self.frame.stack[base..].to_vec();
                self.complete(node, values)
            }
        }
    }

    /// Act on a node whose operands are on top of the virtual stack; the
    /// operands stay there until the node can no longer deoptimize
    fn complete(&mut self, node: &Node, operands: Vec<NodeId>) -> CompileResult<Option<NodeId>> {
        let id = node.id();
        match node.kind() {
            NodeKind::WriteLocal(slot, _) => {
                self.pop(1);
                let value = operands[0];
                match self.frame.locals.get_mut(*slot) {
                    Some(local) => *local = value,
                    None => return Err(self.fault(format!("write to local slot {} out of range", slot))),
                }
                Ok(Some(value))
            }
            NodeKind::Binary(op, _, _) => {
                let (lhs, rhs) = (operands[0], operands[1]);
                if let (Some(a), Some(b)) = (self.constant(lhs), self.constant(rhs)) {
                    return self.fold(id, ops::binary(*op, a, b).ok(), 2);
                }
                if let Some(expected) = op.operand_type() {
                    for operand in [lhs, rhs] {
                        if !self.ensure_type(id, operand, expected)? {
                            return Ok(None);
                        }
                    }
                }
                self.pop(2);
                Ok(Some(self.graph.add(
                    GraphNode::new(GraphKind::Binary(*op)).with_inputs(vec![lhs, rhs]),
                )))
            }
            NodeKind::Unary(op, _) => {
                let operand = operands[0];
                if let Some(value) = self.constant(operand) {
                    return self.fold(id, ops::unary(*op, value).ok(), 1);
                }
                if !self.ensure_type(id, operand, op.operand_type())? {
                    return Ok(None);
                }
                self.pop(1);
                Ok(Some(self.graph.add(
                    GraphNode::new(GraphKind::Unary(*op)).with_inputs(vec![operand]),
                )))
            }
            NodeKind::Return(_) => {
                self.pop(1);
                let control = self.tip()?;
                let arrival = Arrival {
                    control,
                    value: operands[0],
                    locals: Vec::new(),
                    facts: self.facts.clone(),
                };
                self.frame.returns.push(arrival);
                self.control = None;
                Ok(None)
            }
            NodeKind::Call(target, _) => {
                self.pop(operands.len());
                let plan: &'p [PlanEntry] = self.frame.plan;
                match plan.iter().find(|entry| entry.call_site == id && entry.is_inlined()) {
                    Some(entry) => self.inline(id, entry, operands),
                    None => self.invoke(id, *target, operands),
                }
            }
            _ => Err(self.fault(format!("cannot partially evaluate node {}", id))),
        }
    }

    /// Replace a node with its folded constant, or hand the failing
    /// operation back to the interpreter
    fn fold(&mut self, at: AstNodeId, folded: Option<Value>, operands: usize) -> CompileResult<Option<NodeId>> {
        match folded {
            Some(value) => {
                self.pop(operands);
                Ok(Some(self.graph.constant(value)))
            }
            None => {
                self.deoptimize(at, DeoptReason::TransferToInterpreter)?;
                Ok(None)
            }
        }
    }

    fn eval_if(
        &mut self,
        at: AstNodeId,
        condition: &Node,
        then_branch: &Node,
        else_branch: Option<&Node>,
    ) -> CompileResult<Option<NodeId>> {
        let value = live!(self.eval(condition)?);
        self.frame.stack.push(value);
        let branch = self.branch(at, value)?;
        self.pop(1);

        match branch {
            Branch::Dead => Ok(None),
            Branch::Fixed(true) => self.eval(then_branch),
            Branch::Fixed(false) => self.eval_else(else_branch),
            Branch::Dynamic => {
                let (on_true, on_false) = self.split(value)?;
                let saved_locals = self.frame.locals.clone();
                let saved_facts = self.facts.clone();
                let mut arrivals = Vec::with_capacity(2);

                self.control = Some(on_true);
                if let Some(value) = self.eval(then_branch)? {
                    arrivals.push(self.arrival(value)?);
                }

                self.frame.locals = saved_locals;
                self.facts = saved_facts;
                self.control = Some(on_false);
                if let Some(value) = self.eval_else(else_branch)? {
                    arrivals.push(self.arrival(value)?);
                }

                match self.join(arrivals) {
                    Some(arrival) => {
                        self.control = Some(arrival.control);
                        self.frame.locals = arrival.locals;
                        self.facts = arrival.facts;
                        Ok(Some(arrival.value))
                    }
                    None => {
                        self.control = None;
                        Ok(None)
                    }
                }
            }
        }
    }

    fn eval_else(&mut self, else_branch: Option<&Node>) -> CompileResult<Option<NodeId>> {
        match else_branch {
            Some(node) => self.eval(node),
            None => Ok(Some(self.graph.constant(Value::Null))),
        }
    }

    fn eval_while(&mut self, at: AstNodeId, condition: &Node, body: &Node) -> CompileResult<Option<NodeId>> {
        let entry = self.tip()?;
        let header = self
            .graph
            .add(GraphNode::new(GraphKind::LoopBegin).with_control(vec![entry]));
        let phis: Vec<NodeId> = self
            .frame
            .locals
            .clone()
            .into_iter()
            .map(|value| {
                self.graph.add(
                    GraphNode::new(GraphKind::Phi)
                        .with_inputs(vec![value])
                        .with_control(vec![header]),
                )
            })
            .collect();
        self.frame.locals = phis.clone();
        self.control = Some(header);

        let value = live!(self.eval(condition)?);
        self.frame.stack.push(value);
        let branch = self.branch(at, value)?;
        self.pop(1);

        let (body_entry, exit) = match branch {
            Branch::Dead => return Ok(None),
            Branch::Fixed(false) => return Ok(Some(self.graph.constant(Value::Null))),
            Branch::Fixed(true) => (self.tip()?, None),
            Branch::Dynamic => {
                let (on_true, on_false) = self.split(value)?;
                (on_true, Some(on_false))
            }
        };
        let exit_locals = self.frame.locals.clone();
        let exit_facts = self.facts.clone();

        self.control = Some(body_entry);
        if self.eval(body)?.is_some() {
            let back_edge = self.tip()?;
            self.graph[header].control.push(back_edge);
            for (phi, value) in phis.iter().zip(&self.frame.locals) {
                self.graph[*phi].inputs.push(*value);
            }
        }

        match exit {
            Some(on_false) => {
                self.control = Some(on_false);
                self.frame.locals = exit_locals;
                self.facts = exit_facts;
                Ok(Some(self.graph.constant(Value::Null)))
            }
            None => {
                self.control = None;
                Ok(None)
            }
        }
    }

    /// Decide how a condition on top of the stack is branched on
    fn branch(&mut self, at: AstNodeId, condition: NodeId) -> CompileResult<Branch> {
        match self.known_type(condition) {
            Some(TypeInfo::Bool) | None => {}
            Some(_) => {
                self.deoptimize(at, DeoptReason::TransferToInterpreter)?;
                return Ok(Branch::Dead);
            }
        }
        if let Some(Value::Bool(taken)) = self.constant(condition) {
            return Ok(Branch::Fixed(taken));
        }

        match self.frame.target.profile().branch(at).one_sided() {
            Some(outcome) => {
                let taken = outcome == BranchOutcome::Taken;
                self.guard(at, condition, GuardCheck::Condition(taken), DeoptReason::UnreachedBranch)?;
                Ok(Branch::Fixed(taken))
            }
            None => Ok(Branch::Dynamic),
        }
    }

    /// Emit an `If` and its two projections
    fn split(&mut self, condition: NodeId) -> CompileResult<(NodeId, NodeId)> {
        let pred = self.tip()?;
        let split = self.graph.add(
            GraphNode::new(GraphKind::If)
                .with_inputs(vec![condition])
                .with_control(vec![pred]),
        );
        let on_true = self.graph.add_fixed(GraphKind::IfTrue, split);
        let on_false = self.graph.add_fixed(GraphKind::IfFalse, split);
        Ok((on_true, on_false))
    }

    fn invoke(
        &mut self,
        call_site: AstNodeId,
        target: CallTargetId,
        arguments: Vec<NodeId>,
    ) -> CompileResult<Option<NodeId>> {
        let state = self.frame_state(call_site, ResumeMode::AfterCall);
        let pred = self.tip()?;
        let invoke = self.graph.add(
            GraphNode::new(GraphKind::Invoke { target, call_site })
                .with_inputs(arguments)
                .with_control(vec![pred])
                .with_state(Some(state)),
        );
        self.control = Some(invoke);
        Ok(Some(invoke))
    }

    fn inline(
        &mut self,
        call_site: AstNodeId,
        entry: &'p PlanEntry,
        arguments: Vec<NodeId>,
    ) -> CompileResult<Option<NodeId>> {
        let callee = self
            .runtime
            .call_target(entry.target)
            .ok_or(CompilationError::UnresolvedCallTarget(entry.target))?;
        let outer_state = self.frame_state(call_site, ResumeMode::AfterCall);
        let root = Arc::clone(callee.root());
        let null = self.graph.constant(Value::Null);

        let callee_frame = Frame {
            target: callee,
            arguments,
            locals: vec![null; root.local_count()],
            stack: Vec::new(),
            plan: &entry.children,
            outer_state: Some(outer_state),
            returns: Vec::new(),
        };
        let caller = std::mem::replace(&mut self.frame, callee_frame);
        let arrival = self.eval(root.body()).and_then(|completed| self.finish_frame(completed));
        self.frame = caller;

        match arrival? {
            Some(arrival) => {
                self.control = Some(arrival.control);
                self.facts = arrival.facts;
                Ok(Some(arrival.value))
            }
            None => {
                self.control = None;
                Ok(None)
            }
        }
    }

    /// Join every return of the current frame, plus its normal completion
    fn finish_frame(&mut self, completed: Option<NodeId>) -> CompileResult<Option<Arrival>> {
        let mut returns = std::mem::take(&mut self.frame.returns);
        if let Some(value) = completed {
            returns.push(Arrival {
                control: self.tip()?,
                value,
                locals: Vec::new(),
                facts: self.facts.clone(),
            });
        }
        Ok(self.join(returns))
    }

    fn arrival(&self, value: NodeId) -> CompileResult<Arrival> {
        Ok(Arrival {
            control: self.tip()?,
            value,
            locals: self.frame.locals.clone(),
            facts: self.facts.clone(),
        })
    }

    /// Merge control paths, creating phis where values differ
    fn join(&mut self, mut arrivals: Vec<Arrival>) -> Option<Arrival> {
        if arrivals.len() <= 1 {
            return arrivals.pop();
        }

        let merge = self.graph.add(
            GraphNode::new(GraphKind::Merge).with_control(arrivals.iter().map(|a| a.control).collect()),
        );
        let value = self.phi(merge, arrivals.iter().map(|a| a.value).collect());
        let slots = arrivals[0].locals.len();
        let locals = (0..slots)
            .map(|slot| self.phi(merge, arrivals.iter().map(|a| a.locals[slot]).collect()))
            .collect();
        let mut facts = arrivals[0].facts.clone();
        facts.retain(|id, info| arrivals[1..].iter().all(|a| a.facts.get(id) == Some(info)));

        Some(Arrival {
            control: merge,
            value,
            locals,
            facts,
        })
    }

    fn phi(&mut self, merge: NodeId, inputs: Vec<NodeId>) -> NodeId {
        if inputs.iter().all(|input| *input == inputs[0]) {
            return inputs[0];
        }
        self.graph.add(
            GraphNode::new(GraphKind::Phi)
                .with_inputs(inputs)
                .with_control(vec![merge]),
        )
    }

    /// Make sure `value` has type `expected` before the node at `at` uses it
    ///
    /// Returns `false` when the path deoptimized instead.
    fn ensure_type(&mut self, at: AstNodeId, value: NodeId, expected: TypeInfo) -> CompileResult<bool> {
        match self.known_type(value) {
            Some(known) if known == expected => Ok(true),
            Some(_) => {
                self.deoptimize(at, DeoptReason::TransferToInterpreter)?;
                Ok(false)
            }
            None => {
                self.guard(at, value, GuardCheck::Type(expected), DeoptReason::TypeGuardFailure)?;
                Ok(true)
            }
        }
    }

    fn guard(&mut self, at: AstNodeId, value: NodeId, check: GuardCheck, reason: DeoptReason) -> CompileResult<()> {
        let state = self.frame_state(at, ResumeMode::BeforeNode);
        self.guard_with_state(state, value, check, reason)
    }

    fn guard_with_state(
        &mut self,
        state: NodeId,
        value: NodeId,
        check: GuardCheck,
        reason: DeoptReason,
    ) -> CompileResult<()> {
        let pred = self.tip()?;
        let guard = self.graph.add(
            GraphNode::new(GraphKind::Guard { check, reason })
                .with_inputs(vec![value])
                .with_control(vec![pred])
                .with_state(Some(state)),
        );
        self.control = Some(guard);
        if let GuardCheck::Type(info) = check {
            self.facts.insert(value, info);
        }
        Ok(())
    }

    /// End the current path with an unconditional transfer to the
    /// interpreter before the node at `at`
    fn deoptimize(&mut self, at: AstNodeId, reason: DeoptReason) -> CompileResult<()> {
        let state = self.frame_state(at, ResumeMode::BeforeNode);
        let pred = self.tip()?;
        self.graph.add(
            GraphNode::new(GraphKind::Deoptimize { reason })
                .with_control(vec![pred])
                .with_state(Some(state)),
        );
        self.control = None;
        Ok(())
    }

    /// Describe the current virtual frame (and its callers) at `node`
    fn frame_state(&mut self, node: AstNodeId, mode: ResumeMode) -> NodeId {
        let frame = &self.frame;
        let desc = FrameStateDesc {
            target: frame.target.id(),
            node,
            mode,
            arguments: frame.arguments.len() as u32,
            locals: frame.locals.len() as u32,
            stack: frame.stack.len() as u32,
        };
        let inputs: Vec<NodeId> = frame
            .arguments
            .iter()
            .chain(&frame.locals)
            .chain(&frame.stack)
            .copied()
            .collect();
        let outer = frame.outer_state;
        self.graph.add(
            GraphNode::new(GraphKind::FrameState(desc))
                .with_inputs(inputs)
                .with_state(outer),
        )
    }

    fn known_type(&self, value: NodeId) -> Option<TypeInfo> {
        self.graph[value]
            .kind
            .stamp()
            .or_else(|| self.facts.get(&value).copied())
    }

    fn constant(&self, value: NodeId) -> Option<Value> {
        self.graph[value].kind.as_constant()
    }

    fn pop(&mut self, count: usize) {
        let len = self.frame.stack.len();
        self.frame.stack.truncate(len.saturating_sub(count));
    }

    fn tip(&self) -> CompileResult<NodeId> {
        self.control
            .ok_or_else(|| self.fault("evaluation continued on a path that already ended"))
    }

    fn fault(&self, message: impl Into<String>) -> CompilationError {
        CompilationError::fault(self.frame.target.name(), message)
    }
}

/// Number of argument slots a body reads
fn argument_count(node: &Node) -> usize {
    let own = match node.kind() {
        NodeKind::ReadArgument(index) => index + 1,
        _ => 0,
    };
    node.children().into_iter().map(argument_count).fold(own, usize::max)
}
