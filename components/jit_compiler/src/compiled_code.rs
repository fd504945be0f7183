//! Installed compiled code
//!
//! A [`CompiledCode`] wraps a finalized graph together with the lookup
//! tables needed to run it. Execution walks the fixed nodes from start,
//! evaluates floating nodes on demand and reports a [`Deoptimization`]
//! when a guard fails.

use crate::deopt::{DeoptReason, Deoptimization};
use crate::error::CompileResult;
use crate::ir::{materialize, NodeId, NodeKind, StructuredGraph};
use core_types::{GuestError, Value};
use interpreter::{ops, CallDispatch, CallTargetId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of running compiled code
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The code ran to a return
    Returned(Value),
    /// The code bailed out; the invocation must finish in the interpreter
    Deoptimized(Deoptimization),
}

/// Executable code for one call target
#[derive(Debug)]
pub struct CompiledCode {
    target: CallTargetId,
    graph: StructuredGraph,
    successors: HashMap<NodeId, Vec<NodeId>>,
    phis: HashMap<NodeId, Vec<NodeId>>,
    valid: AtomicBool,
}

impl CompiledCode {
    /// Wrap a verified graph
    pub fn new(target: CallTargetId, graph: StructuredGraph) -> CompileResult<Self> {
        graph.verify()?;
        let successors = graph.successor_map();
        let mut phis: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for phi in graph.filter(|kind| *kind == NodeKind::Phi) {
            phis.entry(graph[phi].control[0]).or_default().push(phi);
        }
        Ok(Self {
            target,
            graph,
            successors,
            phis,
            valid: AtomicBool::new(true),
        })
    }

    /// Call target this code was compiled for
    pub fn target(&self) -> CallTargetId {
        self.target
    }

    /// The graph being executed
    pub fn graph(&self) -> &StructuredGraph {
        &self.graph
    }

    /// Whether the code may still be entered
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the code as no longer enterable
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Run the code
    ///
    /// Guest errors propagate exactly as they would from the interpreter.
    pub fn execute(
        &self,
        dispatch: &dyn CallDispatch,
        arguments: &[Value],
    ) -> Result<ExecutionResult, GuestError> {
        Activation {
            code: self,
            dispatch,
            arguments,
            values: HashMap::new(),
            cache: HashMap::new(),
        }
        .run()
    }
}

/// State of one execution of compiled code
struct Activation<'c> {
    code: &'c CompiledCode,
    dispatch: &'c dyn CallDispatch,
    arguments: &'c [Value],
    /// Values of phis and invokes, set as control passes them
    values: HashMap<NodeId, Value>,
    /// Pure values computed since the last phi or invoke update
    cache: HashMap<NodeId, Value>,
}

impl Activation<'_> {
    fn run(mut self) -> Result<ExecutionResult, GuestError> {
        let code = self.code;
        let graph = &code.graph;
        let mut current = graph.start();
        let mut previous: Option<NodeId> = None;

        loop {
            let node = graph
                .get(current)
                .ok_or_else(|| GuestError::internal(format!("{} missing from compiled code", current)))?;

            match &node.kind {
                NodeKind::Start | NodeKind::IfTrue | NodeKind::IfFalse => {}
                NodeKind::Merge | NodeKind::LoopBegin => self.enter_merge(current, previous)?,
                NodeKind::If => {
                    let taken = ops::condition(self.value(node.inputs[0])?)?;
                    let successors = self.successors(current);
                    let next = successors
                        .get(if taken { 0 } else { 1 })
                        .copied()
                        .ok_or_else(|| GuestError::internal(format!("{} lacks a projection", current)))?;
                    previous = Some(current);
                    current = next;
                    continue;
                }
                NodeKind::Guard { check, reason } => {
                    let value = self.value(node.inputs[0])?;
                    if !check.holds(&value) {
                        return Ok(ExecutionResult::Deoptimized(self.deoptimize(current, *reason, None)?));
                    }
                }
                NodeKind::Deoptimize { reason } => {
                    return Ok(ExecutionResult::Deoptimized(self.deoptimize(current, *reason, None)?));
                }
                NodeKind::Invoke { target, .. } => {
                    let mut arguments = Vec::with_capacity(node.inputs.len());
                    for input in &node.inputs {
                        arguments.push(self.value(*input)?);
                    }
                    let result = self.dispatch.call(*target, arguments)?;
                    self.values.insert(current, result);
                    self.cache.clear();
                    if !self.code.is_valid() {
                        return Ok(ExecutionResult::Deoptimized(self.deoptimize(
                            current,
                            DeoptReason::Invalidated,
                            Some(result),
                        )?));
                    }
                }
                NodeKind::Return => {
                    return Ok(ExecutionResult::Returned(self.value(node.inputs[0])?));
                }
                _ => {
                    return Err(GuestError::internal(format!(
                        "{} ({}) is not on the control chain",
                        current, node.kind
                    )))
                }
            }

            let next = self
                .successors(current)
                .first()
                .copied()
                .ok_or_else(|| GuestError::internal(format!("{} has no successor", current)))?;
            previous = Some(current);
            current = next;
        }
    }

    fn successors(&self, id: NodeId) -> &[NodeId] {
        self.code.successors.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Assign the merge's phis, all reading values from before the merge
    fn enter_merge(&mut self, merge: NodeId, previous: Option<NodeId>) -> Result<(), GuestError> {
        let code = self.code;
        let graph = &code.graph;
        let index = previous
            .and_then(|pred| graph[merge].control.iter().position(|c| *c == pred))
            .ok_or_else(|| GuestError::internal(format!("{} entered from unknown edge", merge)))?;

        let Some(phis) = self.code.phis.get(&merge) else {
            return Ok(());
        };
        let mut updates = Vec::with_capacity(phis.len());
        for phi in phis {
            let input = graph[*phi].inputs[index];
            updates.push((*phi, self.value(input)?));
        }
        self.values.extend(updates);
        self.cache.clear();
        Ok(())
    }

    fn value(&mut self, id: NodeId) -> Result<Value, GuestError> {
        if let Some(value) = self.cache.get(&id) {
            return Ok(*value);
        }
        let code = self.code;
        let graph = &code.graph;
        let node = graph
            .get(id)
            .ok_or_else(|| GuestError::internal(format!("{} missing from compiled code", id)))?;
        let value = match &node.kind {
            NodeKind::Constant(value) => *value,
            NodeKind::Parameter(index) => self.arguments.get(*index).copied().unwrap_or_default(),
            NodeKind::Binary(op) => {
                let lhs = self.value(node.inputs[0])?;
                let rhs = self.value(node.inputs[1])?;
                ops::binary(*op, lhs, rhs)?
            }
            NodeKind::Unary(op) => {
                let operand = self.value(node.inputs[0])?;
                ops::unary(*op, operand)?
            }
            NodeKind::Phi | NodeKind::Invoke { .. } => {
                return self
                    .values
                    .get(&id)
                    .copied()
                    .ok_or_else(|| GuestError::internal(format!("{} read before it was set", id)))
            }
            _ => {
                return Err(GuestError::internal(format!(
                    "{} ({}) does not produce a value",
                    id, node.kind
                )))
            }
        };
        self.cache.insert(id, value);
        Ok(value)
    }

    fn deoptimize(
        &mut self,
        at: NodeId,
        reason: DeoptReason,
        call_result: Option<Value>,
    ) -> Result<Deoptimization, GuestError> {
        let state = self.code.graph[at]
            .state
            .ok_or_else(|| GuestError::internal(format!("{} has no frame state", at)))?;

        let mut failed = None;
        let code = self.code;
        let graph = &code.graph;
        let mut snapshot = {
            let mut value_of = |input: NodeId| match self.value(input) {
                Ok(value) => Some(value),
                Err(err) => {
                    failed = Some(err);
                    None
                }
            };
            materialize(graph, state, &mut value_of)
        }
        .ok_or_else(|| {
            failed
                .take()
                .unwrap_or_else(|| GuestError::internal(format!("broken frame state at {}", at)))
        })?;

        if let Some(result) = call_result {
            snapshot.stack.push(result);
        }
        Ok(Deoptimization { reason, snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FrameStateDesc, GuardCheck, Node};
    use core_types::TypeInfo;
    use interpreter::{AstNodeId, BinaryOp, ResumeMode};

    struct NoCalls;

    impl CallDispatch for NoCalls {
        fn call(&self, target: CallTargetId, _: Vec<Value>) -> Result<Value, GuestError> {
            Err(GuestError::internal(format!("unexpected call to {}", target)))
        }
    }

    fn returning(graph: &mut StructuredGraph, pred: NodeId, value: NodeId) {
        let ret = graph.add_fixed(NodeKind::Return, pred);
        graph[ret].inputs = vec![value];
    }

    #[test]
    fn test_straight_line() {
        let mut graph = StructuredGraph::new("inc");
        let param = graph.add(Node::new(NodeKind::Parameter(0)));
        let one = graph.constant(Value::Int(1));
        let add = graph.add(Node::new(NodeKind::Binary(BinaryOp::Add)).with_inputs(vec![param, one]));
        let start = graph.start();
        returning(&mut graph, start, add);

        let code = CompiledCode::new(CallTargetId(0), graph).unwrap();
        assert_eq!(
            code.execute(&NoCalls, &[Value::Int(41)]).unwrap(),
            ExecutionResult::Returned(Value::Int(42))
        );
    }

    #[test]
    fn test_diamond_assigns_phi_per_edge() {
        let mut graph = StructuredGraph::new("choose");
        let param = graph.add(Node::new(NodeKind::Parameter(0)));
        let split = graph.add(
            Node::new(NodeKind::If)
                .with_inputs(vec![param])
                .with_control(vec![graph.start()]),
        );
        let on_true = graph.add_fixed(NodeKind::IfTrue, split);
        let on_false = graph.add_fixed(NodeKind::IfFalse, split);
        let merge = graph.add(Node::new(NodeKind::Merge).with_control(vec![on_true, on_false]));
        let one = graph.constant(Value::Int(1));
        let two = graph.constant(Value::Int(2));
        let phi = graph.add(Node::new(NodeKind::Phi).with_inputs(vec![one, two]).with_control(vec![merge]));
        returning(&mut graph, merge, phi);

        let code = CompiledCode::new(CallTargetId(0), graph).unwrap();
        assert_eq!(
            code.execute(&NoCalls, &[Value::Bool(true)]).unwrap(),
            ExecutionResult::Returned(Value::Int(1))
        );
        assert_eq!(
            code.execute(&NoCalls, &[Value::Bool(false)]).unwrap(),
            ExecutionResult::Returned(Value::Int(2))
        );
        let err = code.execute(&NoCalls, &[Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind, core_types::ErrorKind::TypeError);
    }

    #[test]
    fn test_failed_guard_materializes_frame() {
        let mut graph = StructuredGraph::new("guarded");
        let param = graph.add(Node::new(NodeKind::Parameter(0)));
        let desc = FrameStateDesc {
            target: CallTargetId(3),
            node: AstNodeId(0),
            mode: ResumeMode::Start,
            arguments: 1,
            locals: 0,
            stack: 0,
        };
        let state = graph.add(Node::new(NodeKind::FrameState(desc)).with_inputs(vec![param]));
        let guard = graph.add(
            Node::new(NodeKind::Guard {
                check: GuardCheck::Type(TypeInfo::Int),
                reason: DeoptReason::TypeGuardFailure,
            })
            .with_inputs(vec![param])
            .with_control(vec![graph.start()])
            .with_state(Some(state)),
        );
        returning(&mut graph, guard, param);

        let code = CompiledCode::new(CallTargetId(3), graph).unwrap();
        assert_eq!(
            code.execute(&NoCalls, &[Value::Int(7)]).unwrap(),
            ExecutionResult::Returned(Value::Int(7))
        );
        let ExecutionResult::Deoptimized(deopt) = code.execute(&NoCalls, &[Value::Null]).unwrap() else {
            panic!("guard should fail on null");
        };
        assert_eq!(deopt.reason, DeoptReason::TypeGuardFailure);
        assert_eq!(deopt.snapshot.target, CallTargetId(3));
        assert_eq!(deopt.snapshot.arguments, vec![Value::Null]);
        assert!(deopt.snapshot.outer.is_none());
    }

    #[test]
    fn test_invalidate() {
        let mut graph = StructuredGraph::new("zero");
        let zero = graph.constant(Value::Int(0));
        let start = graph.start();
        returning(&mut graph, start, zero);

        let code = CompiledCode::new(CallTargetId(0), graph).unwrap();
        assert!(code.is_valid());
        code.invalidate();
        assert!(!code.is_valid());
    }
}
