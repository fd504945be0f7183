//! Unit tests for interpreter components

use core_types::{ErrorKind, GuestError, TypeFeedback, TypeInfo, Value};
use interpreter::{
    CallDispatch, CallTargetId, FrameSnapshot, Interpreter, Node, NodeKind, ResumeMode, RootNode,
    RootProfile,
};

/// Dispatch that interprets callees from a fixed table
struct Roots(Vec<RootNode>);

impl CallDispatch for Roots {
    fn call(&self, target: CallTargetId, arguments: Vec<Value>) -> Result<Value, GuestError> {
        match self.0.get(target.index()) {
            Some(root) => Interpreter::new(root, self).execute(arguments),
            None => Err(GuestError::new(
                ErrorKind::UnknownCallTarget,
                format!("{} is not registered", target),
            )),
        }
    }
}

fn abs() -> RootNode {
    RootNode::new(
        "abs",
        1,
        Node::if_then(
            Node::less_than(Node::arg(0), Node::constant(0)),
            Node::ret(Node::negate(Node::arg(0))),
            Some(Node::ret(Node::arg(0))),
        ),
    )
}

// ============================================================================
// Execution Tests
// ============================================================================

#[test]
fn test_recursive_factorial() {
    // fact(n) = if (n < 2) 1 else n * fact(n - 1)
    let fact = RootNode::new(
        "fact",
        1,
        Node::if_then(
            Node::less_than(Node::arg(0), Node::constant(2)),
            Node::ret(Node::constant(1)),
            Some(Node::ret(Node::mul(
                Node::arg(0),
                Node::call(CallTargetId(0), vec![Node::sub(Node::arg(0), Node::constant(1))]),
            ))),
        ),
    );
    let roots = Roots(vec![fact]);
    let result = roots.call(CallTargetId(0), vec![Value::Int(10)]).unwrap();
    assert_eq!(result, Value::Int(3_628_800));
}

#[test]
fn test_unknown_target_surfaces_as_guest_error() {
    let caller = RootNode::new("caller", 0, Node::call(CallTargetId(9), vec![]));
    let roots = Roots(Vec::new());
    let err = Interpreter::new(&caller, &roots).execute(vec![]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownCallTarget);
}

#[test]
fn test_equal_accepts_mixed_types() {
    let root = RootNode::new("eq", 2, Node::equal(Node::arg(0), Node::arg(1)));
    let roots = Roots(Vec::new());
    let result = Interpreter::new(&root, &roots)
        .execute(vec![Value::Null, Value::Bool(false)])
        .unwrap();
    assert_eq!(result, Value::Bool(false));
}

// ============================================================================
// Profile Tests
// ============================================================================

#[test]
fn test_profile_sees_one_sided_branch() {
    let root = abs();
    let profile = RootProfile::new(1, root.node_count());
    let roots = Roots(Vec::new());
    for n in 1..5 {
        profile.record_arguments(&[Value::Int(n)]);
        Interpreter::new(&root, &roots)
            .with_profile(&profile)
            .execute(vec![Value::Int(n)])
            .unwrap();
    }
    let branch = profile.branch(root.body().id());
    assert_eq!(branch.taken, 0);
    assert_eq!(branch.not_taken, 4);
    assert_eq!(
        profile.argument_feedback(0),
        TypeFeedback::Monomorphic(TypeInfo::Int)
    );
}

// ============================================================================
// Resume Tests
// ============================================================================

#[test]
fn test_resume_from_start_reruns_root() {
    let root = abs();
    let snapshot = FrameSnapshot {
        target: CallTargetId(0),
        node: root.body().id(),
        mode: ResumeMode::Start,
        arguments: vec![Value::Int(-8)],
        locals: vec![],
        stack: vec![],
        outer: None,
    };
    let roots = Roots(Vec::new());
    let result = Interpreter::new(&root, &roots).resume(&snapshot).unwrap();
    assert_eq!(result, Value::Int(8));
}

#[test]
fn test_resume_in_untaken_branch() {
    // Resume right before the negate in the branch the profile never saw
    let root = abs();
    let negate = root
        .body()
        .children()
        .iter()
        .flat_map(|child| child.children())
        .find(|node| matches!(node.kind(), NodeKind::Unary(..)))
        .unwrap()
        .id();
    let snapshot = FrameSnapshot {
        target: CallTargetId(0),
        node: negate,
        mode: ResumeMode::BeforeNode,
        arguments: vec![Value::Int(-3)],
        locals: vec![],
        stack: vec![Value::Int(-3)],
        outer: None,
    };
    let roots = Roots(Vec::new());
    let result = Interpreter::new(&root, &roots).resume(&snapshot).unwrap();
    assert_eq!(result, Value::Int(3));
}

#[test]
fn test_resume_unknown_node_is_internal_error() {
    let root = abs();
    let snapshot = FrameSnapshot {
        target: CallTargetId(0),
        node: interpreter::AstNodeId(500),
        mode: ResumeMode::BeforeNode,
        arguments: vec![],
        locals: vec![],
        stack: vec![],
        outer: None,
    };
    let roots = Roots(Vec::new());
    let err = Interpreter::new(&root, &roots).resume(&snapshot).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InternalError);
}
