//! Partial evaluation integration tests
//!
//! Tests the flow: RootNode -> warm-up in the interpreter -> InliningPlan ->
//! PartialEvaluator -> optimized StructuredGraph.

use core_types::Value;
use integration_tests::{init_tracing, programs};
use interpreter::CallTargetId;
use jit_compiler::ir::NodeKind;
use jit_compiler::{
    CompilerOptions, DeoptReason, DefaultInliningPolicy, GraphPrinter, InliningPlan, PartialEvaluationTester,
    StructuredGraph,
};

fn count(graph: &StructuredGraph, predicate: impl Fn(&NodeKind) -> bool) -> usize {
    graph.count(predicate)
}

/// Test: calls to a hot identity function are inlined away and the graph
/// matches the one for plain addition
#[test]
fn test_inlined_identity_matches_plain_addition() {
    init_tracing();
    let tester = PartialEvaluationTester::new();
    let identity = tester.runtime().create_call_target(programs::identity());
    let arguments = [Value::Int(1), Value::Int(2)];

    let graph = tester
        .assert_partial_eval_no_invokes(programs::add_via(identity.id()), &arguments)
        .expect("all calls inlined");
    let ret = graph.filter(|kind| *kind == NodeKind::Return);
    assert_eq!(ret.len(), 1);
    let add = &graph[graph[ret[0]].inputs[0]];
    assert_eq!(add.kind, NodeKind::Binary(interpreter::BinaryOp::Add));
    assert_eq!(graph[add.inputs[0]].kind, NodeKind::Parameter(0));
    assert_eq!(graph[add.inputs[1]].kind, NodeKind::Parameter(1));

    tester
        .assert_partial_eval_equals(programs::add(), programs::add_via(identity.id()), &arguments)
        .expect("same graph as a + b");
}

/// Test: a constant-only root reduces to returning the folded constant
#[test]
fn test_constant_root_folds_to_single_constant() {
    let tester = PartialEvaluationTester::new();
    let mut graph = tester.partial_eval(programs::five(), &[]).unwrap();
    tester.remove_frame_states(&mut graph);

    assert_eq!(
        GraphPrinter::canonical(&graph),
        "0 Start\n1 Return inputs=[2] control=[0]\n2 Constant(5)\n"
    );
}

/// Test: a cold callee stays a real call
#[test]
fn test_cold_callee_is_not_inlined() {
    let tester = PartialEvaluationTester::with_options(CompilerOptions::default().with_inlining_min_hotness(1_000));
    let identity = tester.runtime().create_call_target(programs::identity());

    let graph = tester
        .partial_eval(programs::add_via(identity.id()), &[Value::Int(1), Value::Int(2)])
        .unwrap();
    assert_eq!(count(&graph, |kind| matches!(kind, NodeKind::Invoke { .. })), 2);
}

/// Test: recursion is inlined only down to the depth limit
#[test]
fn test_recursive_inlining_stops_at_depth_limit() {
    let tester = PartialEvaluationTester::with_options(CompilerOptions::default().with_max_inlining_depth(2));
    let itself = CallTargetId(tester.runtime().call_target_count() as u32);
    let factorial = tester.runtime().create_call_target(programs::factorial(itself));
    assert_eq!(factorial.id(), itself);
    for n in 1..6 {
        factorial.invoke(tester.runtime(), &[Value::Int(n)]).unwrap();
    }

    let plan = tester.runtime().compiler().build_plan(tester.runtime(), &factorial).unwrap();
    assert_eq!(plan.inlined_count(), 2);
    assert_eq!(plan.stats().max_depth_reached, 2);
    assert_eq!(plan.decisions().len(), 3);
}

/// Test: building a plan twice from the same state gives the same plan and
/// the same graph
#[test]
fn test_plan_and_graph_are_deterministic() {
    let tester = PartialEvaluationTester::new();
    let identity = tester.runtime().create_call_target(programs::identity());
    let root = tester.runtime().create_call_target(programs::add_via(identity.id()));
    for i in 0..3 {
        root.invoke(tester.runtime(), &[Value::Int(i), Value::Int(i)]).unwrap();
    }

    let policy = DefaultInliningPolicy::default();
    let first = InliningPlan::build(tester.runtime(), &root, &policy, 1000).unwrap();
    let second = InliningPlan::build(tester.runtime(), &root, &policy, 1000).unwrap();
    assert_eq!(first.decisions(), second.decisions());

    let compiler = tester.runtime().compiler();
    let a = compiler.partial_evaluate(tester.runtime(), &root).unwrap();
    let b = compiler.partial_evaluate(tester.runtime(), &root).unwrap();
    assert_eq!(GraphPrinter::canonical(&a.graph), GraphPrinter::canonical(&b.graph));
}

/// Test: a branch the profile never saw taken becomes a guard
#[test]
fn test_one_sided_profile_speculates_on_branch() {
    let tester = PartialEvaluationTester::new();
    let graph = tester.partial_eval(programs::abs(), &[Value::Int(4)]).unwrap();

    let branch_guards = count(&graph, |kind| {
        matches!(
            kind,
            NodeKind::Guard {
                reason: DeoptReason::UnreachedBranch,
                ..
            }
        )
    });
    assert_eq!(branch_guards, 1);
    assert_eq!(count(&graph, |kind| *kind == NodeKind::If), 0);
    assert_eq!(count(&graph, |kind| *kind == NodeKind::Return), 1);
}

/// Test: loops keep their header through optimization
#[test]
fn test_loop_survives_optimization() {
    let tester = PartialEvaluationTester::new();
    let graph = tester.partial_eval(programs::sum_to(), &[Value::Int(4)]).unwrap();

    assert_eq!(count(&graph, |kind| *kind == NodeKind::LoopBegin), 1);
    assert!(count(&graph, |kind| *kind == NodeKind::Phi) >= 2);
    graph.verify().unwrap();
}
