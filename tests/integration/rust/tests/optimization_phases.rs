//! Optimization phase integration tests
//!
//! Runs the canonicalizer and dead code elimination on graphs produced by
//! partial evaluation of real programs.

use core_types::Value;
use integration_tests::programs;
use interpreter::RootNode;
use jit_compiler::phases::remove_frame_states;
use jit_compiler::{
    CanonicalizerPhase, DeadCodeEliminationPhase, GraphPrinter, InliningPlan, Optimizer, PartialEvaluationTester,
    PartialEvaluator, StructuredGraph,
};

/// Unoptimized graph straight out of partial evaluation
fn raw_graph(tester: &PartialEvaluationTester, root: RootNode, arguments: &[Value]) -> StructuredGraph {
    let runtime = tester.runtime();
    let target = runtime.create_call_target(root);
    for _ in 0..3 {
        target.invoke(runtime, arguments).unwrap();
    }
    let plan = runtime.compiler().build_plan(runtime, &target).unwrap();
    PartialEvaluator::new(runtime).evaluate(&target, &plan).unwrap()
}

fn sample_graphs() -> Vec<StructuredGraph> {
    let tester = PartialEvaluationTester::new();
    let identity = tester.runtime().create_call_target(programs::identity());
    vec![
        raw_graph(&tester, programs::five(), &[]),
        raw_graph(&tester, programs::add_via(identity.id()), &[Value::Int(3), Value::Int(4)]),
        raw_graph(&tester, programs::abs(), &[Value::Int(-2)]),
        raw_graph(&tester, programs::sum_to(), &[Value::Int(5)]),
    ]
}

/// Test: a second canonicalizer run finds nothing to do
#[test]
fn test_canonicalizer_is_idempotent() {
    let canonicalizer = CanonicalizerPhase::new();
    for mut graph in sample_graphs() {
        canonicalizer.run(&mut graph);
        let once = GraphPrinter::canonical(&graph);

        let stats = canonicalizer.run(&mut graph);
        assert_eq!(stats.total(), 0, "{}", once);
        assert_eq!(GraphPrinter::canonical(&graph), once);
    }
}

/// Test: dead code elimination reaches a fixpoint in one call
#[test]
fn test_dead_code_elimination_reaches_fixpoint() {
    let dce = DeadCodeEliminationPhase::new();
    for mut graph in sample_graphs() {
        dce.run(&mut graph);
        let nodes = graph.node_count();

        assert_eq!(dce.run(&mut graph), 0);
        assert_eq!(graph.node_count(), nodes);
        graph.verify().unwrap();
    }
}

/// Test: the joint optimizer shrinks graphs and keeps them well formed
#[test]
fn test_optimizer_shrinks_and_verifies() {
    for mut graph in sample_graphs() {
        let before = graph.node_count();
        Optimizer::new().optimize(&mut graph);

        assert!(graph.node_count() <= before);
        graph.verify().unwrap();
        graph.verify_frame_states().unwrap();
    }
}

/// Test: stripping frame states leaves a graph the optimizer can still
/// reduce, and every state node is gone
#[test]
fn test_frame_state_removal() {
    for mut graph in sample_graphs() {
        Optimizer::new().optimize(&mut graph);
        remove_frame_states(&mut graph);
        Optimizer::new().optimize(&mut graph);

        let rendered = GraphPrinter::canonical(&graph);
        assert!(!rendered.contains("state="), "{}", rendered);
        assert!(!rendered.contains("FrameState"), "{}", rendered);
    }
}

/// Test: an empty plan keeps every call as an invoke through optimization
#[test]
fn test_invokes_are_not_removed() {
    let tester = PartialEvaluationTester::new();
    let runtime = tester.runtime();
    let identity = runtime.create_call_target(programs::identity());
    let target = runtime.create_call_target(programs::add_via(identity.id()));

    let mut graph = PartialEvaluator::new(runtime)
        .evaluate(&target, &InliningPlan::empty(target.id()))
        .unwrap();
    Optimizer::new().optimize(&mut graph);
    let invokes = graph.count(|kind| matches!(kind, jit_compiler::ir::NodeKind::Invoke { .. }));
    assert_eq!(invokes, 2);
}
