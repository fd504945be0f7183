//! Compilation lifecycle integration tests
//!
//! Tests the flow: interpreted warm-up -> compilation -> compiled execution
//! -> deoptimization -> interpreter resumption, checking that every tier
//! produces the results the interpreter alone would.

use core_types::{ErrorKind, GuestError, Value};
use integration_tests::{init_tracing, programs};
use interpreter::{CallTargetId, Node, RootNode};
use jit_compiler::{
    Backend, CallTarget, CallTargetState, CompilationError, CompilationStatus, CompileResult, CompiledCode,
    CompilerOptions, DeoptReason, OptimizingCompiler, Runtime, StructuredGraph,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn manual_runtime() -> Runtime {
    Runtime::with_options(CompilerOptions::default().with_auto_compile(false))
}

/// Id the next call target registered in `runtime` will get
fn next_id(runtime: &Runtime) -> CallTargetId {
    CallTargetId(runtime.call_target_count() as u32)
}

/// Run `inputs` through an interpreter-only target and a compiled one and
/// require identical outcomes
fn assert_tiers_agree(make: impl Fn(&Runtime) -> RootNode, warmup: &[Vec<Value>], inputs: &[Vec<Value>]) {
    let interpreted_runtime = manual_runtime();
    let interpreted = interpreted_runtime.create_call_target(make(&interpreted_runtime));

    let compiled_runtime = manual_runtime();
    let compiled = compiled_runtime.create_call_target(make(&compiled_runtime));
    for arguments in warmup {
        compiled.invoke(&compiled_runtime, arguments).unwrap();
    }
    assert_eq!(
        compiled.request_compilation(&compiled_runtime).unwrap(),
        CompilationStatus::Compiled
    );

    for arguments in inputs {
        let expected = interpreted.invoke(&interpreted_runtime, arguments);
        let actual = compiled.invoke(&compiled_runtime, arguments);
        match (expected, actual) {
            (Ok(expected), Ok(actual)) => assert_eq!(actual, expected, "{} {:?}", compiled.name(), arguments),
            (Err(expected), Err(actual)) => assert_eq!(actual.kind, expected.kind, "{} {:?}", compiled.name(), arguments),
            (expected, actual) => panic!("{} {:?}: interpreter {:?}, compiled {:?}", compiled.name(), arguments, expected, actual),
        }
    }
}

fn ints(values: &[i64]) -> Vec<Vec<Value>> {
    values.iter().map(|n| vec![Value::Int(*n)]).collect()
}

/// Test: compiled code computes what the interpreter computes
#[test]
fn test_compiled_code_matches_interpreter() {
    init_tracing();
    assert_tiers_agree(
        |_| programs::add(),
        &vec![vec![Value::Int(1), Value::Int(2)]; 3],
        &[
            vec![Value::Int(40), Value::Int(2)],
            vec![Value::Int(i64::MAX), Value::Int(1)],
            vec![Value::Int(-7), Value::Int(7)],
        ],
    );
    assert_tiers_agree(|_| programs::sum_to(), &ints(&[3, 5, 8]), &ints(&[0, 1, 10, 100]));
    assert_tiers_agree(|_| programs::abs(), &ints(&[-3, 4, -5]), &ints(&[-9, 0, 9]));
    assert_tiers_agree(|runtime| programs::factorial(next_id(runtime)), &ints(&[3, 5, 6]), &ints(&[0, 1, 10, 20]));
}

/// Test: guest errors are the same whichever tier hits them
#[test]
fn test_errors_match_interpreter() {
    assert_tiers_agree(
        |_| programs::add(),
        &vec![vec![Value::Int(1), Value::Int(2)]; 3],
        &[
            vec![Value::Bool(true), Value::Int(2)],
            vec![Value::Int(1), Value::Null],
            vec![Value::Int(1), Value::Int(2)],
        ],
    );
    assert_tiers_agree(|_| programs::abs(), &ints(&[1, 2]), &[vec![Value::Null], vec![Value::Int(-4)]]);
}

/// Test: a failed speculation deoptimizes, gives the right answer and drops
/// the code
#[test]
fn test_deoptimization_after_type_change() {
    let runtime = manual_runtime();
    let abs = runtime.create_call_target(programs::abs());
    for n in [1, 2, 3] {
        abs.invoke(&runtime, &[Value::Int(n)]).unwrap();
    }
    abs.request_compilation(&runtime).unwrap();
    let code = abs.compiled_code().expect("compiled");

    // The negative branch was never profiled
    assert_eq!(abs.invoke(&runtime, &[Value::Int(-8)]).unwrap(), Value::Int(8));
    assert!(!code.is_valid());
    assert_eq!(abs.state(), CallTargetState::Interpreted);
    let history = runtime.deoptimizer().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, DeoptReason::UnreachedBranch);
    assert_eq!(history[0].target, abs.id());

    // Recompiling with the wider profile keeps both branches
    abs.invoke(&runtime, &[Value::Int(-1)]).unwrap();
    abs.request_compilation(&runtime).unwrap();
    assert_eq!(abs.invoke(&runtime, &[Value::Int(-8)]).unwrap(), Value::Int(8));
    assert_eq!(abs.invoke(&runtime, &[Value::Int(8)]).unwrap(), Value::Int(8));
    assert!(abs.is_compiled());
    assert_eq!(runtime.deoptimizer().deopt_count(), 1);
    assert_eq!(abs.compilation_count(), 2);
}

/// Test: invalidation during a call resumes the caller after the call
#[test]
fn test_invalidation_during_call_deoptimizes_lazily() {
    let runtime = Runtime::with_options(
        CompilerOptions::default()
            .with_auto_compile(false)
            .with_inlining_min_hotness(1_000),
    );
    let outer_id = CallTargetId(0);
    let helper_id = CallTargetId(1);
    // outer(n, flag) = if n < 1 { 0 } else { helper(n) + 1 }
    let outer = runtime.create_call_target(RootNode::new(
        "outer",
        2,
        Node::if_then(
            Node::less_than(Node::arg(0), Node::constant(1)),
            Node::ret(Node::constant(0)),
            Some(Node::ret(Node::add(
                Node::call(helper_id, vec![Node::arg(0)]),
                Node::constant(1),
            ))),
        ),
    ));
    // helper(m) = if m < 100 { m } else { outer(0, true) }
    let helper = runtime.create_call_target(RootNode::new(
        "helper",
        1,
        Node::if_then(
            Node::less_than(Node::arg(0), Node::constant(100)),
            Node::ret(Node::arg(0)),
            Some(Node::ret(Node::call(
                outer_id,
                vec![Node::constant(0), Node::constant(true)],
            ))),
        ),
    ));
    assert_eq!((outer.id(), helper.id()), (outer_id, helper_id));

    for n in [0, 5, 0, 7] {
        outer.invoke(&runtime, &[Value::Int(n), Value::Int(1)]).unwrap();
    }
    outer.request_compilation(&runtime).unwrap();
    let code = outer.compiled_code().expect("compiled");
    assert_eq!(code.graph().count(|kind| matches!(kind, jit_compiler::ir::NodeKind::Invoke { .. })), 1);

    // The nested call fails outer's entry guard and invalidates the code the
    // outer activation is still running
    assert_eq!(outer.invoke(&runtime, &[Value::Int(200), Value::Int(1)]).unwrap(), Value::Int(1));
    assert!(!code.is_valid());
    let reasons: Vec<DeoptReason> = runtime.deoptimizer().history().iter().map(|info| info.reason).collect();
    assert_eq!(reasons, vec![DeoptReason::TypeGuardFailure, DeoptReason::Invalidated]);
    assert_eq!(outer.deopt_count(), 1);
}

/// Test: concurrent requests compile a target exactly once
#[test]
fn test_at_most_one_compilation() {
    const THREADS: usize = 8;
    let runtime = manual_runtime();
    let add = runtime.create_call_target(programs::add());
    add.invoke(&runtime, &[Value::Int(1), Value::Int(1)]).unwrap();
    let barrier = Barrier::new(THREADS);

    let statuses: Vec<CompilationStatus> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    add.request_compilation(&runtime).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let compiled = statuses.iter().filter(|status| **status == CompilationStatus::Compiled).count();
    assert_eq!(compiled, 1, "{:?}", statuses);
    assert!(statuses.iter().all(|status| matches!(
        status,
        CompilationStatus::Compiled | CompilationStatus::AlreadyCompiled | CompilationStatus::AlreadyCompiling
    )));
    assert_eq!(add.compilation_count(), 1);
    assert_eq!(runtime.compiler().stats().compilations, 1);
}

/// Test: hot targets invoked from many threads compile and stay correct
#[test]
fn test_concurrent_invocations_compile_hot_target() {
    let runtime = Runtime::with_options(CompilerOptions::default().with_compilation_threshold(5));
    let sum_to = runtime.create_call_target(programs::sum_to());

    thread::scope(|scope| {
        for t in 0..4i64 {
            let runtime = &runtime;
            let sum_to = &sum_to;
            scope.spawn(move || {
                for n in 0..50i64 {
                    let n = (n + t) % 20;
                    let result = sum_to.invoke(runtime, &[Value::Int(n)]).unwrap();
                    assert_eq!(result, Value::Int(n * (n - 1) / 2));
                }
            });
        }
    });

    assert!(sum_to.compilation_count() >= 1);
    assert_eq!(runtime.compiler().stats().failures, 0);
}

struct FailingBackend;

impl Backend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn emit(&self, _: StructuredGraph, target: &CallTarget) -> CompileResult<CompiledCode> {
        Err(CompilationError::Backend(format!("cannot emit {}", target.name())))
    }
}

/// Test: a backend failure leaves the target interpreted and working
#[test]
fn test_backend_failure_keeps_interpreting() {
    let options = CompilerOptions::default().with_compilation_threshold(2);
    let compiler = OptimizingCompiler::new(options.clone()).with_backend(Arc::new(FailingBackend));
    let runtime = Runtime::with_options(options).with_compiler(compiler);
    let add = runtime.create_call_target(programs::add());

    for n in 0..5 {
        assert_eq!(add.invoke(&runtime, &[Value::Int(n), Value::Int(1)]).unwrap(), Value::Int(n + 1));
    }
    assert_eq!(add.state(), CallTargetState::Interpreted);
    assert_eq!(add.invocation_count(), 5);
    // Automatic compilation is not retried after a failure
    assert_eq!(runtime.compiler().stats().failures, 1);

    let err = add.request_compilation(&runtime).unwrap_err();
    assert!(matches!(err, CompilationError::Backend(_)));
    assert_eq!(runtime.compiler().stats().failures, 2);
    assert!(add.compiled_code().is_none());
}

/// Test: deep guest recursion through compiled code still overflows cleanly
#[test]
fn test_recursion_limit_applies_to_compiled_code() {
    let runtime = Runtime::with_options(CompilerOptions {
        auto_compile: false,
        max_call_depth: 32,
        ..CompilerOptions::default()
    });
    let factorial = runtime.create_call_target(programs::factorial(next_id(&runtime)));
    for n in [2, 3, 4] {
        factorial.invoke(&runtime, &[Value::Int(n)]).unwrap();
    }
    factorial.request_compilation(&runtime).unwrap();

    assert_eq!(factorial.invoke(&runtime, &[Value::Int(10)]).unwrap(), Value::Int(3_628_800));
    let err: GuestError = factorial.invoke(&runtime, &[Value::Int(10_000)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);
}
