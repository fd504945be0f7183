//! Integration test suite for the partial-evaluation JIT
//!
//! This crate provides guest programs shared by the integration tests,
//! which check that the interpreter, the compiler and the deoptimizer agree
//! across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use core_types;
    pub use interpreter;
    pub use jit_compiler;
}

/// Install a log subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Guest programs used across the suites
pub mod programs {
    use interpreter::{CallTargetId, Node, RootNode};

    /// `identity(x) = x`
    pub fn identity() -> RootNode {
        RootNode::new("identity", 1, Node::ret(Node::arg(0)))
    }

    /// `add(a, b) = a + b`
    pub fn add() -> RootNode {
        RootNode::new("add", 2, Node::ret(Node::add(Node::arg(0), Node::arg(1))))
    }

    /// `add_via(a, b) = identity(a) + identity(b)`
    pub fn add_via(identity: CallTargetId) -> RootNode {
        RootNode::new(
            "add_via",
            2,
            Node::ret(Node::add(
                Node::call(identity, vec![Node::arg(0)]),
                Node::call(identity, vec![Node::arg(1)]),
            )),
        )
    }

    /// `five() = 2 + 3`
    pub fn five() -> RootNode {
        RootNode::new(
            "five",
            0,
            Node::ret(Node::add(Node::constant(2), Node::constant(3))),
        )
    }

    /// `abs(x) = if x < 0 { -x } else { x }`
    pub fn abs() -> RootNode {
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

    /// `sum_to(n)`: 0 + 1 + ... + (n - 1) with a loop
    pub fn sum_to() -> RootNode {
        RootNode::new(
            "sum_to",
            1,
            Node::block(vec![
                Node::assign(0, Node::constant(0)),
                Node::assign(1, Node::constant(0)),
                Node::while_loop(
                    Node::less_than(Node::local(0), Node::arg(0)),
                    Node::block(vec![
                        Node::assign(1, Node::add(Node::local(1), Node::local(0))),
                        Node::assign(0, Node::add(Node::local(0), Node::constant(1))),
                    ]),
                ),
                Node::ret(Node::local(1)),
            ]),
        )
    }

    /// `factorial(n)`, recursive through call target `itself`
    pub fn factorial(itself: CallTargetId) -> RootNode {
        RootNode::new(
            "factorial",
            1,
            Node::if_then(
                Node::less_than(Node::arg(0), Node::constant(2)),
                Node::ret(Node::constant(1)),
                Some(Node::ret(Node::mul(
                    Node::arg(0),
                    Node::call(itself, vec![Node::sub(Node::arg(0), Node::constant(1))]),
                ))),
            ),
        )
    }
}
