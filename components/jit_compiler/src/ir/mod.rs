//! Graph intermediate representation
//!
//! Partial evaluation emits a [`StructuredGraph`]; the canonicalizer and
//! dead code elimination rewrite it in place; the backend consumes it.

pub mod frame_state;
pub mod graph;
pub mod node;
pub mod printer;

pub use frame_state::{materialize, FrameStateDesc};
pub use graph::{GraphError, StructuredGraph};
pub use node::{GuardCheck, Node, NodeId, NodeKind};
pub use printer::{GraphDump, GraphPrinter};
