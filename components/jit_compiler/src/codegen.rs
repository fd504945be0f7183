//! Code generation backends
//!
//! A [`Backend`] consumes the finalized graph of one compilation and
//! produces installable [`CompiledCode`]. The default [`GraphBackend`]
//! checks the graph and executes it directly; a native code generator
//! plugs in through the same trait.

use crate::call_target::CallTarget;
use crate::compiled_code::CompiledCode;
use crate::error::{CompilationError, CompileResult};
use crate::ir::StructuredGraph;

/// Turns finalized graphs into executable code
pub trait Backend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Produce code for `target` from `graph`; the graph is consumed
    fn emit(&self, graph: StructuredGraph, target: &CallTarget) -> CompileResult<CompiledCode>;
}

/// Backend that executes the graph itself
#[derive(Debug, Clone, Default)]
pub struct GraphBackend;

impl GraphBackend {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl Backend for GraphBackend {
    fn name(&self) -> &str {
        "graph"
    }

    fn emit(&self, graph: StructuredGraph, target: &CallTarget) -> CompileResult<CompiledCode> {
        if graph.node_count() <= 1 {
            return Err(CompilationError::Backend(format!(
                "graph for '{}' has no code",
                target.name()
            )));
        }
        graph.verify()?;
        graph.verify_frame_states()?;
        CompiledCode::new(target.id(), graph)
    }
}
