//! Profiling data collection for compilation decisions
//!
//! A [`RootProfile`] belongs to one call target. It is written by every
//! interpreted invocation (possibly from many threads at once) and read by
//! the compiler, so every slot is an atomic and recording never blocks.

use crate::ast::AstNodeId;
use core_types::{BranchProfile, TypeFeedback, Value};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

#[derive(Debug, Default)]
struct BranchCounter {
    taken: AtomicU64,
    not_taken: AtomicU64,
}

/// Per-root profile: argument type feedback and per-conditional branch counts
#[derive(Debug)]
pub struct RootProfile {
    /// One encoded [`TypeFeedback`] per declared parameter
    arguments: Box<[AtomicU8]>,
    /// Indexed by AST node id; only `If`/`While` slots are ever written
    branches: Box<[BranchCounter]>,
    /// Invocations whose argument count differed from the parameter count
    arity_mismatches: AtomicU64,
}

impl RootProfile {
    /// Create an empty profile sized for a root
    pub fn new(parameter_count: usize, node_count: usize) -> Self {
        Self {
            arguments: (0..parameter_count).map(|_| AtomicU8::new(0)).collect(),
            branches: (0..node_count).map(|_| BranchCounter::default()).collect(),
            arity_mismatches: AtomicU64::new(0),
        }
    }

    /// Record the types of one invocation's arguments
    ///
    /// A call with the wrong number of arguments makes every slot
    /// polymorphic.
    pub fn record_arguments(&self, arguments: &[Value]) {
        if arguments.len() != self.arguments.len() {
            self.arity_mismatches.fetch_add(1, Ordering::Relaxed);
            let polymorphic = TypeFeedback::Polymorphic.to_bits();
            for slot in self.arguments.iter() {
                slot.store(polymorphic, Ordering::Relaxed);
            }
            return;
        }
        for (slot, argument) in self.arguments.iter().zip(arguments) {
            let observed = argument.type_info();
            let mut current = slot.load(Ordering::Relaxed);
            loop {
                let merged = TypeFeedback::from_bits(current).merge(observed).to_bits();
                if merged == current {
                    break;
                }
                match slot.compare_exchange_weak(current, merged, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }
    }

    /// Feedback for one parameter
    pub fn argument_feedback(&self, index: usize) -> TypeFeedback {
        self.arguments
            .get(index)
            .map(|slot| TypeFeedback::from_bits(slot.load(Ordering::Relaxed)))
            .unwrap_or(TypeFeedback::Polymorphic)
    }

    /// Number of invocations seen with the wrong argument count
    pub fn arity_mismatches(&self) -> u64 {
        self.arity_mismatches.load(Ordering::Relaxed)
    }

    /// Record which way a conditional went
    pub fn record_branch(&self, node: AstNodeId, taken: bool) {
        if let Some(counter) = self.branches.get(node.index()) {
            let slot = if taken {
                &counter.taken
            } else {
                &counter.not_taken
            };
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of one conditional's counts
    pub fn branch(&self, node: AstNodeId) -> BranchProfile {
        self.branches
            .get(node.index())
            .map(|counter| {
                BranchProfile::new(
                    counter.taken.load(Ordering::Relaxed),
                    counter.not_taken.load(Ordering::Relaxed),
                )
            })
            .unwrap_or_default()
    }
}
