//! Deoptimization support
//!
//! Handles the transition from compiled code back to the interpreter when a
//! speculative assumption fails. Compiled code reports a [`Deoptimization`]
//! carrying the materialized frames; the [`Deoptimizer`] resumes them
//! innermost first, feeding each frame's result into its caller.

use crate::runtime::Runtime;
use core_types::{ErrorKind, GuestError, Value};
use interpreter::{AstNodeId, CallTargetId, FrameSnapshot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Reason for deoptimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeoptReason {
    /// A value did not have the speculated type
    TypeGuardFailure,
    /// Control reached a branch the profile never saw taken
    UnreachedBranch,
    /// The operation must be performed (and fail) in the interpreter
    TransferToInterpreter,
    /// The code was invalidated while a call was in progress
    Invalidated,
}

/// Outcome of compiled code that bailed out
#[derive(Debug, Clone, PartialEq)]
pub struct Deoptimization {
    /// Why execution left compiled code
    pub reason: DeoptReason,
    /// Innermost interpreter frame, chained to its callers
    pub snapshot: FrameSnapshot,
}

/// Information about a deoptimization event
#[derive(Debug, Clone, PartialEq)]
pub struct DeoptInfo {
    /// Compiled call target that deoptimized
    pub target: CallTargetId,
    /// Reason for deoptimization
    pub reason: DeoptReason,
    /// Innermost resume point
    pub resume_node: AstNodeId,
    /// Number of virtual frames rebuilt
    pub frames: usize,
}

/// Most recent events kept in the history
const HISTORY_LIMIT: usize = 256;

/// Resumes deoptimized frames in the interpreter and keeps a history of
/// deoptimization events
#[derive(Debug)]
pub struct Deoptimizer {
    /// History of deoptimizations (for tracking hot deopt points)
    history: Mutex<Vec<DeoptInfo>>,
}

impl Deoptimizer {
    /// Create a new deoptimizer
    pub fn new() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
        }
    }

    /// Record a deoptimization of `target`'s code and finish the invocation
    /// in the interpreter
    pub fn deoptimize(
        &self,
        runtime: &Runtime,
        target: CallTargetId,
        deopt: Deoptimization,
    ) -> Result<Value, GuestError> {
        let info = DeoptInfo {
            target,
            reason: deopt.reason,
            resume_node: deopt.snapshot.node,
            frames: deopt.snapshot.depth(),
        };
        tracing::debug!(
            target = %info.target,
            reason = ?info.reason,
            node = %info.resume_node,
            frames = info.frames,
            "deoptimizing"
        );
        {
            let mut history = self.history.lock();
            if history.len() == HISTORY_LIMIT {
                history.remove(0);
            }
            history.push(info);
        }
        Self::resume(runtime, deopt.snapshot)
    }

    /// Resume a chain of frames, innermost first
    pub fn resume(runtime: &Runtime, snapshot: FrameSnapshot) -> Result<Value, GuestError> {
        let mut frame = snapshot;
        loop {
            let outer = frame.outer.take();
            let target = runtime.call_target(frame.target).ok_or_else(|| {
                GuestError::new(
                    ErrorKind::UnknownCallTarget,
                    format!("cannot resume unknown call target {}", frame.target),
                )
            })?;
            let value = target.resume(runtime, &frame)?;
            match outer {
                None => return Ok(value),
                Some(mut outer) => {
                    outer.stack.push(value);
                    frame = *outer;
                }
            }
        }
    }

    /// Get the deoptimization count
    pub fn deopt_count(&self) -> usize {
        self.history.lock().len()
    }

    /// Get deoptimization history
    pub fn history(&self) -> Vec<DeoptInfo> {
        self.history.lock().clone()
    }

    /// Clear deoptimization history
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Check if a specific reason has caused frequent deopts
    pub fn is_frequent_deopt_reason(&self, reason: DeoptReason) -> bool {
        let count = self
            .history
            .lock()
            .iter()
            .filter(|info| info.reason == reason)
            .count();
        count >= 3
    }
}

impl Default for Deoptimizer {
    fn default() -> Self {
        Self::new()
    }
}
