//! Profiling vocabulary for compilation decisions
//!
//! This module is placed in core_types so that the interpreter (which
//! records profiles) and the compiler (which speculates on them) share one
//! set of types without depending on each other.

use crate::Value;
use serde::{Deserialize, Serialize};

/// Type information for profiling feedback and compile-time stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeInfo {
    /// Integer value
    Int,
    /// Boolean value
    Bool,
    /// Null value
    Null,
}

impl TypeInfo {
    /// Checks whether `value` has this type.
    pub fn matches(&self, value: &Value) -> bool {
        value.type_info() == *self
    }
}

/// Branch outcome for profiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    /// Condition evaluated to true
    Taken,
    /// Condition evaluated to false
    NotTaken,
}

/// Type feedback lattice for one observed position (an argument slot).
///
/// Feedback only moves up: `Uninitialized -> Monomorphic -> Polymorphic`.
///
/// # Examples
///
/// ```
/// use core_types::{TypeFeedback, TypeInfo};
///
/// let feedback = TypeFeedback::Uninitialized
///     .merge(TypeInfo::Int)
///     .merge(TypeInfo::Int);
/// assert_eq!(feedback.monomorphic(), Some(TypeInfo::Int));
///
/// let feedback = feedback.merge(TypeInfo::Bool);
/// assert_eq!(feedback, TypeFeedback::Polymorphic);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeFeedback {
    /// Nothing observed yet
    #[default]
    Uninitialized,
    /// Exactly one type observed
    Monomorphic(TypeInfo),
    /// More than one type observed
    Polymorphic,
}

impl TypeFeedback {
    /// Returns the feedback after additionally observing `observed`.
    pub fn merge(self, observed: TypeInfo) -> Self {
        match self {
            TypeFeedback::Uninitialized => TypeFeedback::Monomorphic(observed),
            TypeFeedback::Monomorphic(seen) if seen == observed => self,
            _ => TypeFeedback::Polymorphic,
        }
    }

    /// Returns the single observed type, if the feedback is monomorphic.
    pub fn monomorphic(&self) -> Option<TypeInfo> {
        match self {
            TypeFeedback::Monomorphic(info) => Some(*info),
            _ => None,
        }
    }

    /// Compact encoding used by atomic profile slots.
    pub fn to_bits(self) -> u8 {
        match self {
            TypeFeedback::Uninitialized => 0,
            TypeFeedback::Monomorphic(TypeInfo::Int) => 1,
            TypeFeedback::Monomorphic(TypeInfo::Bool) => 2,
            TypeFeedback::Monomorphic(TypeInfo::Null) => 3,
            TypeFeedback::Polymorphic => 4,
        }
    }

    /// Inverse of [`TypeFeedback::to_bits`]; unknown encodings are polymorphic.
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => TypeFeedback::Uninitialized,
            1 => TypeFeedback::Monomorphic(TypeInfo::Int),
            2 => TypeFeedback::Monomorphic(TypeInfo::Bool),
            3 => TypeFeedback::Monomorphic(TypeInfo::Null),
            _ => TypeFeedback::Polymorphic,
        }
    }
}

/// Snapshot of how often a conditional went each way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BranchProfile {
    /// Times the condition was true
    pub taken: u64,
    /// Times the condition was false
    pub not_taken: u64,
}

impl BranchProfile {
    /// Create a profile from raw counts
    pub fn new(taken: u64, not_taken: u64) -> Self {
        Self { taken, not_taken }
    }

    /// Total number of recorded executions
    pub fn total(&self) -> u64 {
        self.taken.saturating_add(self.not_taken)
    }

    /// Returns the only outcome ever observed.
    ///
    /// `None` when the branch never ran or went both ways. A one-sided
    /// profile is what the compiler needs before pruning the other side.
    pub fn one_sided(&self) -> Option<BranchOutcome> {
        match (self.taken, self.not_taken) {
            (0, 0) => None,
            (_, 0) => Some(BranchOutcome::Taken),
            (0, _) => Some(BranchOutcome::NotTaken),
            _ => None,
        }
    }
}
