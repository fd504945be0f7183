//! Inlining decisions for the optimizing JIT compiler
//!
//! This module provides:
//! - InliningPolicy: Pluggable, stateless decision function per call site
//! - DefaultInliningPolicy: Budget, hotness and depth thresholds
//! - InliningBudget: Cumulative size accounting for one compilation
//! - InliningPlan: The tree of decisions consumed by partial evaluation

use crate::call_target::CallTarget;
use crate::config::CompilerOptions;
use crate::error::{CompilationError, CompileResult};
use crate::runtime::Runtime;
use interpreter::{CallSiteId, CallTargetId};
use std::collections::BTreeMap;
use std::fmt;

/// A call site being considered for inlining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InliningCandidate {
    /// AST node of the call
    pub call_site: CallSiteId,
    /// Callee
    pub target: CallTargetId,
    /// Callee's estimated size (AST nodes)
    pub size: usize,
    /// Callee's interpreted invocation count
    pub invocation_count: u64,
}

/// Where in the compilation the candidate is being decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InliningContext {
    /// Inlining depth of the call site (0 for the root's own calls)
    pub depth: u32,
    /// Size still available in the compilation's budget
    pub remaining_budget: usize,
}

/// Reason why a call site was not inlined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InliningRejection {
    /// Inlining budget exhausted
    BudgetExceeded {
        /// Size required for inlining
        required: usize,
        /// Remaining budget
        remaining: usize,
    },
    /// Callee is cold (not called enough)
    Cold {
        /// Number of times called
        count: u64,
        /// Count that must be exceeded
        min: u64,
    },
    /// Maximum depth reached
    DepthExceeded {
        /// Current inlining depth
        depth: u32,
        /// Maximum allowed depth
        max: u32,
    },
}

impl InliningRejection {
    /// Short, stable name used as a statistics key
    pub fn reason(&self) -> &'static str {
        match self {
            InliningRejection::BudgetExceeded { .. } => "budget-exceeded",
            InliningRejection::Cold { .. } => "cold",
            InliningRejection::DepthExceeded { .. } => "depth-exceeded",
        }
    }
}

impl fmt::Display for InliningRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InliningRejection::BudgetExceeded { required, remaining } => {
                write!(f, "budget exceeded: needs {}, {} left", required, remaining)
            }
            InliningRejection::Cold { count, min } => {
                write!(f, "cold: {} invocations, needs more than {}", count, min)
            }
            InliningRejection::DepthExceeded { depth, max } => {
                write!(f, "depth exceeded: {} of {}", depth, max)
            }
        }
    }
}

/// Result of an inlining decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InliningDecision {
    /// Splice the callee into the caller's graph
    Inline,
    /// Keep a real call
    DoNotInline(InliningRejection),
}

impl InliningDecision {
    /// Whether the site is inlined
    pub fn should_inline(&self) -> bool {
        matches!(self, InliningDecision::Inline)
    }
}

/// Decides whether a call site is inlined
///
/// Implementations must be pure: the same candidate and context always
/// produce the same decision.
pub trait InliningPolicy: Send + Sync {
    /// Decide one call site
    fn decide(&self, candidate: &InliningCandidate, context: &InliningContext) -> InliningDecision;
}

/// Threshold policy: inline iff the candidate fits the remaining budget,
/// is hotter than the minimum and the depth limit is not reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultInliningPolicy {
    min_hotness: u64,
    max_depth: u32,
}

impl DefaultInliningPolicy {
    /// Create a policy from explicit thresholds
    pub fn new(min_hotness: u64, max_depth: u32) -> Self {
        Self { min_hotness, max_depth }
    }

    /// Create a policy from compiler options
    pub fn from_options(options: &CompilerOptions) -> Self {
        Self::new(options.inlining_min_hotness, options.max_inlining_depth)
    }
}

impl Default for DefaultInliningPolicy {
    fn default() -> Self {
        Self::from_options(&CompilerOptions::default())
    }
}

impl InliningPolicy for DefaultInliningPolicy {
    fn decide(&self, candidate: &InliningCandidate, context: &InliningContext) -> InliningDecision {
        if candidate.size > context.remaining_budget {
            return InliningDecision::DoNotInline(InliningRejection::BudgetExceeded {
                required: candidate.size,
                remaining: context.remaining_budget,
            });
        }
        if candidate.invocation_count <= self.min_hotness {
            return InliningDecision::DoNotInline(InliningRejection::Cold {
                count: candidate.invocation_count,
                min: self.min_hotness,
            });
        }
        if context.depth >= self.max_depth {
            return InliningDecision::DoNotInline(InliningRejection::DepthExceeded {
                depth: context.depth,
                max: self.max_depth,
            });
        }
        InliningDecision::Inline
    }
}

/// Budget tracker for one compilation
#[derive(Debug, Clone)]
pub struct InliningBudget {
    /// Maximum total size allowed
    max_size: usize,
    /// Current consumed size
    consumed_size: usize,
}

impl InliningBudget {
    /// Create a new inlining budget
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            consumed_size: 0,
        }
    }

    /// Get remaining budget
    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.consumed_size)
    }

    /// Consume budget for an inlined callee
    pub fn consume(&mut self, size: usize) {
        self.consumed_size += size;
    }

    /// Size consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed_size
    }
}

/// Statistics about one plan construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InliningStats {
    /// Total decisions made
    pub decisions_made: u64,
    /// Call sites inlined
    pub sites_inlined: u64,
    /// Call sites kept as real calls
    pub sites_rejected: u64,
    /// Rejections by reason
    pub rejection_counts: BTreeMap<&'static str, u64>,
    /// Deepest inlined level
    pub max_depth_reached: u32,
}

impl InliningStats {
    fn record(&mut self, decision: &InliningDecision, depth: u32) {
        self.decisions_made += 1;
        match decision {
            InliningDecision::Inline => {
                self.sites_inlined += 1;
                self.max_depth_reached = self.max_depth_reached.max(depth + 1);
            }
            InliningDecision::DoNotInline(rejection) => {
                self.sites_rejected += 1;
                *self.rejection_counts.entry(rejection.reason()).or_insert(0) += 1;
            }
        }
    }
}

/// One decided call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// AST node of the call
    pub call_site: CallSiteId,
    /// Callee
    pub target: CallTargetId,
    /// What the policy decided
    pub decision: InliningDecision,
    /// Decisions for the callee's own call sites (empty unless inlined)
    pub children: Vec<PlanEntry>,
}

impl PlanEntry {
    /// Whether the site is inlined
    pub fn is_inlined(&self) -> bool {
        self.decision.should_inline()
    }
}

/// Immutable record of every inlining decision for one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InliningPlan {
    root: CallTargetId,
    entries: Vec<PlanEntry>,
    inlined_size: usize,
    stats: InliningStats,
}

impl InliningPlan {
    /// Decide every call site reachable from `root`, depth first in
    /// declaration order
    ///
    /// The policy is queried exactly once per reachable call site; budget
    /// consumed by one inlined callee is unavailable to later ones.
    pub fn build(
        runtime: &Runtime,
        root: &CallTarget,
        policy: &dyn InliningPolicy,
        budget: usize,
    ) -> CompileResult<Self> {
        let mut builder = PlanBuilder {
            runtime,
            policy,
            budget: InliningBudget::new(budget),
            stats: InliningStats::default(),
        };
        let entries = builder.decide_sites(root, 0)?;
        let plan = Self {
            root: root.id(),
            entries,
            inlined_size: builder.budget.consumed(),
            stats: builder.stats,
        };
        tracing::debug!(
            target = root.name(),
            inlined = plan.stats.sites_inlined,
            rejected = plan.stats.sites_rejected,
            size = plan.inlined_size,
            "inlining plan built"
        );
        Ok(plan)
    }

    /// A plan that inlines nothing; every call stays a real call
    pub fn empty(root: CallTargetId) -> Self {
        Self {
            root,
            entries: Vec::new(),
            inlined_size: 0,
            stats: InliningStats::default(),
        }
    }

    /// Root call target the plan was built for
    pub fn root(&self) -> CallTargetId {
        self.root
    }

    /// Decisions for the root's own call sites
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Total estimated size of inlined callees
    pub fn inlined_size(&self) -> usize {
        self.inlined_size
    }

    /// Number of inlined sites at any depth
    pub fn inlined_count(&self) -> usize {
        self.decisions().iter().filter(|(_, _, inline)| *inline).count()
    }

    /// Flattened decisions in traversal order
    pub fn decisions(&self) -> Vec<(CallSiteId, CallTargetId, bool)> {
        fn walk(entries: &[PlanEntry], out: &mut Vec<(CallSiteId, CallTargetId, bool)>) {
            for entry in entries {
                out.push((entry.call_site, entry.target, entry.is_inlined()));
                walk(&entry.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.entries, &mut out);
        out
    }

    /// Statistics gathered while building
    pub fn stats(&self) -> &InliningStats {
        &self.stats
    }
}

struct PlanBuilder<'a> {
    runtime: &'a Runtime,
    policy: &'a dyn InliningPolicy,
    budget: InliningBudget,
    stats: InliningStats,
}

impl PlanBuilder<'_> {
    fn decide_sites(&mut self, caller: &CallTarget, depth: u32) -> CompileResult<Vec<PlanEntry>> {
        let mut entries = Vec::new();
        for (call_site, target) in caller.root().call_sites() {
            let callee = self
                .runtime
                .call_target(target)
                .ok_or(CompilationError::UnresolvedCallTarget(target))?;

            let candidate = InliningCandidate {
                call_site,
                target,
                size: callee.size_estimate(),
                invocation_count: callee.invocation_count(),
            };
            let context = InliningContext {
                depth,
                remaining_budget: self.budget.remaining(),
            };
            let decision = self.policy.decide(&candidate, &context);
            self.stats.record(&decision, depth);
            tracing::debug!(
                caller = caller.name(),
                callee = callee.name(),
                %call_site,
                depth,
                ?decision,
                "inlining decision"
            );

            let children = if decision.should_inline() {
                self.budget.consume(candidate.size);
                self.decide_sites(&callee, depth + 1)?
            } else {
                Vec::new()
            };
            entries.push(PlanEntry {
                call_site,
                target,
                decision,
                children,
            });
        }
        Ok(entries)
    }
}
