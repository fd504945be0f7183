//! Compiler configuration
//!
//! Every option bounds work (when to compile, how far to inline, how long
//! the passes may iterate); none of them affects the meaning of compiled
//! code.

use serde::{Deserialize, Serialize};

/// Options recognized by the runtime, the inlining policy and the passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Interpreted invocations before automatic compilation
    pub compilation_threshold: u64,
    /// Compile automatically once the threshold is reached
    pub auto_compile: bool,
    /// Invocation count a callee must exceed to be inlined
    pub inlining_min_hotness: u64,
    /// Maximum nesting of inlined call targets
    pub max_inlining_depth: u32,
    /// Total AST size that may be inlined into one compilation
    pub inlining_budget: usize,
    /// Iteration cap for the canonicalizer and the joint optimization loop
    pub canonicalizer_iterations: usize,
    /// Deoptimizations after which a call target stays interpreted
    pub max_deopts: u32,
    /// Guest call depth before a StackOverflow is raised
    pub max_call_depth: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            compilation_threshold: 3,     // Compile after a short warm-up
            auto_compile: true,           // Hot targets compile themselves
            inlining_min_hotness: 0,      // Any callee that ran at least once
            max_inlining_depth: 8,        // Don't inline too deeply
            inlining_budget: 1000,        // Limit overall graph growth
            canonicalizer_iterations: 32, // Plenty for well-formed graphs
            max_deopts: 10,               // Give up on speculation after this
            max_call_depth: 256,          // Guest recursion limit
        }
    }
}

impl CompilerOptions {
    /// Parse options from JSON; missing fields take their defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use jit_compiler::CompilerOptions;
    ///
    /// let options = CompilerOptions::from_json(r#"{ "max_inlining_depth": 2 }"#).unwrap();
    /// assert_eq!(options.max_inlining_depth, 2);
    /// assert_eq!(options.inlining_budget, 1000);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Set the compilation threshold
    pub fn with_compilation_threshold(mut self, threshold: u64) -> Self {
        self.compilation_threshold = threshold;
        self
    }

    /// Enable or disable automatic compilation
    pub fn with_auto_compile(mut self, enabled: bool) -> Self {
        self.auto_compile = enabled;
        self
    }

    /// Set the inlining hotness threshold
    pub fn with_inlining_min_hotness(mut self, hotness: u64) -> Self {
        self.inlining_min_hotness = hotness;
        self
    }

    /// Set the maximum inlining depth
    pub fn with_max_inlining_depth(mut self, depth: u32) -> Self {
        self.max_inlining_depth = depth;
        self
    }

    /// Set the inlining size budget
    pub fn with_inlining_budget(mut self, budget: usize) -> Self {
        self.inlining_budget = budget;
        self
    }

    /// Set the canonicalizer iteration cap
    pub fn with_canonicalizer_iterations(mut self, iterations: usize) -> Self {
        self.canonicalizer_iterations = iterations;
        self
    }

    /// Set the deoptimization limit
    pub fn with_max_deopts(mut self, max: u32) -> Self {
        self.max_deopts = max;
        self
    }
}
