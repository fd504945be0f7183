//! Call targets
//!
//! A [`CallTarget`] is one executable guest root. It is interpreted (and
//! profiled) until it gets hot, then compiled; the compiled code is used for
//! later invocations until a speculation fails and the code is invalidated.

use crate::compiled_code::{CompiledCode, ExecutionResult};
use crate::deopt::DeoptReason;
use crate::error::{CompilationError, CompileResult};
use crate::runtime::Runtime;
use core_types::{GuestError, Value};
use interpreter::{CallTargetId, FrameSnapshot, Interpreter, RootNode, RootProfile};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a compilation request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationStatus {
    /// This request compiled and installed new code
    Compiled,
    /// Valid code was already installed
    AlreadyCompiled,
    /// Another thread is compiling this target
    AlreadyCompiling,
    /// The target deoptimized too often and stays interpreted
    Disabled,
}

/// Coarse execution state, for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTargetState {
    /// Running in the interpreter
    Interpreted,
    /// A compilation is in progress
    Compiling,
    /// Valid compiled code is installed
    Compiled,
    /// Compilation was given up on
    Disabled,
}

/// Resets the in-progress flag when a compilation attempt ends
struct CompilingFlag<'a>(&'a AtomicBool);

impl Drop for CompilingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An executable guest root with its profile and compiled code
#[derive(Debug)]
pub struct CallTarget {
    id: CallTargetId,
    root: Arc<RootNode>,
    profile: RootProfile,
    invocation_count: AtomicU64,
    compiling: AtomicBool,
    code: RwLock<Option<Arc<CompiledCode>>>,
    compilation_count: AtomicU64,
    deopt_count: AtomicU32,
    /// Set after a failed automatic compilation
    failed: AtomicBool,
    disabled: AtomicBool,
}

impl CallTarget {
    pub(crate) fn new(id: CallTargetId, root: RootNode) -> Self {
        let profile = RootProfile::new(root.parameter_count(), root.node_count());
        Self {
            id,
            root: Arc::new(root),
            profile,
            invocation_count: AtomicU64::new(0),
            compiling: AtomicBool::new(false),
            code: RwLock::new(None),
            compilation_count: AtomicU64::new(0),
            deopt_count: AtomicU32::new(0),
            failed: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
        }
    }

    /// Identity within the runtime
    pub fn id(&self) -> CallTargetId {
        self.id
    }

    /// Root name
    pub fn name(&self) -> &str {
        self.root.name()
    }

    /// The AST being executed
    pub fn root(&self) -> &Arc<RootNode> {
        &self.root
    }

    /// Accumulated argument and branch feedback
    pub fn profile(&self) -> &RootProfile {
        &self.profile
    }

    /// Number of interpreted invocations
    pub fn invocation_count(&self) -> u64 {
        self.invocation_count.load(Ordering::Relaxed)
    }

    /// Size estimate used by inlining decisions
    pub fn size_estimate(&self) -> usize {
        self.root.node_count()
    }

    /// Installed code, if still valid
    pub fn compiled_code(&self) -> Option<Arc<CompiledCode>> {
        self.code.read().as_ref().filter(|code| code.is_valid()).cloned()
    }

    /// Whether valid compiled code is installed
    pub fn is_compiled(&self) -> bool {
        self.compiled_code().is_some()
    }

    /// Number of successful compilations
    pub fn compilation_count(&self) -> u64 {
        self.compilation_count.load(Ordering::Relaxed)
    }

    /// Number of deoptimizations of this target's code
    pub fn deopt_count(&self) -> u32 {
        self.deopt_count.load(Ordering::Relaxed)
    }

    /// Current execution state
    pub fn state(&self) -> CallTargetState {
        if self.disabled.load(Ordering::Acquire) {
            CallTargetState::Disabled
        } else if self.is_compiled() {
            CallTargetState::Compiled
        } else if self.compiling.load(Ordering::Acquire) {
            CallTargetState::Compiling
        } else {
            CallTargetState::Interpreted
        }
    }

    /// Execute the target
    ///
    /// Runs installed code when there is some; otherwise interprets,
    /// counting the invocation and compiling once the threshold is reached.
    pub fn invoke(&self, runtime: &Runtime, arguments: &[Value]) -> Result<Value, GuestError> {
        self.profile.record_arguments(arguments);

        if let Some(code) = self.compiled_code() {
            return match code.execute(runtime, arguments)? {
                ExecutionResult::Returned(value) => Ok(value),
                ExecutionResult::Deoptimized(deopt) => {
                    self.on_deoptimized(runtime, &code, deopt.reason);
                    runtime.deoptimizer().deoptimize(runtime, self.id, deopt)
                }
            };
        }

        let count = self.invocation_count.fetch_add(1, Ordering::Relaxed) + 1;
        let result = Interpreter::new(&self.root, runtime)
            .with_profile(&self.profile)
            .execute(arguments.to_vec());

        if self.should_compile(runtime, count) {
            if let Err(err) = self.request_compilation(runtime) {
                self.failed.store(true, Ordering::Release);
                tracing::warn!(target = self.name(), error = %err, "automatic compilation failed");
            }
        }
        result
    }

    /// Continue an invocation of this target from a deoptimization snapshot
    pub fn resume(&self, runtime: &Runtime, frame: &FrameSnapshot) -> Result<Value, GuestError> {
        Interpreter::new(&self.root, runtime)
            .with_profile(&self.profile)
            .resume(frame)
    }

    /// Compile and install code unless that already happened or is
    /// happening on another thread
    ///
    /// At most one compilation runs per target at a time. A failure leaves
    /// the target interpreted and any previously installed code untouched.
    pub fn request_compilation(&self, runtime: &Runtime) -> CompileResult<CompilationStatus> {
        if self.disabled.load(Ordering::Acquire) {
            return Ok(CompilationStatus::Disabled);
        }
        if self.is_compiled() {
            return Ok(CompilationStatus::AlreadyCompiled);
        }
        if self
            .compiling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(CompilationStatus::AlreadyCompiling);
        }
        let _flag = CompilingFlag(&self.compiling);
        if self.is_compiled() {
            return Ok(CompilationStatus::AlreadyCompiled);
        }

        let this = runtime
            .call_target(self.id)
            .ok_or(CompilationError::UnresolvedCallTarget(self.id))?;
        let code = runtime.compiler().compile(runtime, &this)?;
        *self.code.write() = Some(Arc::new(code));
        self.compilation_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target = self.name(), "code installed");
        Ok(CompilationStatus::Compiled)
    }

    /// Drop installed code and fall back to interpretation
    pub fn invalidate(&self) {
        if let Some(code) = self.code.write().take() {
            code.invalidate();
            tracing::debug!(target = self.name(), "code invalidated");
        }
    }

    fn should_compile(&self, runtime: &Runtime, count: u64) -> bool {
        let options = runtime.options();
        options.auto_compile
            && count >= options.compilation_threshold
            && !self.failed.load(Ordering::Acquire)
            && !self.disabled.load(Ordering::Acquire)
            && !self.is_compiled()
    }

    fn on_deoptimized(&self, runtime: &Runtime, code: &Arc<CompiledCode>, reason: DeoptReason) {
        // Lazy deopts find the code already invalidated by whoever failed
        if reason == DeoptReason::Invalidated {
            return;
        }
        {
            let mut installed = self.code.write();
            if installed.as_ref().is_some_and(|current| Arc::ptr_eq(current, code)) {
                *installed = None;
            }
        }
        code.invalidate();

        let deopts = self.deopt_count.fetch_add(1, Ordering::Relaxed) + 1;
        if deopts >= runtime.options().max_deopts {
            self.disabled.store(true, Ordering::Release);
            tracing::warn!(target = self.name(), deopts, "too many deoptimizations, staying interpreted");
        }
    }
}
