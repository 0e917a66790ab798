//! Engine-facing seam of the debugger.
//!
//! The rule engine itself lives elsewhere. It reports every function invocation to an
//! [`EngineListener`] and exposes read access to its execution contexts, fact base and agenda
//! through the traits below.

use crate::debugger::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Kind of engine callback: fired right before (`Call`) and right after (`Return`) a function
/// invocation, on the invoking thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Call,
    Return,
}

/// A single function invocation.
pub trait Call: Send + Sync {
    /// Invoked function name.
    fn name(&self) -> &str;
}

/// Shared handle to an invocation. Two handles are equal only if they point to the same
/// invocation object, structurally equal calls are still different calls.
#[derive(Clone)]
pub struct CallHandle(Arc<dyn Call>);

impl CallHandle {
    pub fn new(call: impl Call + 'static) -> Self {
        Self(Arc::new(call))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl PartialEq for CallHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CallHandle {}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Call({} @ {:p})", self.name(), Arc::as_ptr(&self.0))
    }
}

/// Source position of a call. Absent for builtin functions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumberRecord {
    pub file: String,
    pub line: u32,
}

impl LineNumberRecord {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// File name without directories, breakpoints are matched against it.
    pub fn base_name(&self) -> &str {
        base_name(&self.file)
    }
}

pub(crate) fn base_name(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file)
}

/// One level of a call stack.
#[derive(Clone, Debug)]
pub struct Frame {
    pub call: CallHandle,
    pub line: Option<LineNumberRecord>,
}

/// Engine execution context of a thread. Contexts are linked to their parents and together
/// form the call stack.
pub trait ExecutionContext: Send + Sync {
    /// Call currently executed in this context.
    fn current_call(&self) -> Option<CallHandle>;

    /// Source location of the current call.
    fn line_number(&self) -> Option<LineNumberRecord>;

    /// Frames owned by this context, innermost first.
    fn frames(&self) -> Vec<Frame>;

    /// Names of live bindings.
    fn variable_names(&self) -> Vec<String>;

    /// Rendered value of a live binding.
    fn variable(&self, name: &str) -> Option<String>;

    fn parent(&self) -> Option<ContextHandle>;
}

pub type ContextHandle = Arc<dyn ExecutionContext>;

/// Iterate over a context and all its parents, innermost first.
pub fn context_chain(ctx: &ContextHandle) -> impl Iterator<Item = ContextHandle> {
    std::iter::successors(Some(ctx.clone()), |ctx| ctx.parent())
}

/// Callback registered in the engine.
pub trait EngineListener: Send + Sync {
    fn on_engine_event(
        &self,
        kind: EngineEvent,
        call: &CallHandle,
        ctx: &ContextHandle,
    ) -> Result<(), Error>;
}

/// A working memory element as seen by the debugger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactView {
    pub id: u64,
    pub name: String,
    pub slots: Vec<(String, String)>,
}

/// Read-only engine services used while a client inspects the engine.
pub trait Engine: Send + Sync {
    /// Evaluate an expression in the given context. Evaluation may invoke engine functions
    /// and therefore fire listener callbacks on the evaluating thread.
    fn evaluate(&self, expr: &str, ctx: &ContextHandle) -> anyhow::Result<String>;

    /// Fact by id, [`None`] if retracted or never existed.
    fn fact(&self, id: u64) -> Option<FactView>;

    /// Activation selected for firing, if any.
    fn current_activation(&self) -> Option<String>;

    /// Name of the module in focus.
    fn focus(&self) -> String;

    /// Pending activations of a module in firing order.
    fn agenda(&self, module: &str) -> anyhow::Result<Vec<String>>;
}
