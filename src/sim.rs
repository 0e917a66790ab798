//! Simulated rule engine.
//!
//! Runs trees of [`Function`] invocations on the calling thread and reports each invocation to a
//! registered listener, the same way a real engine does. Used by the demo host and by tests.

use crate::debugger::engine::{
    Call, CallHandle, ContextHandle, Engine, EngineEvent, EngineListener, ExecutionContext,
    FactView, Frame, LineNumberRecord,
};
use crate::debugger::Error;
use anyhow::{anyhow, bail, Context};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

struct SimCall {
    name: String,
}

impl Call for SimCall {
    fn name(&self) -> &str {
        &self.name
    }
}

struct SimContext {
    call: CallHandle,
    line: Option<LineNumberRecord>,
    bindings: BTreeMap<String, String>,
    parent: Option<ContextHandle>,
}

impl ExecutionContext for SimContext {
    fn current_call(&self) -> Option<CallHandle> {
        Some(self.call.clone())
    }

    fn line_number(&self) -> Option<LineNumberRecord> {
        self.line.clone()
    }

    fn frames(&self) -> Vec<Frame> {
        vec![Frame {
            call: self.call.clone(),
            line: self.line.clone(),
        }]
    }

    fn variable_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.bindings.get(name).cloned()
    }

    fn parent(&self) -> Option<ContextHandle> {
        self.parent.clone()
    }
}

/// Function of a simulated rule program: name, source place, local bindings and nested calls.
#[derive(Clone, Debug, Default)]
pub struct Function {
    pub name: String,
    pub place: Option<LineNumberRecord>,
    pub bindings: Vec<(String, String)>,
    pub body: Vec<Function>,
}

impl Function {
    /// Builtin function, without source place.
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn new(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            place: Some(LineNumberRecord::new(file, line)),
            ..Default::default()
        }
    }

    pub fn bind(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.push((var.into(), value.into()));
        self
    }

    pub fn calls(mut self, function: Function) -> Self {
        self.body.push(function);
        self
    }
}

#[derive(Default)]
struct WorkingMemory {
    facts: BTreeMap<u64, FactView>,
    next_fact_id: u64,
    agenda: BTreeMap<String, Vec<String>>,
    focus: Option<String>,
    selected: Option<String>,
}

/// In-process engine with a fact base and an agenda.
#[derive(Default)]
pub struct SimEngine {
    listener: RwLock<Option<Weak<dyn EngineListener>>>,
    memory: Mutex<WorkingMemory>,
}

impl SimEngine {
    pub const MAIN_MODULE: &'static str = "MAIN";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register invocation listener. Engine keeps a weak reference only.
    pub fn set_listener(&self, listener: Arc<dyn EngineListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::downgrade(&listener));
    }

    fn memory(&self) -> MutexGuard<'_, WorkingMemory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a fact into working memory, return fact id.
    pub fn assert_fact(&self, name: &str, slots: &[(&str, &str)]) -> u64 {
        let mut memory = self.memory();
        memory.next_fact_id += 1;
        let id = memory.next_fact_id;
        let fact = FactView {
            id,
            name: name.to_string(),
            slots: slots
                .iter()
                .map(|(slot, value)| (slot.to_string(), value.to_string()))
                .collect(),
        };
        memory.facts.insert(id, fact);
        id
    }

    pub fn retract(&self, id: u64) -> bool {
        self.memory().facts.remove(&id).is_some()
    }

    pub fn add_activation(&self, module: &str, activation: &str) {
        self.memory()
            .agenda
            .entry(module.to_string())
            .or_default()
            .push(activation.to_string());
    }

    pub fn set_focus(&self, module: &str) {
        self.memory().focus = Some(module.to_string());
    }

    pub fn select_activation(&self, activation: Option<&str>) {
        self.memory().selected = activation.map(ToOwned::to_owned);
    }

    fn notify(&self, kind: EngineEvent, call: &CallHandle, ctx: &ContextHandle) -> Result<(), Error> {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        match listener {
            Some(listener) => listener.on_engine_event(kind, call, ctx),
            None => Ok(()),
        }
    }

    /// Execute a function on the current thread. Context of the function is linked to `parent`.
    pub fn invoke(&self, function: &Function, parent: Option<&ContextHandle>) -> Result<(), Error> {
        let call = CallHandle::new(SimCall {
            name: function.name.clone(),
        });
        let ctx: ContextHandle = Arc::new(SimContext {
            call: call.clone(),
            line: function.place.clone(),
            bindings: function.bindings.iter().cloned().collect(),
            parent: parent.cloned(),
        });

        self.notify(EngineEvent::Call, &call, &ctx)?;
        for nested in &function.body {
            self.invoke(nested, Some(&ctx))?;
        }
        self.notify(EngineEvent::Return, &call, &ctx)
    }

    fn eval_tokens(
        &self,
        tokens: &mut Peekable<impl Iterator<Item = String>>,
        ctx: &ContextHandle,
    ) -> anyhow::Result<String> {
        let token = tokens
            .next()
            .ok_or_else(|| anyhow!("unexpected end of expression"))?;
        match token.as_str() {
            "(" => {
                let function = tokens
                    .next()
                    .filter(|t| t != ")")
                    .ok_or_else(|| anyhow!("missing function name"))?;
                let mut args = vec![];
                loop {
                    match tokens.peek().map(String::as_str) {
                        None => bail!("missing `)`"),
                        Some(")") => break,
                        Some(_) => args.push(self.eval_tokens(tokens, ctx)?),
                    }
                }
                tokens.next();
                self.apply(&function, &args, ctx)
            }
            ")" => bail!("unexpected `)`"),
            var if var.starts_with('?') => ctx
                .variable(var)
                .ok_or_else(|| anyhow!("unbound variable {var}")),
            literal => Ok(literal.to_string()),
        }
    }

    /// Apply an arithmetic function. Application is reported to the listener as a builtin call.
    fn apply(&self, function: &str, args: &[String], ctx: &ContextHandle) -> anyhow::Result<String> {
        let call = CallHandle::new(SimCall {
            name: function.to_string(),
        });
        let call_ctx: ContextHandle = Arc::new(SimContext {
            call: call.clone(),
            line: None,
            bindings: BTreeMap::new(),
            parent: Some(ctx.clone()),
        });
        self.notify(EngineEvent::Call, &call, &call_ctx)?;

        let numbers = args
            .iter()
            .map(|arg| {
                arg.parse::<i64>()
                    .with_context(|| format!("`{arg}` is not a number"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let result = match function {
            "+" => numbers.iter().try_fold(0i64, |acc, n| acc.checked_add(*n)),
            "*" => numbers.iter().try_fold(1i64, |acc, n| acc.checked_mul(*n)),
            _ => bail!("unknown function `{function}`"),
        }
        .ok_or_else(|| anyhow!("integer overflow in `{function}`"))?;

        self.notify(EngineEvent::Return, &call, &call_ctx)?;
        Ok(result.to_string())
    }
}

impl Engine for SimEngine {
    fn evaluate(&self, expr: &str, ctx: &ContextHandle) -> anyhow::Result<String> {
        let spaced = expr.replace('(', " ( ").replace(')', " ) ");
        let mut tokens = spaced
            .split_whitespace()
            .map(ToString::to_string)
            .peekable();
        let value = self.eval_tokens(&mut tokens, ctx)?;
        if let Some(extra) = tokens.next() {
            bail!("unexpected `{extra}` after expression");
        }
        Ok(value)
    }

    fn fact(&self, id: u64) -> Option<FactView> {
        self.memory().facts.get(&id).cloned()
    }

    fn current_activation(&self) -> Option<String> {
        self.memory().selected.clone()
    }

    fn focus(&self) -> String {
        self.memory()
            .focus
            .clone()
            .unwrap_or_else(|| Self::MAIN_MODULE.to_string())
    }

    fn agenda(&self, module: &str) -> anyhow::Result<Vec<String>> {
        self.memory()
            .agenda
            .get(module)
            .cloned()
            .ok_or_else(|| anyhow!("unknown module {module}"))
    }
}
