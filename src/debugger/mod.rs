pub mod breakpoint;
pub mod engine;
mod error;
pub mod thread;

pub use error::Error;
pub use thread::{ThreadNum, ThreadState};

use crate::config::DebugConfig;
use crate::debugger::breakpoint::BreakpointSet;
use crate::debugger::engine::{
    context_chain, CallHandle, ContextHandle, Engine, EngineEvent, EngineListener,
};
use crate::debugger::thread::Registry;
use crate::protocol::transport::{CommandChannel, EventChannel};
use crate::protocol::{Event, FrameView};
use crate::{muted_error, weak_error};
use itertools::Itertools;
use std::collections::{HashMap, VecDeque};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::ThreadId;

/// Last known execution point of a thread.
#[derive(Clone)]
struct ExecutionPoint {
    ctx: ContextHandle,
    call: CallHandle,
}

/// Mutable session data, guarded by a single lock.
struct SessionState {
    breakpoints: BreakpointSet,
    threads: Registry,
    points: HashMap<ThreadNum, ExecutionPoint>,
}

/// Mark the calling thread as evaluating for the guard lifetime, restore previous mark on drop.
struct SuppressGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
    prev: Option<ThreadId>,
}

impl<'a> SuppressGuard<'a> {
    fn new(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        let prev = lock(slot).replace(std::thread::current().id());
        Self { slot, prev }
    }
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = self.prev.take();
    }
}

/// Main debugger component. Receives engine callbacks from worker threads, owns breakpoints and
/// per-thread states, executes client commands and sends events to a client.
///
/// Worker threads block inside [`EngineListener::on_engine_event`] while they are suspended.
/// All state changes happen under one lock, waiters are woken up through a shared condition
/// variable and additionally re-check their predicates every poll interval.
///
/// Events are queued into an outbox under the session lock and written to the event channel
/// after the lock is released.
pub struct DebugController {
    engine: Arc<dyn Engine>,
    config: DebugConfig,
    session: Mutex<SessionState>,
    changed: Condvar,
    outbox: Mutex<VecDeque<Event>>,
    events: Mutex<Option<EventChannel>>,
    commands: Mutex<Option<CommandChannel>>,
    command_shutdown: Mutex<Option<TcpStream>>,
    terminated: AtomicBool,
    /// Thread evaluating a `print` expression, its callbacks are ignored.
    evaluating: Mutex<Option<ThreadId>>,
    evaluator: OnceLock<ThreadId>,
}

impl DebugController {
    /// Create a controller. Calling thread becomes the engine initial thread (number 0),
    /// it will be suspended at the first call.
    pub fn new(engine: Arc<dyn Engine>, config: DebugConfig) -> Self {
        Self {
            engine,
            config,
            session: Mutex::new(SessionState {
                breakpoints: BreakpointSet::default(),
                threads: Registry::new(),
                points: HashMap::new(),
            }),
            changed: Condvar::new(),
            outbox: Mutex::new(VecDeque::new()),
            events: Mutex::new(None),
            commands: Mutex::new(None),
            command_shutdown: Mutex::new(None),
            terminated: AtomicBool::new(false),
            evaluating: Mutex::new(None),
            evaluator: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    pub fn attach_event_channel(&self, channel: EventChannel) {
        log::debug!(target: "debugger", "event channel attached");
        *lock(&self.events) = Some(channel);
    }

    pub fn attach_command_channel(&self, channel: CommandChannel) {
        log::debug!(target: "debugger", "command channel attached");
        *lock(&self.command_shutdown) = channel.shutdown_handle();
        *lock(&self.commands) = Some(channel);
    }

    /// Take command channel for reading, [`None`] if not attached or already taken.
    pub fn take_command_channel(&self) -> Option<CommandChannel> {
        lock(&self.commands).take()
    }

    /// Mark calling thread as the thread which services client commands.
    /// Engine callbacks fired on this thread are ignored.
    pub fn register_evaluator_thread(&self) {
        if self.evaluator.set(std::thread::current().id()).is_err() {
            log::warn!(target: "debugger", "evaluator thread already registered");
        }
    }

    fn is_evaluator_thread(&self) -> bool {
        self.evaluator.get() == Some(&std::thread::current().id())
    }

    fn is_evaluating_thread(&self) -> bool {
        *lock(&self.evaluating) == Some(std::thread::current().id())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Send an event to a client. Delivery is best-effort, I/O errors are logged only.
    ///
    /// # Panics
    ///
    /// Panics if event channel is not attached.
    pub fn emit(&self, event: Event) {
        self.enqueue([event]);
        self.flush();
    }

    /// Put events into the outbox. Called under the session lock, so the outbox keeps
    /// the order of state changes.
    fn enqueue(&self, events: impl IntoIterator<Item = Event>) {
        lock(&self.outbox).extend(events);
    }

    /// Write all queued events in queue order. Must be called without the session lock held.
    ///
    /// # Panics
    ///
    /// Panics if there are queued events and event channel is not attached.
    fn flush(&self) {
        if lock(&self.outbox).is_empty() {
            return;
        }

        let mut channel = lock(&self.events);
        loop {
            let Some(event) = lock(&self.outbox).pop_front() else {
                break;
            };
            let channel = channel
                .as_mut()
                .expect("event channel must be attached before any event is sent");
            weak_error!(channel.send(&event), "send event:");
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.session)
    }

    fn wait_change<'a>(&self, guard: MutexGuard<'a, SessionState>) -> MutexGuard<'a, SessionState> {
        let (guard, _) = self
            .changed
            .wait_timeout(guard, self.config.poll_interval())
            .unwrap_or_else(PoisonError::into_inner);
        guard
    }

    /// Return thread state, mark thread as dead if its native thread is gone.
    fn query(&self, session: &mut SessionState, num: ThreadNum) -> Result<ThreadState, Error> {
        if session.threads.check_liveness(num) {
            log::info!(target: "debugger", "thread {num} is dead");
            self.enqueue([Event::ThreadDead(num)]);
        }
        match session.threads.state(num) {
            None => Err(Error::ThreadNotFound(num)),
            Some(ThreadState::Dead) => Err(Error::ThreadDead(num)),
            Some(state) => Ok(state.clone()),
        }
    }

    /// Apply a state transition to a thread. On success wake up all waiters and send
    /// `on_success` event.
    fn transit(
        &self,
        num: ThreadNum,
        on_success: Event,
        f: impl FnOnce(&mut SessionState, ThreadState) -> Result<ThreadState, Error>,
    ) -> Result<(), Error> {
        let result = {
            let mut session = self.lock();
            let result = self
                .query(&mut session, num)
                .and_then(|state| f(&mut session, state))
                .and_then(|new_state| session.threads.set_state(num, new_state));
            if result.is_ok() {
                self.enqueue([on_success]);
            }
            result
        };
        if result.is_ok() {
            self.changed.notify_all();
        }
        self.flush();
        result
    }

    /// Block until predicate is true for a thread.
    fn wait_thread(
        &self,
        num: ThreadNum,
        pred: impl Fn(&SessionState) -> bool,
    ) -> Result<(), Error> {
        let mut session = self.lock();
        loop {
            if self.is_terminated() {
                return Err(Error::SessionTerminated);
            }
            if session.threads.check_liveness(num) {
                log::info!(target: "debugger", "thread {num} is dead");
                self.enqueue([Event::ThreadDead(num)]);
                drop(session);
                self.flush();
                return Err(Error::ThreadDead(num));
            }
            if session.threads.state(num) == Some(&ThreadState::Dead) {
                return Err(Error::ThreadDead(num));
            }
            if pred(&session) {
                return Ok(());
            }
            session = self.wait_change(session);
        }
    }

    /// Block current worker while its thread is suspended.
    fn park(&self, num: ThreadNum) {
        let mut session = self.lock();
        while !self.is_terminated()
            && session
                .threads
                .state(num)
                .map(ThreadState::is_suspended)
                .unwrap_or_default()
        {
            session = self.wait_change(session);
        }
    }

    /// Return execution context of a suspended thread.
    fn suspended_context(&self, num: ThreadNum) -> Result<ContextHandle, Error> {
        let result = {
            let mut session = self.lock();
            self.query(&mut session, num).and_then(|state| {
                if !state.is_suspended() {
                    return Err(Error::NotSuspended(num));
                }
                session
                    .points
                    .get(&num)
                    .map(|point| point.ctx.clone())
                    .ok_or(Error::NoContext(num))
            })
        };
        self.flush();
        result
    }

    /// Terminate the session: all threads are released, every next engine callback fails.
    /// Repeated calls do nothing.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!(target: "debugger", "terminate debug session");

        {
            let mut session = self.lock();
            session.threads.run_all();
            self.enqueue([Event::Quit]);
        }
        self.changed.notify_all();
        self.flush();

        if let Some(stream) = lock(&self.command_shutdown).take() {
            muted_error!(stream.shutdown(Shutdown::Read));
        }
    }

    /// Block until thread is suspended. Thread may be not observed yet.
    pub fn join(&self, num: ThreadNum) -> Result<(), Error> {
        self.wait_thread(num, |session| {
            session
                .threads
                .state(num)
                .map(ThreadState::is_suspended)
                .unwrap_or_default()
        })
    }

    /// Block until execution context of a thread is known.
    pub fn wait(&self, num: ThreadNum) -> Result<(), Error> {
        self.wait_thread(num, |session| session.points.contains_key(&num))
    }

    pub fn suspend(&self, num: ThreadNum) -> Result<(), Error> {
        self.transit(num, Event::Suspended(num), |_, _| Ok(ThreadState::Suspended))
    }

    pub fn resume(&self, num: ThreadNum) -> Result<(), Error> {
        self.transit(num, Event::Resumed(num), |_, _| Ok(ThreadState::Running))
    }

    /// Resume a suspended thread until its next call.
    pub fn step(&self, num: ThreadNum) -> Result<(), Error> {
        self.transit(num, Event::ResumedStep(num), |_, state| {
            if !state.is_suspended() {
                return Err(Error::NotSuspended(num));
            }
            Ok(ThreadState::Stepping)
        })
    }

    /// Resume a suspended thread until the current call returns.
    pub fn step_over(&self, num: ThreadNum) -> Result<(), Error> {
        self.transit(num, Event::ResumedStep(num), |session, state| {
            if !state.is_suspended() {
                return Err(Error::NotSuspended(num));
            }
            let target = session
                .points
                .get(&num)
                .map(|point| point.ctx.current_call().unwrap_or_else(|| point.call.clone()))
                .ok_or(Error::NoCurrentCall(num))?;
            Ok(ThreadState::SteppingOver(target))
        })
    }

    /// Send stack of a suspended thread, frames of all parent contexts included.
    pub fn stack(&self, num: ThreadNum) -> Result<(), Error> {
        let ctx = self.suspended_context(num)?;

        let frames = context_chain(&ctx)
            .flat_map(|ctx| {
                let variables = ctx.variable_names().into_iter().sorted().collect_vec();
                ctx.frames().into_iter().map(move |frame| FrameView {
                    function: frame.call.name().to_string(),
                    place: frame.line,
                    variables: variables.clone(),
                })
            })
            .collect();

        self.emit(Event::Stack { thread: num, frames });
        Ok(())
    }

    /// Evaluate an expression in a frame of a suspended thread and send the result.
    /// Engine callbacks fired by the evaluating thread are ignored, other threads are not affected.
    pub fn print(&self, num: ThreadNum, level: u32, expr: &str) -> Result<(), Error> {
        let ctx = self.suspended_context(num)?;

        let frame_ctx = context_chain(&ctx)
            .flat_map(|ctx| {
                let frames = ctx.frames().len();
                std::iter::repeat(ctx).take(frames)
            })
            .nth(level as usize)
            .ok_or(Error::FrameNotFound(level))?;

        let result = {
            let _guard = SuppressGuard::new(&self.evaluating);
            self.engine.evaluate(expr, &frame_ctx)
        }
        .map_err(Error::Evaluation)?;

        self.emit(Event::Print {
            thread: num,
            level,
            expr: expr.to_string(),
            result,
        });
        Ok(())
    }

    pub fn set_breakpoint(&self, line: u32, file: &str) {
        if self.lock().breakpoints.add(file, line) {
            log::info!(target: "debugger", "breakpoint set at {file}:{line}");
        }
    }

    pub fn remove_breakpoint(&self, line: u32, file: &str) {
        if self.lock().breakpoints.remove(file, line) {
            log::info!(target: "debugger", "breakpoint removed at {file}:{line}");
        }
    }

    /// Send a fact, or retraction mark if fact not exists.
    pub fn fact(&self, id: u64) {
        self.emit(Event::Fact {
            id,
            fact: self.engine.fact(id),
        });
    }

    pub fn activation(&self) {
        self.emit(Event::Activation(self.engine.current_activation()));
    }

    /// Send first `count` pending activations of a module, module in focus by default.
    pub fn agenda(&self, count: usize, module: Option<&str>) -> Result<(), Error> {
        let module = module
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.engine.focus());
        let mut activations = self.engine.agenda(&module).map_err(Error::Engine)?;
        activations.truncate(count);
        self.emit(Event::Agenda {
            module,
            activations,
        });
        Ok(())
    }

    /// Send all known threads with their states.
    pub fn threads(&self) {
        {
            let mut session = self.lock();
            let threads = session.threads.dump();
            for t in &threads {
                if session.threads.check_liveness(t.num) {
                    self.enqueue([Event::ThreadDead(t.num)]);
                }
            }
            let states = session
                .threads
                .dump()
                .into_iter()
                .map(|t| (t.num, t.state.as_str()))
                .collect();
            self.enqueue([Event::Threads(states)]);
        }
        self.flush();
    }

    /// Return current thread state, [`None`] if thread never observed.
    pub fn thread_state(&self, num: ThreadNum) -> Option<ThreadState> {
        self.lock().threads.state(num).cloned()
    }
}

impl EngineListener for DebugController {
    fn on_engine_event(
        &self,
        kind: EngineEvent,
        call: &CallHandle,
        ctx: &ContextHandle,
    ) -> Result<(), Error> {
        if self.is_terminated() {
            return Err(Error::SessionTerminated);
        }
        if self.is_evaluator_thread() || self.is_evaluating_thread() {
            return Ok(());
        }

        let mut events = vec![];
        let mut exit = false;
        let (num, queued) = {
            let mut session = self.lock();
            let (num, created) = session.threads.resolve_current();
            if created {
                log::debug!(target: "debugger", "new thread {num}");
                events.push(Event::ThreadCreate(num));
            }
            let first_point = session
                .points
                .insert(
                    num,
                    ExecutionPoint {
                        ctx: ctx.clone(),
                        call: call.clone(),
                    },
                )
                .is_none();

            let state = session.threads.state(num).cloned();
            let mut suspended = false;
            match kind {
                EngineEvent::Call => {
                    if let Some(place) = ctx.line_number().filter(|p| session.breakpoints.hit(p)) {
                        log::debug!(target: "debugger", "thread {num} hit breakpoint at {}:{}", place.file, place.line);
                        suspended = true;
                        events.push(Event::SuspendedBreak { thread: num, place });
                    } else if state == Some(ThreadState::Stepping) {
                        suspended = true;
                        events.push(Event::SuspendedStep(num));
                    }
                }
                EngineEvent::Return => {
                    if call.name() == self.config.exit_function {
                        exit = true;
                    } else if matches!(&state, Some(ThreadState::SteppingOver(target)) if target == call)
                    {
                        suspended = true;
                        events.push(Event::SuspendedStep(num));
                    }
                }
            }
            if suspended {
                session.threads.set_state(num, ThreadState::Suspended)?;
            }
            if created || first_point || suspended {
                self.changed.notify_all();
            }
            let queued = !events.is_empty();
            self.enqueue(events);
            (num, queued)
        };

        // a callback without events never waits for the event channel
        if queued {
            self.flush();
        }

        if exit {
            log::info!(target: "debugger", "exit call observed on thread {num}");
            self.terminate();
        } else if kind == EngineEvent::Call {
            self.park(num);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
