use crate::debugger::engine::CallHandle;
use crate::debugger::Error;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Session-wide thread number. Zero is reserved for the engine initial thread.
pub type ThreadNum = u32;

/// Debugger view of an engine worker thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Suspended,
    /// Suspend at next call.
    Stepping,
    /// Run until the return of the given call.
    SteppingOver(CallHandle),
    Dead,
}

impl ThreadState {
    pub fn is_suspended(&self) -> bool {
        matches!(self, ThreadState::Suspended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::Running => "RUNNING",
            ThreadState::Suspended => "SUSPENDED",
            ThreadState::Stepping => "STEPPING",
            ThreadState::SteppingOver(_) => "STEPPING_OVER",
            ThreadState::Dead => "DEAD",
        }
    }
}

thread_local! {
    // Dropped together with the native thread, observers hold a weak reference.
    static LIVENESS: Arc<()> = Arc::new(());
}

fn liveness_token() -> Weak<()> {
    LIVENESS.with(Arc::downgrade)
}

#[derive(Clone)]
pub struct TrackedThread {
    pub num: ThreadNum,
    pub state: ThreadState,
    liveness: Weak<()>,
}

impl TrackedThread {
    fn is_alive(&self) -> bool {
        self.liveness.strong_count() > 0
    }
}

/// Thread identity and state table.
pub(super) struct Registry {
    nums: HashMap<ThreadId, ThreadNum>,
    state: BTreeMap<ThreadNum, TrackedThread>,
    last_thread_num: ThreadNum,
}

impl Registry {
    /// Create a registry where the calling thread is the engine initial thread,
    /// it starts in `suspended` state.
    pub(super) fn new() -> Registry {
        let initial = TrackedThread {
            num: 0,
            state: ThreadState::Suspended,
            liveness: liveness_token(),
        };
        Self {
            nums: HashMap::from([(thread::current().id(), 0)]),
            state: BTreeMap::from([(0, initial)]),
            last_thread_num: 0,
        }
    }

    /// Return number of the calling thread, register it in `running` state if it is not known yet.
    /// Second value is `true` if thread registered by this call.
    pub(super) fn resolve_current(&mut self) -> (ThreadNum, bool) {
        let id = thread::current().id();
        if let Some(num) = self.nums.get(&id) {
            return (*num, false);
        }

        self.last_thread_num += 1;
        let num = self.last_thread_num;
        self.nums.insert(id, num);
        self.state.insert(
            num,
            TrackedThread {
                num,
                state: ThreadState::Running,
                liveness: liveness_token(),
            },
        );
        (num, true)
    }

    /// Return current thread state, [`None`] if thread was never observed.
    pub(super) fn state(&self, num: ThreadNum) -> Option<&ThreadState> {
        self.state.get(&num).map(|t| &t.state)
    }

    /// Change thread state. Dead threads never change their state.
    pub(super) fn set_state(&mut self, num: ThreadNum, state: ThreadState) -> Result<(), Error> {
        let thread = self
            .state
            .get_mut(&num)
            .ok_or(Error::ThreadNotFound(num))?;
        if thread.state == ThreadState::Dead {
            return Err(Error::ThreadDead(num));
        }
        thread.state = state;
        Ok(())
    }

    /// Mark thread as dead if its native thread is gone.
    /// Return `true` if thread is marked dead by this call.
    pub(super) fn check_liveness(&mut self, num: ThreadNum) -> bool {
        match self.state.get_mut(&num) {
            Some(thread) if thread.state != ThreadState::Dead && !thread.is_alive() => {
                thread.state = ThreadState::Dead;
                true
            }
            _ => false,
        }
    }

    /// Put all live threads into `running` state.
    pub(super) fn run_all(&mut self) {
        self.state
            .values_mut()
            .filter(|t| t.state != ThreadState::Dead)
            .for_each(|t| t.state = ThreadState::Running);
    }

    /// Return all known threads ordered by number.
    pub(super) fn dump(&self) -> Vec<TrackedThread> {
        self.state.values().cloned().collect()
    }
}
