use crate::debugger::thread::ThreadNum;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- session errors --------------------------------------------
    #[error("debug session terminated")]
    SessionTerminated,

    // --------------------------------- thread errors ---------------------------------------------
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadNum),
    #[error("thread {0} is dead")]
    ThreadDead(ThreadNum),
    #[error("thread {0} is not suspended")]
    NotSuspended(ThreadNum),
    #[error("no execution context for thread {0}")]
    NoContext(ThreadNum),
    #[error("thread {0} has no current call")]
    NoCurrentCall(ThreadNum),
    #[error("frame number {0} not found")]
    FrameNotFound(u32),

    // --------------------------------- engine errors ---------------------------------------------
    #[error("evaluation: {0:#}")]
    Evaluation(anyhow::Error),
    #[error("engine: {0:#}")]
    Engine(anyhow::Error),
}

impl Error {
    /// Return a hint to a dispatcher - continue the session after error or stop it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::SessionTerminated => true,
            Error::ThreadNotFound(_) => false,
            Error::ThreadDead(_) => false,
            Error::NotSuspended(_) => false,
            Error::NoContext(_) => false,
            Error::NoCurrentCall(_) => false,
            Error::FrameNotFound(_) => false,
            Error::Evaluation(_) => false,
            Error::Engine(_) => false,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
