//! Debugger wire protocol.
//!
//! Two channels are used. The command channel is line based: each command line gets exactly one
//! reply line, `OK` or `ERROR: <message>`. The event channel is server to client only, each event
//! is framed as `<length>\n<payload>\n` where length counts payload bytes and trailing newline.

pub mod transport;

use crate::debugger::engine::{FactView, LineNumberRecord};
use crate::debugger::thread::ThreadNum;
use itertools::Itertools;
use std::fmt;

pub const REPLY_OK: &str = "OK";

/// Render an error reply line (without line terminator).
pub fn error_reply(err: impl fmt::Display) -> String {
    // reply is a single line
    let msg = err.to_string().replace(['\r', '\n'], " ");
    format!("ERROR: {msg}")
}

/// Single frame of a `STACK` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameView {
    pub function: String,
    pub place: Option<LineNumberRecord>,
    /// Live variable names, sorted.
    pub variables: Vec<String>,
}

impl fmt::Display for FrameView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.place {
            Some(place) => write!(f, "{},{},{}", self.function, place.file, place.line)?,
            None => write!(f, "{},,-1", self.function)?,
        }
        for var in &self.variables {
            write!(f, ",{var}")?;
        }
        Ok(())
    }
}

/// Notification sent to a client over the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started,
    Quit,
    Suspended(ThreadNum),
    Resumed(ThreadNum),
    SuspendedStep(ThreadNum),
    ResumedStep(ThreadNum),
    SuspendedBreak {
        thread: ThreadNum,
        place: LineNumberRecord,
    },
    Stack {
        thread: ThreadNum,
        frames: Vec<FrameView>,
    },
    Print {
        thread: ThreadNum,
        level: u32,
        expr: String,
        result: String,
    },
    Fact {
        id: u64,
        fact: Option<FactView>,
    },
    Activation(Option<String>),
    Agenda {
        module: String,
        activations: Vec<String>,
    },
    Threads(Vec<(ThreadNum, &'static str)>),
    ThreadCreate(ThreadNum),
    ThreadDead(ThreadNum),
}

/// Display implementation renders an event payload.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Started => f.write_str("STARTED"),
            Event::Quit => f.write_str("QUIT"),
            Event::Suspended(num) => write!(f, "SUSPENDED {num}"),
            Event::Resumed(num) => write!(f, "RESUMED {num}"),
            Event::SuspendedStep(num) => write!(f, "SUSPENDED_STEP {num}"),
            Event::ResumedStep(num) => write!(f, "RESUMED_STEP {num}"),
            Event::SuspendedBreak { thread, place } => write!(
                f,
                "SUSPENDED_BREAK {thread} {} {}\n{}",
                place.line,
                place.file.len(),
                place.file
            ),
            Event::Stack { thread, frames } => {
                let frames = frames.iter().join("|");
                write!(f, "STACK {thread} {}\n{frames}", frames.len())
            }
            Event::Print {
                thread,
                level,
                expr,
                result,
            } => write!(f, "PRINT {thread} {level} {expr} {}\n{result}", result.len()),
            Event::Fact { id, fact: None } => writeln!(f, "FACT {id} (retracted) 0"),
            Event::Fact {
                id,
                fact: Some(fact),
            } => {
                writeln!(f, "FACT {id} {} {}", fact.name, fact.slots.len())?;
                for (slot, value) in &fact.slots {
                    write!(f, "{slot} {}\n{value}", value.len())?;
                }
                Ok(())
            }
            Event::Activation(None) => f.write_str("ACTIVATION NONE"),
            Event::Activation(Some(activation)) => {
                write!(f, "ACTIVATION {}\n{activation}", activation.len())
            }
            Event::Agenda {
                module,
                activations,
            } => {
                writeln!(f, "AGENDA {module} {}", activations.len())?;
                for activation in activations {
                    write!(f, "{}\n{activation}", activation.len())?;
                }
                Ok(())
            }
            Event::Threads(threads) => {
                write!(f, "THREADS {}", threads.len())?;
                for (num, state) in threads {
                    write!(f, "\n{num} {state}")?;
                }
                Ok(())
            }
            Event::ThreadCreate(num) => write!(f, "THREAD_CREATE {num}"),
            Event::ThreadDead(num) => write!(f, "THREAD_DEAD {num}"),
        }
    }
}
