//! Client commands.
//!
//! Each command is a single line: a verb followed by space separated arguments. Lines with an
//! unknown verb parse into [`Command::Unknown`] and are ignored by the dispatcher.

pub mod parser;

use crate::debugger::ThreadNum;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parsing(String),
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Join(ThreadNum),
    Wait(ThreadNum),
    Suspend(ThreadNum),
    Resume(ThreadNum),
    Step(ThreadNum),
    StepOver(ThreadNum),
    Stack(ThreadNum),
    Print {
        thread: ThreadNum,
        level: u32,
        expr: String,
    },
    Break {
        line: u32,
        file: String,
    },
    Unbreak {
        line: u32,
        file: String,
    },
    Fact(u64),
    Activation,
    Agenda {
        count: usize,
        module: Option<String>,
    },
    Threads,
    Unknown(String),
}
