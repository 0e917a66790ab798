use crate::debugger::{DebugController, Error};
use crate::protocol::transport::CommandChannel;
use crate::protocol::{error_reply, Event, REPLY_OK};
use crate::server::command::Command;
use log::{debug, info, warn};
use std::sync::Arc;

enum Flow {
    Continue,
    Exit,
}

/// Terminates the session when dropped, including unwinding after a panic in a command.
struct TerminateOnDrop(Arc<DebugController>);

impl Drop for TerminateOnDrop {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(target: "protocol", "dispatcher panicked, terminate debug session");
        }
        self.0.terminate();
    }
}

/// Reads commands from the command channel, executes them and replies.
///
/// Dispatcher thread is registered as the evaluator thread, so expression evaluation never
/// suspends it.
pub struct Dispatcher {
    controller: Arc<DebugController>,
    channel: CommandChannel,
}

impl Dispatcher {
    pub fn new(controller: Arc<DebugController>, channel: CommandChannel) -> Self {
        Self {
            controller,
            channel,
        }
    }

    /// Serve commands until `quit`, end of the command stream or session termination.
    /// Session is terminated when the loop ends.
    pub fn run(mut self) {
        let _terminate = TerminateOnDrop(self.controller.clone());
        self.controller.register_evaluator_thread();
        self.controller.emit(Event::Started);

        loop {
            let line = match self.channel.read_command() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(target: "protocol", "command channel closed");
                    break;
                }
                Err(e) => {
                    warn!(target: "protocol", "read command: {e}");
                    break;
                }
            };

            let (reply, flow) = match Command::parse(&line) {
                Ok(command) => match self.execute(command) {
                    Ok(flow) => (REPLY_OK.to_string(), flow),
                    Err(e) => {
                        debug!(target: "protocol", "command `{line}` failed: {e:#}");
                        let flow = if e.is_fatal() {
                            Flow::Exit
                        } else {
                            Flow::Continue
                        };
                        (error_reply(e), flow)
                    }
                },
                Err(e) => (error_reply(e), Flow::Continue),
            };

            if let Err(e) = self.channel.reply(&reply) {
                warn!(target: "protocol", "write reply: {e}");
                break;
            }
            if let Flow::Exit = flow {
                break;
            }
        }
    }

    fn execute(&self, command: Command) -> Result<Flow, Error> {
        let controller = &self.controller;
        match command {
            Command::Quit => {
                controller.terminate();
                return Ok(Flow::Exit);
            }
            Command::Join(num) => controller.join(num)?,
            Command::Wait(num) => controller.wait(num)?,
            Command::Suspend(num) => controller.suspend(num)?,
            Command::Resume(num) => controller.resume(num)?,
            Command::Step(num) => controller.step(num)?,
            Command::StepOver(num) => controller.step_over(num)?,
            Command::Stack(num) => controller.stack(num)?,
            Command::Print {
                thread,
                level,
                expr,
            } => controller.print(thread, level, &expr)?,
            Command::Break { line, file } => controller.set_breakpoint(line, &file),
            Command::Unbreak { line, file } => controller.remove_breakpoint(line, &file),
            Command::Fact(id) => controller.fact(id),
            Command::Activation => controller.activation(),
            Command::Agenda { count, module } => controller.agenda(count, module.as_deref())?,
            Command::Threads => controller.threads(),
            Command::Unknown(verb) => {
                debug!(target: "protocol", "ignore unknown command `{verb}`");
            }
        }
        Ok(Flow::Continue)
    }
}
