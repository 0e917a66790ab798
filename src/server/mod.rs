//! Debug server: channel listeners and the command dispatcher.

pub mod command;
pub mod dispatcher;

use crate::config::DebugConfig;
use crate::debugger::DebugController;
use crate::protocol::transport::{CommandChannel, EventChannel};
use crate::server::dispatcher::Dispatcher;
use anyhow::{anyhow, Context};
use log::info;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Bound (but not yet accepted) command and event listeners.
pub struct Listeners {
    command: TcpListener,
    event: TcpListener,
}

impl Listeners {
    /// Bind both listeners. Port 0 in config means an ephemeral port.
    pub fn bind(config: &DebugConfig) -> anyhow::Result<Self> {
        let command_addr = config.command_addr();
        let command =
            TcpListener::bind(command_addr).with_context(|| format!("bind {command_addr}"))?;
        let event_addr = config.event_addr();
        let event = TcpListener::bind(event_addr).with_context(|| format!("bind {event_addr}"))?;

        let listeners = Self { command, event };
        info!(
            target: "protocol",
            "listening for commands on {}, events on {}",
            listeners.command_addr()?,
            listeners.event_addr()?
        );
        Ok(listeners)
    }

    pub fn command_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.command.local_addr()?)
    }

    pub fn event_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.event.local_addr()?)
    }

    /// Accept exactly one connection on each listener, attach both channels to the controller
    /// and start a dispatcher thread. Blocks until both clients are connected.
    pub fn accept(self, controller: Arc<DebugController>) -> anyhow::Result<JoinHandle<()>> {
        let Listeners { command, event } = self;

        let command_acceptor = thread::Builder::new()
            .name("command-acceptor".to_string())
            .spawn({
                let controller = controller.clone();
                move || -> anyhow::Result<()> {
                    let stream = accept_one(&command, "command")?;
                    controller.attach_command_channel(CommandChannel::from_tcp(stream)?);
                    Ok(())
                }
            })?;
        let event_acceptor = thread::Builder::new()
            .name("event-acceptor".to_string())
            .spawn({
                let controller = controller.clone();
                move || -> anyhow::Result<()> {
                    let stream = accept_one(&event, "event")?;
                    controller.attach_event_channel(EventChannel::from_tcp(stream)?);
                    Ok(())
                }
            })?;

        command_acceptor
            .join()
            .map_err(|_| anyhow!("command acceptor panicked"))??;
        event_acceptor
            .join()
            .map_err(|_| anyhow!("event acceptor panicked"))??;

        let channel = controller
            .take_command_channel()
            .ok_or_else(|| anyhow!("command channel not attached"))?;
        let dispatcher = Dispatcher::new(controller, channel);
        thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || dispatcher.run())
            .context("spawn dispatcher")
    }
}

fn accept_one(listener: &TcpListener, channel: &str) -> anyhow::Result<TcpStream> {
    let (stream, peer) = listener
        .accept()
        .with_context(|| format!("accept {channel} connection"))?;
    info!(target: "protocol", "{channel} client connected: {peer}");
    Ok(stream)
}

/// Bind listeners from config, wait for a client and start serving it.
pub fn serve(
    controller: Arc<DebugController>,
    config: &DebugConfig,
) -> anyhow::Result<JoinHandle<()>> {
    Listeners::bind(config)?.accept(controller)
}
