use crate::{muted_error, weak_error};
use serde::Deserialize;
use std::fs::read_to_string;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Debug server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Address both listeners bind to.
    pub bind_address: IpAddr,
    /// Port of the command channel, 0 for an ephemeral port.
    pub command_port: u16,
    /// Port of the event channel, 0 for an ephemeral port.
    pub event_port: u16,
    /// Period of liveness re-checks while some thread waits for a state change.
    pub poll_interval_ms: u64,
    /// Function which return ends the debug session.
    pub exit_function: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            command_port: 9977,
            event_port: 9978,
            poll_interval_ms: 1000,
            exit_function: "exit".to_string(),
        }
    }
}

impl DebugConfig {
    const DEFAULT_PATH: &'static str = ".config/ruledbg/config.toml";
    const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Load configuration from file, `~/.config/ruledbg/config.toml` if path is not set.
    /// Return [`None`] on errors.
    pub fn from_file(path: Option<&str>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    log::error!(target: "debugger", "Error while load config file: {err}");
                    return None;
                }
            },
        };

        weak_error!(toml::de::from_str(&data), "parse config:")
    }

    /// Poll interval, never longer than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1)).min(Self::MAX_POLL_INTERVAL)
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.command_port)
    }

    pub fn event_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.event_port)
    }
}
