//! Remote shell client seam.
//!
//! The gateway only sees [`ShellConnector`], [`RemoteSession`] and
//! [`ShellChannel`]; the SSH transport lives in [`ssh`].

mod channel;
mod ssh;

use std::time::Duration;

use shellgate_protocol::{ConnectTarget, TerminalGeometry};

use crate::config::ServerConfig;
use crate::credential::Credential;
use crate::error::GatewayError;

pub use channel::{drive_channel, ChannelEndpoint, ChannelIo, ShellChannel, ShellCommand};
pub use ssh::SshConnector;

pub use futures::future::BoxFuture;

/// Per-connect options taken from [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Fall back to keyboard-interactive auth, answering prompts with the password.
    pub try_keyboard_interactive: bool,
    pub keepalive_interval: Option<Duration>,
    pub keepalive_max: usize,
    /// Bound on connect + auth and, separately, on opening the shell.
    pub connect_timeout: Duration,
    /// `TERM` requested for the remote PTY.
    pub term: String,
    /// Capacity of the shell output queue, in chunks.
    pub output_buffer: usize,
}

impl ConnectOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        let ssh = &config.ssh;
        Self {
            try_keyboard_interactive: ssh.try_keyboard_interactive,
            keepalive_interval: match ssh.keepalive_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            keepalive_max: ssh.keepalive_max,
            connect_timeout: config.connect_timeout,
            term: ssh.term.clone(),
            output_buffer: config.output_buffer,
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Opens authenticated sessions to remote hosts.
pub trait ShellConnector: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
        credential: Credential,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteSession>, GatewayError>>;
}

/// One authenticated connection to one host.
pub trait RemoteSession: Send {
    /// Open the interactive shell with a PTY of the given size.
    fn open_shell<'a>(
        &'a mut self,
        geometry: TerminalGeometry,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<ShellChannel, GatewayError>>;

    /// Release the connection. Safe to call more than once.
    fn dispose(&mut self) -> BoxFuture<'_, ()>;
}
