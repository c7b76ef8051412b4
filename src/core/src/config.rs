use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1:9800).
    pub bind: SocketAddr,
    /// Interval between server→client pings.
    pub heartbeat_interval: Duration,
    /// Close the connection after this duration without any message.
    pub idle_timeout: Duration,
    /// Bound on connecting + authenticating, and on opening the shell.
    pub connect_timeout: Duration,
    /// Concurrent client connections accepted before upgrades get 503.
    pub max_connections: usize,
    /// Shell output chunks buffered between the SSH driver and the client.
    pub output_buffer: usize,
    /// SSH client behaviour, usually from `config.toml`.
    pub ssh: SshSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9800),
            heartbeat_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(20),
            max_connections: 64,
            output_buffer: 256,
            ssh: SshSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub try_keyboard_interactive: bool,
    /// Seconds between SSH keep-alives; 0 disables them.
    pub keepalive_interval_secs: u64,
    pub keepalive_max: usize,
    pub term: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            try_keyboard_interactive: true,
            keepalive_interval_secs: 30,
            keepalive_max: 3,
            term: "xterm-256color".to_string(),
        }
    }
}
