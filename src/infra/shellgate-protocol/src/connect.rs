use serde::{Deserialize, Serialize};

use crate::ProtocolError;

pub const DEFAULT_SSH_PORT: u32 = 22;

fn default_port() -> u32 {
    DEFAULT_SSH_PORT
}

/// Client request to open a remote shell.
///
/// The port is carried as `u32` on the wire so that an out-of-range value is
/// reported through [`ConnectRequest::target`] instead of failing to decode.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u32,
    pub username: String,
    #[serde(alias = "encryptedCredential")]
    pub encrypted_credential: String,
}

// The credential blob stays out of logs even though it is ciphertext.
impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("encrypted_credential", &"<redacted>")
            .finish()
    }
}

/// Validated remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl ConnectRequest {
    /// Validate host, username and port.
    pub fn target(&self) -> Result<ConnectTarget, ProtocolError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ProtocolError::EmptyField { field: "host" });
        }
        if self.username.is_empty() {
            return Err(ProtocolError::EmptyField { field: "username" });
        }
        let port = match u16::try_from(self.port) {
            Ok(p) if p != 0 => p,
            _ => return Err(ProtocolError::PortOutOfRange(self.port)),
        };
        Ok(ConnectTarget {
            host: host.to_string(),
            port,
            username: self.username.clone(),
        })
    }
}

impl std::fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}
