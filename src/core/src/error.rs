use thiserror::Error;

use crate::credential::CredentialError;

/// Failures of a single client session.
///
/// Everything before the shell opens is reported to the client once as an
/// `error` status. After that, failures end the session like a normal
/// disconnect.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid connect request: {0}")]
    InvalidRequest(String),

    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    #[error("credential could not be decrypted")]
    DecryptionFailed,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("host unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("failed to open shell: {0}")]
    ShellOpenFailed(String),

    #[error("shell channel closed")]
    ChannelClosed,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<CredentialError> for GatewayError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Malformed(reason) => Self::MalformedCredential(reason),
            CredentialError::DecryptionFailed => Self::DecryptionFailed,
            CredentialError::Configuration(reason) => Self::Configuration(reason),
        }
    }
}

impl From<shellgate_protocol::ProtocolError> for GatewayError {
    fn from(err: shellgate_protocol::ProtocolError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
