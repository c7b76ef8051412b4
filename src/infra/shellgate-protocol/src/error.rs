use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("port {0} is out of range (1-65535)")]
    PortOutOfRange(u32),
}
