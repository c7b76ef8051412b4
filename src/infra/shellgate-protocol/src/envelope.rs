use serde::{Deserialize, Serialize};

use crate::{ConnectRequest, ProtocolError, TerminalGeometry};

/// Client → gateway event sent as a text WebSocket frame.
///
/// Discriminated by `type`:
/// - `connect`: open a remote shell
/// - `input`  : keystrokes for the shell
/// - `resize` : terminal geometry change
///
/// Raw input may also arrive as binary frames; those bypass this envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Connect(ConnectRequest),
    Input { data: String },
    Resize(TerminalGeometry),
}

/// Lifecycle state reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connected,
    Disconnected,
    Error,
}

/// Gateway → client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Status {
        status: SessionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Data { data: String },
}

impl ServerEvent {
    pub fn connected() -> Self {
        Self::Status {
            status: SessionStatus::Connected,
            message: None,
        }
    }

    pub fn disconnected() -> Self {
        Self::Status {
            status: SessionStatus::Disconnected,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Status {
            status: SessionStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn data(data: impl Into<String>) -> Self {
        Self::Data { data: data.into() }
    }
}

/// Decode a `ClientEvent` from a text frame.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a `ServerEvent` for sending as a text frame.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}
