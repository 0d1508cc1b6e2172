//! Protocol error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::connection::ConnectionState;
use crate::frame::ConnectionId;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing, transporting or driving connections.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded frame exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Frame could not be serialized or parsed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Empty message received.
    #[error("empty message")]
    EmptyMessage,

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The physical socket is gone.
    #[error("socket closed")]
    SocketClosed,

    /// Operation not allowed in the connection's current state.
    #[error("cannot {operation} connection {connection_id} while {state}")]
    InvalidState {
        connection_id: ConnectionId,
        state: ConnectionState,
        operation: &'static str,
    },
}

impl ProtocolError {
    /// Creates an invalid state error.
    pub fn invalid_state(
        connection_id: &ConnectionId,
        state: ConnectionState,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            connection_id: connection_id.clone(),
            state,
            operation,
        }
    }

    /// True for errors caused by a single bad message rather than a broken
    /// socket. Readers skip these and keep going.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_) | Self::EmptyMessage | Self::MessageTooLarge { .. }
        )
    }
}

impl From<tungstenite::Error> for ProtocolError {
    fn from(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::SocketClosed
            }
            other => Self::WebSocket(other.to_string()),
        }
    }
}
