//! Client error types.

use std::fmt;

use remolacha_core::ExhaustedError;
use remolacha_protocol::ProtocolError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to server failed.
    Connection(String),
    /// Protocol error, including misuse of a connection in the wrong state.
    Protocol(ProtocolError),
    /// Request timed out.
    Timeout(String),
    /// No free connection ID left.
    Exhausted(ExhaustedError),
    /// No manifest registered under this app ID.
    AppNotFound(String),
    /// No free instance ID left for this app.
    MaxInstancesReached(String),
    /// The server answered with an `error` frame.
    Remote(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Exhausted(err) => write!(f, "{}", err),
            Self::AppNotFound(app_id) => write!(f, "app \"{}\" not found", app_id),
            Self::MaxInstancesReached(app_id) => {
                write!(f, "maximum number of instances reached for \"{}\"", app_id)
            }
            Self::Remote(msg) => write!(f, "server error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Exhausted(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(ProtocolError::from(err))
    }
}

impl From<ExhaustedError> for ClientError {
    fn from(err: ExhaustedError) -> Self {
        Self::Exhausted(err)
    }
}

impl From<remolacha_server::ServerError> for ClientError {
    fn from(err: remolacha_server::ServerError) -> Self {
        Self::Connection(err.to_string())
    }
}
