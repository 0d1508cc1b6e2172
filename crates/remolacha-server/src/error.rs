//! Server error types.

use std::io;

use remolacha_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type returned by service handlers.
pub type ServiceResult<T = ()> = Result<T, ServiceError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (listener, accept).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, websocket).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A handler is already registered for this app and service.
    #[error("Service \"{service}\" is already registered on app \"{app_id}\"")]
    DuplicateService { app_id: String, service: String },

    /// WebSocket upgrade failed or timed out.
    #[error("Handshake failed with {peer}: {message}")]
    Handshake { peer: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Shutdown requested.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    pub fn handshake(peer: impl ToString, message: impl Into<String>) -> Self {
        Self::Handshake {
            peer: peer.to_string(),
            message: message.into(),
        }
    }
}

/// An `open` frame named a target nobody registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("App \"{app_id}\" not found.")]
    AppNotFound { app_id: String },

    #[error("Service \"{service}\" not found on app \"{app_id}\".")]
    ServiceNotFound { app_id: String, service: String },
}

/// Failure reported by a service handler.
///
/// The dispatcher turns it into an `error` frame followed by `close`; the
/// `Display` text is what the client receives.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Free-form failure.
    #[error("{0}")]
    Failed(String),

    /// The `params` of the `open` frame were not usable.
    #[error("Unexpected params: {0}")]
    InvalidParams(String),

    /// Sending on the connection failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// OS-level failure inside the handler.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServiceError {
    /// Creates a free-form failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an invalid params failure.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidParams(error.to_string())
    }
}
