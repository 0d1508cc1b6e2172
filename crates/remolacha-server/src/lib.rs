//! Server side of the remolacha multiplexing protocol.
//!
//! Each accepted WebSocket becomes one [`Session`]. The session reads
//! frames, hands `open` frames to the [`ServiceRegistry`] and routes every
//! other frame to the matching [`ServerConnection`]. Handlers run as
//! independent tasks, so a long-lived stream never blocks the socket.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use remolacha_server::{ServerConfig, ServiceRegistry, SocketServer};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ServiceRegistry::new();
//!     registry.register("remolacha.Echo", "echo", |params: Value, connection| async move {
//!         connection.send(json!({ "echo": params }))?;
//!         Ok(())
//!     })?;
//!
//!     let server = SocketServer::bind(ServerConfig::default()).await?;
//!     server.run(Arc::new(registry)).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod registry;
mod routing;
pub mod services;
mod session;
mod signals;
mod socket;

pub use config::{ServerConfig, default_listen_addr};
pub use connection::ServerConnection;
pub use error::{RoutingError, ServerError, ServerResult, ServiceError, ServiceResult};
pub use registry::{ServiceFuture, ServiceHandler, ServiceRegistry};
pub use session::Session;
pub use signals::{ShutdownSignal, SignalHandler};
pub use socket::{PendingSession, SocketServer};
