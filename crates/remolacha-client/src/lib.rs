//! Client side of the remolacha multiplexing protocol.
//!
//! A [`Transport`] owns the one physical socket to the server and keeps it
//! alive across drops. [`Backend`] hands out [`Connection`]s on top of it,
//! either as long-lived streams or as one-shot calls. [`AppInstances`]
//! tracks running applications and scopes their calls to the right app.
//!
//! This crate also provides the `remolacha` command-line interface.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod instance;
pub mod transport;

pub use backend::Backend;
pub use cli::Cli;
pub use connection::Connection;
pub use error::{ClientError, ClientResult};
pub use instance::{AppInstance, AppInstances, AppManifest};
pub use transport::{ChannelConnector, Connector, Transport, TransportConfig, WebSocketConnector};
