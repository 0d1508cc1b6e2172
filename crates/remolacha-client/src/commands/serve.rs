//! Serve command: runs the server in the foreground.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use remolacha_server::{SignalHandler, SocketServer, services};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Runs the server with the built-in services until SIGINT/SIGTERM.
pub async fn run(listen: Option<SocketAddr>, config: &ClientConfig) -> ClientResult<()> {
    let mut server_config = config.server_config();
    if let Some(listen) = listen {
        server_config.listen_addr = listen;
    }

    let registry = Arc::new(services::builtin_registry()?);
    for (app_id, names) in registry.catalog() {
        info!(app_id, services = ?names, "Services registered");
    }

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let server = SocketServer::bind(server_config).await?;
    info!(addr = %server.local_addr()?, "Server listening");

    server
        .run_until_shutdown(registry, signal_handler.shutdown().wait())
        .await?;

    info!("Server stopped");
    Ok(())
}
