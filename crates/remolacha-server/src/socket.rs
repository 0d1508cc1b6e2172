//! WebSocket listener.
//!
//! Accepts TCP connections, upgrades them and runs one [`Session`] per
//! socket. Concurrent sessions are capped by a semaphore.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use remolacha_protocol::PhysicalSocket;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::ServiceRegistry;
use crate::session::Session;

/// WebSocket server for handling client sessions.
pub struct SocketServer {
    config: ServerConfig,
    listener: TcpListener,
    session_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Binds to `config.listen_addr`.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        if config.max_sessions == 0 {
            return Err(ServerError::config("max_sessions must be at least 1"));
        }

        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(addr = %listener.local_addr()?, "WebSocket server listening");

        let session_semaphore = Arc::new(Semaphore::new(config.max_sessions));
        Ok(Self {
            config,
            listener,
            session_semaphore,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for a session slot, then for the next TCP connection.
    ///
    /// The WebSocket upgrade happens in [`PendingSession::upgrade`], so a slow
    /// client does not hold up the accept loop.
    pub async fn accept(&self) -> ServerResult<PendingSession> {
        let permit = self
            .session_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "accepted TCP connection");

        Ok(PendingSession {
            stream,
            peer,
            config: self.config.clone(),
            permit,
        })
    }

    /// Serves `registry` until an unrecoverable error.
    pub async fn run(&self, registry: Arc<ServiceRegistry>) -> ServerResult<()> {
        loop {
            match self.accept().await {
                Ok(pending) => {
                    tokio::spawn(pending.serve(registry.clone()));
                }
                Err(ServerError::Shutdown) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Like [`run`](Self::run), returning once `shutdown` completes.
    pub async fn run_until_shutdown<S>(
        &self,
        registry: Arc<ServiceRegistry>,
        shutdown: S,
    ) -> ServerResult<()>
    where
        S: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(registry) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// A TCP connection holding a session slot, not yet upgraded.
pub struct PendingSession {
    stream: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    permit: OwnedSemaphorePermit,
}

impl PendingSession {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Performs the WebSocket handshake.
    pub async fn upgrade(self) -> ServerResult<(PhysicalSocket, OwnedSemaphorePermit)> {
        let handshake = tokio_tungstenite::accept_async(self.stream);
        let ws = match tokio::time::timeout(self.config.handshake_timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => return Err(ServerError::handshake(self.peer, e.to_string())),
            Err(_) => return Err(ServerError::handshake(self.peer, "timed out")),
        };
        Ok((PhysicalSocket::from_websocket(ws), self.permit))
    }

    /// Upgrades and runs a session to completion.
    pub async fn serve(self, registry: Arc<ServiceRegistry>) {
        let peer = self.peer;
        let grace = self.config.handler_grace;
        match self.upgrade().await {
            Ok((socket, _permit)) => {
                let session = Session::new(registry).with_handler_grace(grace);
                info!(%peer, session_id = %session.id(), "client connected");
                session.run(socket).await;
                info!(%peer, "client disconnected");
            }
            Err(e) => warn!(error = %e, "WebSocket upgrade failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use remolacha_protocol::{ConnectionId, Frame};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn local_config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_handshake_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn rejects_zero_sessions() {
        let result = SocketServer::bind(local_config().with_max_sessions(0)).await;
        assert!(matches!(result, Err(ServerError::Config { .. })));
    }

    #[tokio::test]
    async fn serves_sessions_over_websocket() {
        let server = SocketServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut registry = ServiceRegistry::new();
        registry
            .register("remolacha.Test", "hello", |params: Value, connection| async move {
                connection.send(json!({ "hello": params }))?;
                Ok(())
            })
            .unwrap();
        let registry = Arc::new(registry);

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server_task = tokio::spawn(async move {
            server
                .run_until_shutdown(registry, async {
                    let _ = stopped.await;
                })
                .await
        });

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let (mut sink, mut stream) = PhysicalSocket::from_websocket(ws).split();
        let id = ConnectionId::from(0);
        sink.send(Frame::open(id.clone(), "remolacha.Test", "hello", json!("you")))
            .await
            .unwrap();

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Frame::data(id.clone(), json!({"hello": "you"}))
        );
        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::close(id));

        stop.send(()).unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn plain_tcp_client_fails_handshake() {
        let server = SocketServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"hello\r\n\r\n").await.unwrap();
        });

        let pending = server.accept().await.unwrap();
        assert_eq!(pending.peer().ip(), addr.ip());
        let result = pending.upgrade().await;
        assert!(matches!(result, Err(ServerError::Handshake { .. })));
        client.await.unwrap();
    }
}
