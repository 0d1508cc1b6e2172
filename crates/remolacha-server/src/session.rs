//! One physical socket on the server side.
//!
//! A session owns the routing table of its logical connections. Inbound
//! frames are handled in arrival order on the session task; outbound frames
//! from every connection funnel through one writer task, which keeps each
//! connection's frames in the order they were produced.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use remolacha_protocol::{Frame, FrameSink, PhysicalSocket};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::connection::ServerConnection;
use crate::registry::{Dispatcher, ServiceRegistry};
use crate::routing::RoutingTable;

/// Default time handlers get to notice their connection closed.
const DEFAULT_HANDLER_GRACE: Duration = Duration::from_secs(5);

/// Serves one physical socket.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    dispatcher: Dispatcher,
    handler_grace: Duration,
}

impl Session {
    /// Creates a session that dispatches to `registry`.
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dispatcher: Dispatcher::new(registry),
            handler_grace: DEFAULT_HANDLER_GRACE,
        }
    }

    /// Builder: set how long handlers may run after the socket is gone.
    pub fn with_handler_grace(mut self, grace: Duration) -> Self {
        self.handler_grace = grace;
        self
    }

    /// Session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Runs until the peer goes away or the socket fails.
    ///
    /// On exit every open connection is closed without sending frames;
    /// handlers still running after the grace period are aborted.
    pub async fn run(self, socket: PhysicalSocket) {
        let span = info_span!("session", session_id = %self.id);
        self.serve(socket).instrument(span).await;
    }

    async fn serve(self, socket: PhysicalSocket) {
        let (sink, mut stream) = socket.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(sink, outbound_rx).in_current_span());

        let routes = Arc::new(RoutingTable::new());
        let mut tasks = JoinSet::new();
        let mut opened = 0usize;
        info!("session started");

        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => {
                        if self.route(frame, &routes, &outbound, &mut tasks) {
                            opened += 1;
                        }
                    }
                    Some(Err(e)) if e.is_malformed() => {
                        warn!(error = %e, "dropping malformed frame");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        break;
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        debug!(error = %e, "handler task ended abnormally");
                    }
                }
            }
        }

        let live = routes.drain();
        info!(opened, live = live.len(), "session ended");
        for connection in live {
            connection.peer_closed();
        }

        if tokio::time::timeout(self.handler_grace, drain_tasks(&mut tasks))
            .await
            .is_err()
        {
            warn!(remaining = tasks.len(), "aborting handlers after grace period");
            tasks.shutdown().await;
        }

        drop(outbound);
        writer.abort();
    }

    /// Handles one inbound frame. Returns true when a handler was started.
    fn route(
        &self,
        frame: Frame,
        routes: &Arc<RoutingTable>,
        outbound: &mpsc::UnboundedSender<Frame>,
        tasks: &mut JoinSet<()>,
    ) -> bool {
        trace!(connection_id = %frame.connection_id(), action = frame.action(), "inbound frame");

        match frame {
            Frame::Open {
                connection_id,
                app_id,
                service,
                params,
            } => {
                if routes.contains(&connection_id) {
                    warn!(%connection_id, "ignoring open for a connection that is already open");
                    return false;
                }

                let connection =
                    ServerConnection::new(connection_id, outbound.clone(), Arc::downgrade(routes));
                routes.insert(connection.clone());
                self.dispatcher
                    .dispatch(connection, &app_id, &service, params, tasks)
            }
            Frame::Data {
                connection_id,
                data,
            } => {
                match routes.get(&connection_id) {
                    Some(connection) => connection.deliver(data),
                    None => debug!(%connection_id, "dropping data for unknown connection"),
                }
                false
            }
            Frame::Close { connection_id } => {
                if let Some(connection) = routes.get(&connection_id) {
                    connection.peer_closed();
                }
                false
            }
            Frame::Error {
                connection_id,
                error,
            } => {
                debug!(%connection_id, %error, "ignoring error frame from client");
                false
            }
        }
    }
}

async fn write_frames(mut sink: FrameSink, mut outbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(frame).await {
            debug!(error = %e, "socket write failed");
            return;
        }
    }
    let _ = sink.close().await;
}

async fn drain_tasks(tasks: &mut JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}
