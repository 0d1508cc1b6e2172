//! Client transport: the single physical socket shared by every connection.
//!
//! The transport runs a driver task that (re)connects through a
//! [`Connector`], pumps outbound frames into the socket and routes inbound
//! frames to the matching [`Connection`]. While the socket is down, frames
//! wait in a FIFO queue and are flushed, in order, once a new socket is up.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use remolacha_core::{ExhaustedError, IdAllocator};
use remolacha_protocol::{
    ConnectionEvent, ConnectionId, Frame, PhysicalSocket, ProtocolError, ProtocolResult,
};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};

/// Server URL used when nothing else is configured.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:3000";

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the server.
    pub url: String,
    /// Pause between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Builder: set reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Opens physical sockets for a [`Transport`].
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, ProtocolResult<PhysicalSocket>>;
}

/// Connects over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'static, ProtocolResult<PhysicalSocket>> {
        let url = self.url.clone();
        Box::pin(async move {
            let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
            Ok(PhysicalSocket::from_websocket(ws))
        })
    }
}

/// Hands out sockets pushed through a channel, one per connect attempt.
///
/// Wires a client to an in-process server, typically with
/// [`PhysicalSocket::pair`]. Connect attempts wait until a socket is
/// supplied and fail once every sender is gone.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    sockets: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<PhysicalSocket>>>,
}

impl ChannelConnector {
    pub fn new() -> (mpsc::UnboundedSender<PhysicalSocket>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            sockets: Arc::new(tokio::sync::Mutex::new(rx)),
        };
        (tx, connector)
    }
}

impl Connector for ChannelConnector {
    fn connect(&self) -> BoxFuture<'static, ProtocolResult<PhysicalSocket>> {
        let sockets = self.sockets.clone();
        Box::pin(async move {
            sockets
                .lock()
                .await
                .recv()
                .await
                .ok_or(ProtocolError::SocketClosed)
        })
    }
}

/// Handle to the shared physical socket. Cloning is cheap.
///
/// The driver task keeps running until [`shutdown`](Self::shutdown) is
/// called, even if every handle was dropped.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

struct Shared {
    link: Mutex<Link>,
    ids: Mutex<IdAllocator>,
    routes: Mutex<HashMap<ConnectionId, Connection>>,
    connected: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct Link {
    writer: Option<mpsc::UnboundedSender<Frame>>,
    pending: VecDeque<Frame>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport {
    /// Starts a transport connecting over WebSocket to `config.url`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: TransportConfig) -> Self {
        let connector = WebSocketConnector::new(config.url.clone());
        Self::with_connector(connector, config)
    }

    /// Starts a transport using a custom connector.
    pub fn with_connector(connector: impl Connector, config: TransportConfig) -> Self {
        let (connected, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            link: Mutex::new(Link::default()),
            ids: Mutex::new(IdAllocator::unbounded()),
            routes: Mutex::new(HashMap::new()),
            connected,
            shutdown,
        });

        let span = info_span!("transport", url = %config.url);
        tokio::spawn(drive(shared.clone(), Arc::new(connector), config.reconnect_delay).instrument(span));

        Self { shared }
    }

    /// Writes `frame` now if the socket is up, otherwise queues it.
    pub fn send_frame(&self, frame: Frame) {
        let mut link = lock(&self.shared.link);
        let frame = match &link.writer {
            Some(writer) => match writer.send(frame) {
                Ok(()) => return,
                Err(mpsc::error::SendError(frame)) => frame,
            },
            None => frame,
        };
        trace!(connection_id = %frame.connection_id(), action = frame.action(), "queueing frame until reconnect");
        link.pending.push_back(frame);
    }

    /// True while a physical socket is up.
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Waits until a physical socket is up.
    pub async fn wait_connected(&self) {
        let mut rx = self.shared.connected.subscribe();
        let _ = rx.wait_for(|connected| *connected).await;
    }

    /// Frames waiting for the next socket.
    pub fn pending_len(&self) -> usize {
        lock(&self.shared.link).pending.len()
    }

    /// Number of routed connections.
    pub fn connection_count(&self) -> usize {
        lock(&self.shared.routes).len()
    }

    /// Stops the driver and closes every connection locally. Connections
    /// can no longer be registered afterwards.
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    /// Next connection ID on this transport.
    ///
    /// Every [`Backend`](crate::Backend) sharing the transport draws from
    /// the same allocator, so an ID is not handed out again while the
    /// server may still send frames for it.
    pub(crate) fn allocate_id(&self) -> Result<ConnectionId, ExhaustedError> {
        let mut ids = lock(&self.shared.ids);
        let routes = lock(&self.shared.routes);
        ids.allocate(|n| routes.contains_key(&ConnectionId::from(n)))
            .map(ConnectionId::from)
    }

    /// Routes inbound frames for `connection` to it.
    ///
    /// Fails once shutdown was requested: the driver drains the table only
    /// after the flag is set, so a later entry would never be closed.
    pub(crate) fn register(&self, connection: Connection) -> ClientResult<()> {
        let mut routes = lock(&self.shared.routes);
        if self.is_shut_down() {
            return Err(ClientError::Connection("transport is shut down".into()));
        }
        routes.insert(connection.id().clone(), connection);
        Ok(())
    }

    pub(crate) fn unregister(&self, connection: &Connection) {
        let mut routes = lock(&self.shared.routes);
        if routes
            .get(connection.id())
            .is_some_and(|current| current.same_as(connection))
        {
            routes.remove(connection.id());
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl Shared {
    fn route(&self, frame: Frame) {
        let Some(connection) = lock(&self.routes).get(frame.connection_id()).cloned() else {
            debug!(
                connection_id = %frame.connection_id(),
                action = frame.action(),
                "dropping frame for unknown connection"
            );
            return;
        };

        match frame {
            Frame::Data { data, .. } => connection.deliver(ConnectionEvent::Data(data)),
            Frame::Error { error, .. } => connection.deliver(ConnectionEvent::Error(error)),
            Frame::Close { .. } => connection.peer_closed(),
            Frame::Open { connection_id, .. } => {
                warn!(%connection_id, "ignoring open frame from server");
            }
        }
    }

    /// Pumps frames over one socket. Returns true when shutdown was requested.
    async fn run_socket(&self, socket: PhysicalSocket, shutdown: &mut watch::Receiver<bool>) -> bool {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let mut link = lock(&self.link);
            let flushed = link.pending.len();
            for frame in link.pending.drain(..) {
                let _ = tx.send(frame);
            }
            link.writer = Some(tx);
            info!(flushed, "connected");
        }
        self.connected.send_replace(true);

        let mut in_flight = None;
        let stop = loop {
            tokio::select! {
                _ = stopped(shutdown) => break true,
                outbound = rx.recv() => {
                    let Some(frame) = outbound else { break false };
                    match sink.send(frame.clone()).await {
                        Ok(()) => {}
                        Err(e) if e.is_malformed() => {
                            warn!(error = %e, connection_id = %frame.connection_id(), "dropping unencodable frame");
                        }
                        Err(e) => {
                            debug!(error = %e, "socket write failed");
                            in_flight = Some(frame);
                            break false;
                        }
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.route(frame),
                    Some(Err(e)) if e.is_malformed() => {
                        warn!(error = %e, "dropping malformed frame");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        break false;
                    }
                    None => break false,
                },
            }
        };

        {
            // Unsent frames go back in front of whatever was queued meanwhile.
            let mut link = lock(&self.link);
            link.writer = None;
            let mut undelivered: VecDeque<Frame> = in_flight.into_iter().collect();
            while let Ok(frame) = rx.try_recv() {
                undelivered.push_back(frame);
            }
            undelivered.extend(link.pending.drain(..));
            link.pending = undelivered;
        }
        self.connected.send_replace(false);
        stop
    }

    fn close_all(&self) {
        let connections: Vec<Connection> = lock(&self.routes).drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.peer_closed();
        }
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn drive(shared: Arc<Shared>, connector: Arc<dyn Connector>, reconnect_delay: Duration) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        let attempt = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            attempt = connector.connect() => attempt,
        };

        match attempt {
            Ok(socket) => {
                if shared.run_socket(socket, &mut shutdown).await {
                    break;
                }
                info!(pending = lock(&shared.link).pending.len(), "connection lost, reconnecting");
            }
            Err(e) => warn!(error = %e, "connect failed"),
        }

        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    shared.close_all();
    debug!("transport stopped");
}
