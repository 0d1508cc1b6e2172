//! Server side of a logical connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use remolacha_protocol::{
    ConnectionEvent, ConnectionId, ConnectionState, EventStream, Frame, ProtocolError,
    ProtocolResult, Subscribers,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::routing::RoutingTable;

/// Handle passed to a service handler.
///
/// Cloning is cheap; all clones refer to the same connection. A server
/// connection is born open, because it only exists once the client's
/// `open` frame arrived.
#[derive(Clone)]
pub struct ServerConnection {
    inner: Arc<Inner>,
}

struct Inner {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Frame>,
    routes: Weak<RoutingTable>,
    shared: Mutex<Shared>,
    closed: watch::Sender<bool>,
    detached: AtomicBool,
}

struct Shared {
    state: ConnectionState,
    subscribers: Subscribers,
    inbox: Option<EventStream>,
}

impl ServerConnection {
    pub(crate) fn new(
        id: ConnectionId,
        outbound: mpsc::UnboundedSender<Frame>,
        routes: Weak<RoutingTable>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        let mut subscribers = Subscribers::new();
        let inbox = Some(subscribers.subscribe());
        Self {
            inner: Arc::new(Inner {
                id,
                outbound,
                routes,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Open,
                    subscribers,
                    inbox,
                }),
                closed,
                detached: AtomicBool::new(false),
            }),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The client-chosen connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared().state
    }

    /// True once either side closed the connection.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once the connection is closed, by either side.
    ///
    /// Streaming handlers select on this to stop producing.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Sends a `data` frame.
    pub fn send<T: Serialize>(&self, data: T) -> ProtocolResult<()> {
        let data = serde_json::to_value(data)?;
        let shared = self.shared();
        shared
            .state
            .ensure(ConnectionState::Open, &self.inner.id, "send")?;
        self.enqueue(Frame::data(self.inner.id.clone(), data))
    }

    /// Sends an `error` frame. The connection stays open; callers usually
    /// follow up with [`close`](Self::close).
    pub fn fail(&self, message: impl Into<String>) -> ProtocolResult<()> {
        let shared = self.shared();
        shared
            .state
            .ensure(ConnectionState::Open, &self.inner.id, "fail")?;
        self.enqueue(Frame::error(self.inner.id.clone(), message))
    }

    /// Closes the connection and tells the client. Calling it again is a
    /// no-op.
    pub fn close(&self) {
        self.shutdown(true);
    }

    /// Subscribes to data and close events coming from the client.
    ///
    /// The first subscription also yields whatever arrived between the
    /// `open` frame and the call, since the handler task may start late.
    pub fn subscribe(&self) -> EventStream {
        let mut shared = self.shared();
        match shared.inbox.take() {
            Some(inbox) => inbox,
            None => shared.subscribers.subscribe(),
        }
    }

    /// Keeps the connection open after the handler returns.
    ///
    /// Handlers that hand the connection to a background task call this;
    /// whoever owns it then has to [`close`](Self::close) it.
    pub fn detach(&self) {
        self.inner.detached.store(true, Ordering::Release);
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    /// The client closed the connection or the session ended.
    pub(crate) fn peer_closed(&self) {
        self.shutdown(false);
    }

    /// Routes a client `data` frame to the subscribers.
    pub(crate) fn deliver(&self, data: Value) {
        let mut shared = self.shared();
        if shared.state == ConnectionState::Open {
            shared.subscribers.emit(ConnectionEvent::Data(data));
        }
    }

    pub(crate) fn same_as(&self, other: &ServerConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn enqueue(&self, frame: Frame) -> ProtocolResult<()> {
        trace!(connection_id = %self.inner.id, action = frame.action(), "queueing frame");
        self.inner
            .outbound
            .send(frame)
            .map_err(|_| ProtocolError::SocketClosed)
    }

    fn shutdown(&self, notify_peer: bool) {
        {
            let mut shared = self.shared();
            if shared.state == ConnectionState::Closed {
                return;
            }
            shared.state = ConnectionState::Closed;
            if notify_peer {
                // Session writer may already be gone; nothing left to tell.
                let _ = self.enqueue(Frame::close(self.inner.id.clone()));
            }
            shared.subscribers.finish();
        }

        if let Some(routes) = self.inner.routes.upgrade() {
            routes.remove(self);
        }
        self.inner.closed.send_replace(true);
        debug!(connection_id = %self.inner.id, notify_peer, "connection closed");
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection() -> (
        ServerConnection,
        mpsc::UnboundedReceiver<Frame>,
        Arc<RoutingTable>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let routes = Arc::new(RoutingTable::new());
        let connection = ServerConnection::new(ConnectionId::from(7), tx, Arc::downgrade(&routes));
        assert!(routes.insert(connection.clone()));
        (connection, rx, routes)
    }

    #[test]
    fn send_then_close_emits_frames_in_order() {
        let (connection, mut rx, routes) = connection();

        connection.send(json!({"n": 1})).unwrap();
        connection.close();

        assert_eq!(
            rx.try_recv().unwrap(),
            Frame::data(ConnectionId::from(7), json!({"n": 1}))
        );
        assert_eq!(rx.try_recv().unwrap(), Frame::close(ConnectionId::from(7)));
        assert!(rx.try_recv().is_err());
        assert_eq!(routes.len(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let (connection, mut rx, _routes) = connection();

        connection.close();
        connection.close();

        assert_eq!(rx.try_recv().unwrap(), Frame::close(ConnectionId::from(7)));
        assert!(rx.try_recv().is_err());
        assert!(connection.is_closed());
    }

    #[test]
    fn send_after_close_is_rejected() {
        let (connection, _rx, _routes) = connection();
        connection.close();

        let error = connection.send(json!(1)).unwrap_err();
        assert!(matches!(
            error,
            ProtocolError::InvalidState {
                state: ConnectionState::Closed,
                ..
            }
        ));
        assert!(connection.fail("late").is_err());
    }

    #[tokio::test]
    async fn peer_close_sends_nothing_and_wakes_handler() {
        let (connection, mut rx, routes) = connection();
        let mut events = connection.subscribe();

        let waiter = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.closed().await })
        };

        connection.deliver(json!("hello"));
        connection.peer_closed();

        waiter.await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(events.recv().await, Some(ConnectionEvent::Data(json!("hello"))));
        assert_eq!(events.recv().await, Some(ConnectionEvent::Close));
        assert_eq!(events.recv().await, None);
        assert_eq!(routes.len(), 0);
    }

    #[tokio::test]
    async fn first_subscription_sees_early_data() {
        let (connection, _rx, _routes) = connection();
        connection.deliver(json!(1));

        let mut first = connection.subscribe();
        let mut second = connection.subscribe();
        connection.deliver(json!(2));
        connection.close();

        assert_eq!(first.recv().await, Some(ConnectionEvent::Data(json!(1))));
        assert_eq!(first.recv().await, Some(ConnectionEvent::Data(json!(2))));
        assert_eq!(second.recv().await, Some(ConnectionEvent::Data(json!(2))));
        assert_eq!(second.recv().await, Some(ConnectionEvent::Close));
    }

    #[test]
    fn send_fails_once_session_writer_is_gone() {
        let (connection, rx, _routes) = connection();
        drop(rx);

        assert!(matches!(
            connection.send(json!(1)),
            Err(ProtocolError::SocketClosed)
        ));
    }

    #[test]
    fn removing_stale_connection_keeps_newer_route() {
        let (stale, _rx, routes) = connection();
        routes.drain();

        let (tx, _rx2) = mpsc::unbounded_channel();
        let fresh = ServerConnection::new(ConnectionId::from(7), tx, Arc::downgrade(&routes));
        assert!(routes.insert(fresh.clone()));

        stale.close();
        assert!(routes.get(&ConnectionId::from(7)).is_some());
    }
}
