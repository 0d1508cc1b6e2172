//! Client side of a logical connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use remolacha_protocol::{
    ConnectionEvent, ConnectionId, ConnectionState, EventStream, Frame, Subscribers,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ClientResult;
use crate::transport::Transport;

/// One exchange with a server-side service.
///
/// Created by [`Backend::open_stream`](crate::Backend::open_stream) in the
/// `Created` state: subscribe first, then [`open`](Self::open), so no frame
/// from the server can be missed. Cloning is cheap.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: ConnectionId,
    app_id: String,
    service: String,
    params: Value,
    transport: Transport,
    shared: Mutex<Shared>,
}

struct Shared {
    state: ConnectionState,
    subscribers: Subscribers,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        app_id: impl Into<String>,
        service: impl Into<String>,
        params: Value,
        transport: Transport,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                app_id: app_id.into(),
                service: service.into(),
                params,
                transport,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Created,
                    subscribers: Subscribers::new(),
                }),
            }),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn state(&self) -> ConnectionState {
        self.shared().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Subscribes to data, error and close events.
    pub fn subscribe(&self) -> EventStream {
        self.shared().subscribers.subscribe()
    }

    /// Sends the `open` frame. Only valid once, from `Created`.
    pub fn open(&self) -> ClientResult<()> {
        let mut shared = self.shared();
        shared
            .state
            .ensure(ConnectionState::Created, &self.inner.id, "open")?;
        shared.state = ConnectionState::Open;
        self.inner.transport.send_frame(Frame::open(
            self.inner.id.clone(),
            self.inner.app_id.clone(),
            self.inner.service.clone(),
            self.inner.params.clone(),
        ));
        Ok(())
    }

    /// Sends a `data` frame. Fails unless the connection is open.
    pub fn send<T: Serialize>(&self, data: T) -> ClientResult<()> {
        let data = serde_json::to_value(data)?;
        let shared = self.shared();
        shared
            .state
            .ensure(ConnectionState::Open, &self.inner.id, "send")?;
        self.inner
            .transport
            .send_frame(Frame::data(self.inner.id.clone(), data));
        Ok(())
    }

    /// Closes the connection. Only an open connection tells the server;
    /// calling it again is a no-op.
    pub fn close(&self) {
        {
            let mut shared = self.shared();
            match shared.state {
                ConnectionState::Closed => return,
                ConnectionState::Created => {}
                ConnectionState::Open => {
                    self.inner
                        .transport
                        .send_frame(Frame::close(self.inner.id.clone()));
                }
            }
            shared.state = ConnectionState::Closed;
            shared.subscribers.finish();
        }
        self.inner.transport.unregister(self);
        debug!(connection_id = %self.inner.id, "connection closed");
    }

    /// The server closed the connection, or the transport shut down.
    pub(crate) fn peer_closed(&self) {
        {
            let mut shared = self.shared();
            if shared.state == ConnectionState::Closed {
                return;
            }
            shared.state = ConnectionState::Closed;
            shared.subscribers.finish();
        }
        self.inner.transport.unregister(self);
        debug!(connection_id = %self.inner.id, "connection closed by server");
    }

    pub(crate) fn deliver(&self, event: ConnectionEvent) {
        let mut shared = self.shared();
        if shared.state == ConnectionState::Open {
            shared.subscribers.emit(event);
        }
    }

    pub(crate) fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("app_id", &self.inner.app_id)
            .field("service", &self.inner.service)
            .field("state", &self.state())
            .finish()
    }
}
