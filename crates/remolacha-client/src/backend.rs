//! RPC facade over the transport.

use remolacha_protocol::ConnectionEvent;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

/// Entry point for talking to server-side services.
///
/// Two usage patterns:
///
/// - [`open_stream`](Self::open_stream) returns an unopened [`Connection`]
///   for long-lived exchanges.
/// - [`call`](Self::call) waits for a single answer and closes.
#[derive(Clone)]
pub struct Backend {
    transport: Transport,
}

impl Backend {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Creates a connection to `service` on `app_id` without opening it.
    ///
    /// Subscribe to the returned connection, then call
    /// [`Connection::open`].
    pub fn open_stream(
        &self,
        app_id: &str,
        service: &str,
        params: impl Serialize,
    ) -> ClientResult<Connection> {
        let params = serde_json::to_value(params)?;

        let id = self.transport.allocate_id()?;
        let connection = Connection::new(
            id.clone(),
            app_id,
            service,
            params,
            self.transport.clone(),
        );
        self.transport.register(connection.clone())?;
        debug!(connection_id = %id, app_id, service, "created connection");

        Ok(connection)
    }

    /// Calls `service` on `app_id` and returns its first `data` payload.
    ///
    /// An `error` frame becomes [`ClientError::Remote`]; a close with no
    /// data yields `Value::Null`. The connection is closed either way.
    pub async fn call(
        &self,
        app_id: &str,
        service: &str,
        params: impl Serialize,
    ) -> ClientResult<Value> {
        let connection = self.open_stream(app_id, service, params)?;
        let mut events = connection.subscribe();
        connection.open()?;

        let outcome = match events.recv().await {
            Some(ConnectionEvent::Data(data)) => Ok(data),
            Some(ConnectionEvent::Error(message)) => Err(ClientError::Remote(message)),
            Some(ConnectionEvent::Close) | None => Ok(Value::Null),
        };

        connection.close();
        outcome
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
