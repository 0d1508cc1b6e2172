//! State and event plumbing shared by client and server connections.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::ConnectionId;

/// Lifecycle of a logical connection.
///
/// ```text
/// Created --open()--> Open --close() / peer close--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, `open` frame not sent yet.
    Created,
    /// Frames may flow.
    Open,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Fails with [`ProtocolError::InvalidState`] unless `self == expected`.
    pub fn ensure(
        self,
        expected: ConnectionState,
        connection_id: &ConnectionId,
        operation: &'static str,
    ) -> ProtocolResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(ProtocolError::invalid_state(connection_id, self, operation))
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Notification delivered to a connection's observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A `data` frame arrived.
    Data(Value),
    /// An `error` frame arrived.
    Error(String),
    /// The connection closed. Always the last event.
    Close,
}

/// Receiving end of one subscription.
///
/// Dropping it unsubscribes. The stream ends right after [`ConnectionEvent::Close`].
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl EventStream {
    /// Waits for the next event; `None` once the connection has closed and
    /// every buffered event was consumed.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Returns a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = ConnectionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Fan-out list of subscriptions for one connection.
#[derive(Debug, Default)]
pub struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<ConnectionEvent>>,
    finished: bool,
}

impl Subscribers {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription. After [`finish`](Self::finish) the returned
    /// stream is already at its end.
    pub fn subscribe(&mut self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.finished {
            self.senders.push(tx);
        }
        EventStream { rx }
    }

    /// Delivers `event` to every live subscription and forgets the ones
    /// whose receiver was dropped.
    pub fn emit(&mut self, event: ConnectionEvent) {
        if self.finished {
            return;
        }
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emits [`ConnectionEvent::Close`] and ends every subscription.
    pub fn finish(&mut self) {
        self.emit(ConnectionEvent::Close);
        self.senders.clear();
        self.finished = true;
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.senders.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// True when nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_rejects_other_states() {
        let id = ConnectionId::from(1);
        assert!(ConnectionState::Open.ensure(ConnectionState::Open, &id, "send").is_ok());

        let error = ConnectionState::Closed
            .ensure(ConnectionState::Open, &id, "send")
            .unwrap_err();
        assert!(matches!(
            error,
            ProtocolError::InvalidState {
                state: ConnectionState::Closed,
                operation: "send",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn events_end_after_close() {
        let mut subscribers = Subscribers::new();
        let mut events = subscribers.subscribe();

        subscribers.emit(ConnectionEvent::Data(json!(1)));
        subscribers.finish();
        subscribers.emit(ConnectionEvent::Data(json!(2)));

        assert_eq!(events.recv().await, Some(ConnectionEvent::Data(json!(1))));
        assert_eq!(events.recv().await, Some(ConnectionEvent::Close));
        assert_eq!(events.recv().await, None);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let mut subscribers = Subscribers::new();
        let kept = subscribers.subscribe();
        let dropped = subscribers.subscribe();
        assert_eq!(subscribers.len(), 2);

        drop(dropped);
        subscribers.emit(ConnectionEvent::Error("x".into()));
        assert_eq!(subscribers.len(), 1);
        drop(kept);
        assert!(subscribers.is_empty());
    }

    #[tokio::test]
    async fn late_subscription_sees_nothing() {
        let mut subscribers = Subscribers::new();
        subscribers.finish();

        let mut events = subscribers.subscribe();
        assert_eq!(events.recv().await, None);
    }
}
