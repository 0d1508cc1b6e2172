//! Per-session table of live connections.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use remolacha_protocol::ConnectionId;

use crate::connection::ServerConnection;

/// Live connections of one session, keyed by the client-chosen ID.
#[derive(Debug, Default)]
pub(crate) struct RoutingTable {
    entries: Mutex<HashMap<ConnectionId, ServerConnection>>,
}

impl RoutingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ConnectionId, ServerConnection>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `connection` unless its ID is already routed.
    pub(crate) fn insert(&self, connection: ServerConnection) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(connection.id()) {
            return false;
        }
        entries.insert(connection.id().clone(), connection);
        true
    }

    pub(crate) fn contains(&self, id: &ConnectionId) -> bool {
        self.entries().contains_key(id)
    }

    pub(crate) fn get(&self, id: &ConnectionId) -> Option<ServerConnection> {
        self.entries().get(id).cloned()
    }

    /// Removes the entry for `connection`, leaving a newer connection that
    /// reuses the same ID in place.
    pub(crate) fn remove(&self, connection: &ServerConnection) {
        let mut entries = self.entries();
        if entries
            .get(connection.id())
            .is_some_and(|current| current.same_as(connection))
        {
            entries.remove(connection.id());
        }
    }

    /// Empties the table.
    pub(crate) fn drain(&self) -> Vec<ServerConnection> {
        self.entries().drain().map(|(_, connection)| connection).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}
