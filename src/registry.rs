//! Connection registry
//!
//! Concurrent map from connection id to live connection. The host registers
//! a connection once its socket is live and the connection removes itself
//! when its disconnect completes; `drain` hands the whole live set to the
//! caller so shutdown can disconnect everything.

use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::Connection;

/// Map of live connections keyed by connection id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<i64, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection under its id
    pub fn insert(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id(), connection);
    }

    /// Look up a connection by id
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a connection by id, returning it if it was registered
    pub fn remove(&self, id: i64) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    /// Number of registered connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Remove and return every registered connection
    ///
    /// Used by host shutdown: the caller issues a disconnect on each
    /// returned connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<i64> = self.connections.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }
}
