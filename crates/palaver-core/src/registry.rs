//! Connection registry: the single source of truth for "is this user
//! currently reachable."
//!
//! The registry maps an authenticated user id to its live outbound handle.
//! All operations are bounded map accesses; nothing here awaits, so a slow
//! peer can never stall another session. Delivery is best-effort: a send to
//! an absent or closed handle reports `false`, never an error.

use dashmap::DashMap;
use palaver_protocol::ServerEvent;
use palaver_store::UserId;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Process-local identifier for one transport connection.
///
/// Registrations are tagged with it so a stale connection's teardown can
/// never evict a newer login of the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// A live outbound handle for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// The connection this handle belongs to.
    pub connection_id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle around a connection's outbound queue.
    #[must_use]
    pub fn new(connection_id: ConnectionId, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            connection_id,
            sender,
        }
    }

    /// Queue an event for delivery. Returns `false` if the connection's
    /// outbound queue is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Whether the outbound queue is still attached to a live connection.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Concurrency-safe map from user id to live connection handle.
///
/// At most one handle per user: a second login supersedes the first, and
/// the superseded handle is returned to the caller so the eviction is
/// explicit rather than silent.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handle for a user, returning any superseded handle.
    pub fn register(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.connections.insert(user, handle);
        if let Some(prev) = &previous {
            debug!(user = %user, superseded = %prev.connection_id, "Connection superseded");
        }
        previous
    }

    /// Remove the user's handle, but only if it still belongs to the given
    /// connection. Returns `true` if a handle was removed.
    pub fn unregister(&self, user: UserId, connection_id: ConnectionId) -> bool {
        self.connections
            .remove_if(&user, |_, handle| handle.connection_id == connection_id)
            .is_some()
    }

    /// Queue an event to the user's live connection.
    ///
    /// Returns `false` if the user has no live connection or the write
    /// fails; broadcast is best-effort by contract.
    pub fn send(&self, user: UserId, event: ServerEvent) -> bool {
        match self.connections.get(&user) {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    /// Look up the user's handle.
    #[must_use]
    pub fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.connections.get(&user).map(|h| h.clone())
    }

    /// Whether the user has a live, open connection.
    #[must_use]
    pub fn is_connected(&self, user: UserId) -> bool {
        self.connections
            .get(&user)
            .map(|h| h.is_open())
            .unwrap_or(false)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
