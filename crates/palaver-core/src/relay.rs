//! Broadcast relay: best-effort fan-out of one event to every reachable
//! member of a room.
//!
//! Membership is resolved from the store at call time, so a member who
//! joined after the triggering write still receives the event, and one who
//! left does not. Members without a live connection are tolerated; a
//! failed send is swallowed.

use palaver_protocol::ServerEvent;
use palaver_store::{ChatStore, RoomId, UserId};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::registry::ConnectionRegistry;

/// Fan-out engine shared by the coordinator, pipeline, and sessions.
pub struct BroadcastRelay {
    store: Arc<dyn ChatStore>,
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRelay {
    /// Create a relay over the given store and registry.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Deliver `event` to every member of the room except `exclude`.
    ///
    /// Returns the number of members actually reached. Unknown rooms and
    /// store failures deliver to nobody; broadcast is best-effort.
    pub async fn broadcast(
        &self,
        room_id: RoomId,
        event: &ServerEvent,
        exclude: Option<UserId>,
    ) -> usize {
        let room = match self.store.room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                warn!(room = %room_id, "Broadcast to non-existent room");
                return 0;
            }
            Err(e) => {
                warn!(room = %room_id, error = %e, "Broadcast membership lookup failed");
                return 0;
            }
        };

        let mut delivered = 0;
        for member in &room.members {
            if Some(*member) == exclude {
                continue;
            }
            if self.registry.send(*member, event.clone()) {
                delivered += 1;
            }
        }

        trace!(room = %room_id, recipients = delivered, "Broadcast delivered");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionHandle, ConnectionId};
    use palaver_store::MemoryStore;
    use tokio::sync::mpsc;

    async fn setup() -> (Arc<MemoryStore>, Arc<ConnectionRegistry>, BroadcastRelay) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = BroadcastRelay::new(store.clone(), registry.clone());
        (store, registry, relay)
    }

    fn connect(
        registry: &ConnectionRegistry,
        user: UserId,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(user, ConnectionHandle::new(ConnectionId::generate(), tx));
        rx
    }

    #[tokio::test]
    async fn test_broadcast_reaches_connected_members_only() {
        let (store, registry, relay) = setup().await;
        let alice = store.create_user("alice").await.unwrap();
        let bob = store.create_user("bob").await.unwrap();
        let carol = store.create_user("carol").await.unwrap();
        let room = store.create_room("General", alice.id, "").await.unwrap();
        store.add_member(room.id, bob.id).await.unwrap();
        // carol is connected but not a member
        let mut alice_rx = connect(&registry, alice.id);
        let mut carol_rx = connect(&registry, carol.id);

        // bob is a member with no live connection; delivery skips him
        let delivered = relay
            .broadcast(room.id, &ServerEvent::error("hi"), None)
            .await;
        assert_eq!(delivered, 1);
        assert!(alice_rx.try_recv().is_ok());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_one_user() {
        let (store, registry, relay) = setup().await;
        let alice = store.create_user("alice").await.unwrap();
        let bob = store.create_user("bob").await.unwrap();
        let room = store.create_room("General", alice.id, "").await.unwrap();
        store.add_member(room.id, bob.id).await.unwrap();
        let mut alice_rx = connect(&registry, alice.id);
        let mut bob_rx = connect(&registry, bob.id);

        let delivered = relay
            .broadcast(room.id, &ServerEvent::error("hi"), Some(bob.id))
            .await;
        assert_eq!(delivered, 1);
        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_missing_room_delivers_nothing() {
        let (_store, _registry, relay) = setup().await;
        let delivered = relay
            .broadcast(RoomId::generate(), &ServerEvent::error("hi"), None)
            .await;
        assert_eq!(delivered, 0);
    }
}
