//! Per-connection session state machine.
//!
//! One `Session` drives one transport connection: it enforces the
//! authentication gate, dispatches domain events to the coordinator and
//! pipeline, and runs the disconnect fan-out when the connection closes.
//! The transport layer feeds it decoded inbound events and pumps its
//! outbound queue to the socket.

use palaver_protocol::{ClientEvent, ServerEvent};
use palaver_store::{MessageKind, RoomId, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{ConnectionHandle, ConnectionId};
use crate::views::message_view;
use crate::ChatCore;

/// Authentication state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Unauthenticated,
    Authenticated(UserId),
    Closed,
}

/// The per-connection driver.
///
/// Owns the connection's outbound sender so it can reply before
/// authentication; on auth success the same sender is registered in the
/// connection registry for room fan-out.
pub struct Session {
    connection_id: ConnectionId,
    state: SessionState,
    core: Arc<ChatCore>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    #[must_use]
    pub fn new(core: Arc<ChatCore>, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        let connection_id = ConnectionId::generate();
        debug!(connection = %connection_id, "Session created");
        Self {
            connection_id,
            state: SessionState::Unauthenticated,
            core,
            outbound,
        }
    }

    /// This connection's process-local id.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The authenticated user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Process one inbound event.
    ///
    /// Errors never escape: every failure becomes an `error` or
    /// `auth_error` reply on this connection, with no state change.
    pub async fn handle(&mut self, event: ClientEvent) {
        if self.state == SessionState::Closed {
            return;
        }

        if let ClientEvent::Authenticate { credential } = event {
            self.authenticate(&credential).await;
            return;
        }

        let SessionState::Authenticated(user_id) = self.state else {
            self.reply(ServerEvent::error("Authentication required"));
            return;
        };

        match event {
            ClientEvent::Authenticate { .. } => unreachable!("handled above"),
            ClientEvent::JoinRoom { room_id } => {
                match self.core.coordinator.join(RoomId::from(room_id), user_id).await {
                    Ok(snapshot) => self.reply(ServerEvent::RoomJoined {
                        room_id: snapshot.room_id.as_uuid(),
                        name: snapshot.name,
                        description: snapshot.description,
                        messages: snapshot.messages,
                        users: snapshot.users,
                    }),
                    Err(e) => self.reply(ServerEvent::error(e.to_string())),
                }
            }
            ClientEvent::LeaveRoom { room_id } => {
                match self.core.coordinator.leave(RoomId::from(room_id), user_id).await {
                    Ok(()) => self.reply(ServerEvent::RoomLeft { room_id }),
                    Err(e) => self.reply(ServerEvent::error(e.to_string())),
                }
            }
            ClientEvent::ChatMessage { room_id, content } => {
                // The sender hears the result through the room broadcast.
                if let Err(e) = self
                    .core
                    .pipeline
                    .post(RoomId::from(room_id), user_id, &content)
                    .await
                {
                    self.reply(ServerEvent::error(e.to_string()));
                }
            }
            ClientEvent::GetRoomUsers { room_id } => {
                match self
                    .core
                    .coordinator
                    .members(RoomId::from(room_id), user_id)
                    .await
                {
                    Ok(users) => self.reply(ServerEvent::RoomUsers { room_id, users }),
                    Err(e) => self.reply(ServerEvent::error(e.to_string())),
                }
            }
            ClientEvent::TypingStatus { room_id, is_typing } => {
                self.core
                    .coordinator
                    .typing(RoomId::from(room_id), user_id, is_typing)
                    .await;
            }
        }
    }

    /// Tear the session down after the transport closed.
    ///
    /// Idempotent. For an authenticated session this unregisters the
    /// connection, flips presence to inactive, and narrates the disconnect
    /// to every room the user belongs to, best-effort per room.
    pub async fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Authenticated(user_id) = state else {
            return;
        };

        self.core.registry.unregister(user_id, self.connection_id);

        if let Err(e) = self.core.store().set_presence(user_id, false).await {
            warn!(user = %user_id, error = %e, "Failed to persist offline presence");
        }

        let user = match self.core.store().user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Disconnect fan-out aborted");
                return;
            }
        };
        let rooms = match self.core.store().rooms_with_member(user_id).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Disconnect fan-out aborted");
                return;
            }
        };

        info!(user = %user_id, rooms = rooms.len(), "Session closed, notifying rooms");
        for room in rooms {
            // One room's failure must not starve the rest.
            let notice = match self
                .core
                .store()
                .append_message(
                    room.id,
                    None,
                    &format!("{} has disconnected", user.display_name),
                    MessageKind::System,
                )
                .await
            {
                Ok(notice) => notice,
                Err(e) => {
                    warn!(room = %room.id, error = %e, "Failed to persist disconnect notice");
                    continue;
                }
            };

            let event = ServerEvent::UserOffline {
                user_id: user_id.as_uuid(),
                display_name: user.display_name.clone(),
                message: message_view(&notice, None),
            };
            self.core.relay.broadcast(room.id, &event, Some(user_id)).await;
        }
    }

    async fn authenticate(&mut self, credential: &str) {
        let user = match self.core.authenticator.authenticate(credential).await {
            Ok(user) => user,
            Err(e) => {
                debug!(connection = %self.connection_id, error = %e, "Authentication failed");
                self.reply(ServerEvent::auth_error(e.to_string()));
                return;
            }
        };

        // Re-authentication rebinds the session; drop the old identity's
        // registration first.
        if let SessionState::Authenticated(previous) = self.state {
            if previous != user.id {
                self.core.registry.unregister(previous, self.connection_id);
            }
        }

        let handle = ConnectionHandle::new(self.connection_id, self.outbound.clone());
        self.core.registry.register(user.id, handle);

        if let Err(e) = self.core.store().set_presence(user.id, true).await {
            warn!(user = %user.id, error = %e, "Failed to persist online presence");
            self.core.registry.unregister(user.id, self.connection_id);
            self.reply(ServerEvent::error(e.to_string()));
            return;
        }

        self.state = SessionState::Authenticated(user.id);
        info!(connection = %self.connection_id, user = %user.id, "Session authenticated");
        self.reply(ServerEvent::Authenticated {
            user_id: user.id.as_uuid(),
            display_name: user.display_name,
        });
    }

    fn reply(&self, event: ServerEvent) {
        // The peer may already be gone; a dropped reply is fine.
        let _ = self.outbound.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, CredentialVerifier};
    use palaver_store::{ChatStore, MemoryStore};
    use uuid::Uuid;

    /// Test verifier: the credential is the user's raw UUID.
    struct RawUuidVerifier;

    impl CredentialVerifier for RawUuidVerifier {
        fn verify(&self, credential: &str) -> Result<UserId, AuthError> {
            Uuid::parse_str(credential)
                .map(UserId::from)
                .map_err(|_| AuthError::InvalidCredential("not a UUID"))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        core: Arc<ChatCore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let core = Arc::new(ChatCore::new(store.clone(), Arc::new(RawUuidVerifier)));
        Fixture { store, core }
    }

    fn session(fx: &Fixture) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(fx.core.clone(), tx), rx)
    }

    async fn authed_session(
        fx: &Fixture,
        user: UserId,
    ) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (mut s, mut rx) = session(fx);
        s.handle(ClientEvent::Authenticate {
            credential: user.to_string(),
        })
        .await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::Authenticated { .. }
        ));
        (s, rx)
    }

    #[tokio::test]
    async fn test_authentication_gate() {
        let fx = fixture();
        let (mut s, mut rx) = session(&fx);

        s.handle(ClientEvent::JoinRoom {
            room_id: Uuid::new_v4(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "Authentication required"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(s.user_id().is_none());
    }

    #[tokio::test]
    async fn test_failed_auth_keeps_connection_open_for_retry() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let (mut s, mut rx) = session(&fx);

        s.handle(ClientEvent::Authenticate {
            credential: "bogus".into(),
        })
        .await;
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::AuthError { .. }));
        assert!(s.user_id().is_none());

        // Retry with a valid credential on the same connection.
        s.handle(ClientEvent::Authenticate {
            credential: alice.id.to_string(),
        })
        .await;
        match rx.try_recv().unwrap() {
            ServerEvent::Authenticated { display_name, .. } => {
                assert_eq!(display_name, "alice");
            }
            other => panic!("expected authenticated, got {other:?}"),
        }
        assert_eq!(s.user_id(), Some(alice.id));
    }

    #[tokio::test]
    async fn test_auth_flips_presence_and_registers() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        assert!(!alice.active);

        let (_s, _rx) = authed_session(&fx, alice.id).await;

        let alice = fx.store.user(alice.id).await.unwrap().unwrap();
        assert!(alice.active);
        assert!(fx.core.registry.is_connected(alice.id));
    }

    #[tokio::test]
    async fn test_unknown_user_credential_rejected() {
        let fx = fixture();
        let (mut s, mut rx) = session(&fx);

        s.handle(ClientEvent::Authenticate {
            credential: Uuid::new_v4().to_string(),
        })
        .await;
        match rx.try_recv().unwrap() {
            ServerEvent::AuthError { message } => assert_eq!(message, "User not found"),
            other => panic!("expected auth_error, got {other:?}"),
        }
    }

    // Scenario: alice creates a room, posts "hi", and receives her own
    // message back through the authoritative broadcast stream.
    #[tokio::test]
    async fn test_sender_sees_own_message_via_broadcast() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let (mut s, mut rx) = authed_session(&fx, alice.id).await;
        let room = fx.store.create_room("General", alice.id, "").await.unwrap();

        s.handle(ClientEvent::ChatMessage {
            room_id: room.id.as_uuid(),
            content: "hi".into(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerEvent::NewMessage { message, .. } => {
                assert_eq!(message.content, "hi");
                assert_eq!(message.sender_name.as_deref(), Some("alice"));
            }
            other => panic!("expected new_message, got {other:?}"),
        }
    }

    // Scenario: bob joins alice's room; she hears user_joined, he gets the
    // snapshot listing both members.
    #[tokio::test]
    async fn test_join_notification_pair() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let bob = fx.store.create_user("bob").await.unwrap();
        let room = fx.store.create_room("General", alice.id, "").await.unwrap();
        let (_alice_s, mut alice_rx) = authed_session(&fx, alice.id).await;
        let (mut bob_s, mut bob_rx) = authed_session(&fx, bob.id).await;

        bob_s
            .handle(ClientEvent::JoinRoom {
                room_id: room.id.as_uuid(),
            })
            .await;

        match alice_rx.try_recv().unwrap() {
            ServerEvent::UserJoined {
                display_name,
                message,
                ..
            } => {
                assert_eq!(display_name, "bob");
                assert_eq!(message.content, "bob has joined the room");
            }
            other => panic!("expected user_joined, got {other:?}"),
        }
        match bob_rx.try_recv().unwrap() {
            ServerEvent::RoomJoined { users, name, .. } => {
                assert_eq!(name, "General");
                let mut names: Vec<_> = users.iter().map(|u| u.display_name.clone()).collect();
                names.sort();
                assert_eq!(names, ["alice", "bob"]);
            }
            other => panic!("expected room_joined, got {other:?}"),
        }
    }

    // Scenario: bob disconnects while in two rooms; alice shares only one
    // of them and receives exactly one user_offline.
    #[tokio::test]
    async fn test_disconnect_fans_out_once_per_shared_room() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let bob = fx.store.create_user("bob").await.unwrap();
        let r1 = fx.store.create_room("R1", alice.id, "").await.unwrap();
        let r2 = fx.store.create_room("R2", bob.id, "").await.unwrap();
        fx.store.add_member(r1.id, bob.id).await.unwrap();

        let (_alice_s, mut alice_rx) = authed_session(&fx, alice.id).await;
        let (mut bob_s, _bob_rx) = authed_session(&fx, bob.id).await;

        bob_s.close().await;

        let mut offline_events = 0;
        while let Ok(event) = alice_rx.try_recv() {
            match event {
                ServerEvent::UserOffline {
                    display_name,
                    message,
                    ..
                } => {
                    assert_eq!(display_name, "bob");
                    assert_eq!(message.content, "bob has disconnected");
                    assert_eq!(message.room_id, r1.id.as_uuid());
                    offline_events += 1;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(offline_events, 1);

        // Presence flipped, registry cleared, disconnect notices persisted
        // in both rooms bob belonged to.
        let bob_after = fx.store.user(bob.id).await.unwrap().unwrap();
        assert!(!bob_after.active);
        assert!(!fx.core.registry.is_connected(bob.id));
        let r2_log = fx.store.recent_messages(r2.id, 10, 0).await.unwrap();
        assert!(r2_log.iter().any(|m| m.content == "bob has disconnected"));
    }

    // Scenario: blank content is rejected with a validation error and no
    // message row is created.
    #[tokio::test]
    async fn test_blank_chat_message_rejected() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let room = fx.store.create_room("General", alice.id, "").await.unwrap();
        let (mut s, mut rx) = authed_session(&fx, alice.id).await;
        let before = fx.store.recent_messages(room.id, 100, 0).await.unwrap();

        s.handle(ClientEvent::ChatMessage {
            room_id: room.id.as_uuid(),
            content: "   ".into(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "Message cannot be empty"),
            other => panic!("expected error, got {other:?}"),
        }
        let after = fx.store.recent_messages(room.id, 100, 0).await.unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn test_leave_confirms_to_leaver() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let room = fx.store.create_room("General", alice.id, "").await.unwrap();
        let (mut s, mut rx) = authed_session(&fx, alice.id).await;

        s.handle(ClientEvent::LeaveRoom {
            room_id: room.id.as_uuid(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerEvent::RoomLeft { room_id } => assert_eq!(room_id, room.id.as_uuid()),
            other => panic!("expected room_left, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_room_users_reply() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let room = fx.store.create_room("General", alice.id, "").await.unwrap();
        let (mut s, mut rx) = authed_session(&fx, alice.id).await;

        s.handle(ClientEvent::GetRoomUsers {
            room_id: room.id.as_uuid(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerEvent::RoomUsers { users, .. } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].display_name, "alice");
                assert!(users[0].active);
            }
            other => panic!("expected room_users, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let (mut s, mut rx) = authed_session(&fx, alice.id).await;

        s.close().await;
        s.close().await;

        // Events after close are ignored entirely.
        s.handle(ClientEvent::ChatMessage {
            room_id: Uuid::new_v4(),
            content: "hello?".into(),
        })
        .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_login_evicts_first_handle() {
        let fx = fixture();
        let alice = fx.store.create_user("alice").await.unwrap();
        let (mut first, mut first_rx) = authed_session(&fx, alice.id).await;
        let (mut second, mut second_rx) = authed_session(&fx, alice.id).await;

        let room = fx.store.create_room("General", alice.id, "").await.unwrap();
        second
            .handle(ClientEvent::ChatMessage {
                room_id: room.id.as_uuid(),
                content: "still me".into(),
            })
            .await;

        assert!(first_rx.try_recv().is_err());
        assert!(matches!(
            second_rx.try_recv().unwrap(),
            ServerEvent::NewMessage { .. }
        ));

        // The first connection's late close must not evict the second.
        first.close().await;
        assert!(fx.core.registry.is_connected(alice.id));
    }
}
