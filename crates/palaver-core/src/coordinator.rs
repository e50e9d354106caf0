//! Room coordinator: owns membership transitions and mediates between the
//! store, the registry, and the broadcast relay.
//!
//! Ordering rule for every transition: the membership write and the system
//! message are persisted before anything is broadcast, so a member who
//! queries room state after receiving an event sees consistent data.

use palaver_protocol::{MemberInfo, MessageView, ServerEvent};
use palaver_store::{ChatStore, MessageKind, Room, RoomId, User, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::relay::BroadcastRelay;
use crate::views::{member_info, message_view};

/// Default number of recent messages included in a join snapshot.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Room state returned to the caller of a join.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Room identifier.
    pub room_id: RoomId,
    /// Room name.
    pub name: String,
    /// Room description.
    pub description: String,
    /// Recent messages in chronological order, sender names resolved.
    pub messages: Vec<MessageView>,
    /// Members with presence, resolved at snapshot time.
    pub users: Vec<MemberInfo>,
}

/// Owns join/leave transitions and member queries.
pub struct RoomCoordinator {
    store: Arc<dyn ChatStore>,
    relay: Arc<BroadcastRelay>,
    history_limit: usize,
}

impl RoomCoordinator {
    /// Create a coordinator with the default snapshot history depth.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, relay: Arc<BroadcastRelay>) -> Self {
        Self::with_history_limit(store, relay, DEFAULT_HISTORY_LIMIT)
    }

    /// Create a coordinator with a custom snapshot history depth.
    #[must_use]
    pub fn with_history_limit(
        store: Arc<dyn ChatStore>,
        relay: Arc<BroadcastRelay>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            relay,
            history_limit,
        }
    }

    /// Join a room.
    ///
    /// Re-joining a room the user already belongs to is idempotent: it
    /// returns the current snapshot and emits no `user_joined` event.
    /// Inactive rooms remain joinable.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `UserNotFound`, or a store failure.
    pub async fn join(&self, room_id: RoomId, user_id: UserId) -> Result<RoomSnapshot, ChatError> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or(ChatError::UserNotFound)?;

        if room.is_member(user_id) {
            debug!(room = %room_id, user = %user_id, "Join is idempotent, already a member");
            return self.snapshot(&room).await;
        }

        self.store.add_member(room_id, user_id).await?;
        let notice = self
            .store
            .append_message(
                room_id,
                Some(user_id),
                &format!("{} has joined the room", user.display_name),
                MessageKind::System,
            )
            .await?;

        // Re-read so the snapshot reflects the new membership.
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        let snapshot = self.snapshot(&room).await?;

        info!(room = %room_id, user = %user_id, "User joined room");
        let event = ServerEvent::UserJoined {
            user_id: user_id.as_uuid(),
            display_name: user.display_name.clone(),
            message: message_view(&notice, Some(user.display_name)),
        };
        self.relay.broadcast(room_id, &event, Some(user_id)).await;

        Ok(snapshot)
    }

    /// Leave a room.
    ///
    /// Leaving a room the user is not in is an error, unlike the
    /// idempotent join. When the leave empties the room it is marked
    /// inactive (soft-deleted) but stays joinable.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `UserNotFound`, `NotAMember`, or a store failure.
    pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> Result<(), ChatError> {
        if self.store.room(room_id).await?.is_none() {
            return Err(ChatError::RoomNotFound);
        }
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or(ChatError::UserNotFound)?;

        let remaining = self
            .store
            .remove_member(room_id, user_id)
            .await?
            .ok_or(ChatError::NotAMember)?;

        let notice = self
            .store
            .append_message(
                room_id,
                Some(user_id),
                &format!("{} has left the room", user.display_name),
                MessageKind::System,
            )
            .await?;

        if remaining == 0 {
            self.store.set_room_active(room_id, false).await?;
            debug!(room = %room_id, "Room emptied, marked inactive");
        }

        info!(room = %room_id, user = %user_id, remaining, "User left room");
        let event = ServerEvent::UserLeft {
            user_id: user_id.as_uuid(),
            display_name: user.display_name.clone(),
            message: message_view(&notice, Some(user.display_name)),
        };
        self.relay.broadcast(room_id, &event, Some(user_id)).await;

        Ok(())
    }

    /// Member list of a room, resolved from the store at call time.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `NotAMember`, or a store failure.
    pub async fn members(
        &self,
        room_id: RoomId,
        requester: UserId,
    ) -> Result<Vec<MemberInfo>, ChatError> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        if !room.is_member(requester) {
            return Err(ChatError::NotAMember);
        }
        self.resolve_members(&room).await
    }

    /// Relay a typing indicator to the other members of a room.
    ///
    /// Ephemeral and best-effort: unknown rooms, non-membership, and store
    /// failures all drop the signal silently. Nothing is persisted.
    pub async fn typing(&self, room_id: RoomId, user_id: UserId, is_typing: bool) {
        let Ok(Some(room)) = self.store.room(room_id).await else {
            return;
        };
        if !room.is_member(user_id) {
            return;
        }
        let Ok(Some(user)) = self.store.user(user_id).await else {
            return;
        };

        let event = ServerEvent::TypingStatus {
            user_id: user_id.as_uuid(),
            display_name: user.display_name,
            is_typing,
        };
        self.relay.broadcast(room_id, &event, Some(user_id)).await;
    }

    async fn snapshot(&self, room: &Room) -> Result<RoomSnapshot, ChatError> {
        let mut messages = self
            .store
            .recent_messages(room.id, self.history_limit, 0)
            .await?;
        // The store returns newest-first; clients render chronologically.
        messages.reverse();

        let sender_ids: Vec<UserId> = messages
            .iter()
            .filter_map(|m| m.sender)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let names: HashMap<UserId, String> = self
            .store
            .users(&sender_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.display_name))
            .collect();

        let messages = messages
            .iter()
            .map(|m| message_view(m, m.sender.and_then(|s| names.get(&s).cloned())))
            .collect();

        Ok(RoomSnapshot {
            room_id: room.id,
            name: room.name.clone(),
            description: room.description.clone(),
            messages,
            users: self.resolve_members(room).await?,
        })
    }

    async fn resolve_members(&self, room: &Room) -> Result<Vec<MemberInfo>, ChatError> {
        let ids: Vec<UserId> = room.members.iter().copied().collect();
        let users: Vec<User> = self.store.users(&ids).await?;
        Ok(users.iter().map(member_info).collect())
    }
}
