//! In-memory reference implementation of [`ChatStore`].
//!
//! Backed by lock-free maps so many sessions can hit it concurrently.
//! Used by the server binary and by the core test suites.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

use crate::entities::{Message, MessageId, MessageKind, Room, RoomId, User, UserId};
use crate::error::StoreError;
use crate::ChatStore;

/// DashMap-backed store with process lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    /// Display-name uniqueness index.
    names: DashMap<String, UserId>,
    rooms: DashMap<RoomId, Room>,
    /// Messages per room in persistence order (timestamps non-decreasing).
    messages: DashMap<RoomId, Vec<Message>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_message(
        &self,
        room: RoomId,
        sender: Option<UserId>,
        content: &str,
        kind: MessageKind,
    ) -> Message {
        let mut log = self.messages.entry(room).or_default();

        // Timestamps are assigned here and clamped so they never decrease
        // within a room, even if the wall clock steps backwards.
        let mut timestamp = Utc::now();
        if let Some(last) = log.last() {
            if timestamp < last.timestamp {
                timestamp = last.timestamp;
            }
        }

        let message = Message {
            id: MessageId::generate(),
            room_id: room,
            sender,
            content: content.to_string(),
            kind,
            timestamp,
        };
        log.push(message.clone());
        message
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_user(&self, display_name: &str) -> Result<User, StoreError> {
        let user = User {
            id: UserId::generate(),
            display_name: display_name.to_string(),
            active: false,
            last_active: Utc::now(),
        };

        match self.names.entry(display_name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::DisplayNameTaken(display_name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        self.users.insert(user.id, user.clone());
        debug!(user = %user.id, name = %user.display_name, "Created user");
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.clone()))
            .collect())
    }

    async fn set_presence(&self, id: UserId, active: bool) -> Result<(), StoreError> {
        let mut user = self.users.get_mut(&id).ok_or(StoreError::UserNotFound(id))?;
        user.active = active;
        user.last_active = Utc::now();
        Ok(())
    }

    async fn create_room(
        &self,
        name: &str,
        creator: UserId,
        description: &str,
    ) -> Result<Room, StoreError> {
        if !self.users.contains_key(&creator) {
            return Err(StoreError::UserNotFound(creator));
        }

        let mut members = HashSet::new();
        members.insert(creator);

        let room = Room {
            id: RoomId::generate(),
            name: name.to_string(),
            creator,
            description: description.to_string(),
            members,
            active: true,
        };
        self.rooms.insert(room.id, room.clone());
        self.push_message(
            room.id,
            None,
            &format!("Room \"{name}\" was created"),
            MessageKind::System,
        );

        debug!(room = %room.id, name = %room.name, "Created room");
        Ok(room)
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(&id).map(|r| r.clone()))
    }

    async fn add_member(&self, room: RoomId, user: UserId) -> Result<bool, StoreError> {
        let mut entry = self
            .rooms
            .get_mut(&room)
            .ok_or(StoreError::RoomNotFound(room))?;
        Ok(entry.members.insert(user))
    }

    async fn remove_member(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<Option<usize>, StoreError> {
        let mut entry = self
            .rooms
            .get_mut(&room)
            .ok_or(StoreError::RoomNotFound(room))?;
        if entry.members.remove(&user) {
            Ok(Some(entry.members.len()))
        } else {
            Ok(None)
        }
    }

    async fn set_room_active(&self, room: RoomId, active: bool) -> Result<(), StoreError> {
        let mut entry = self
            .rooms
            .get_mut(&room)
            .ok_or(StoreError::RoomNotFound(room))?;
        entry.active = active;
        Ok(())
    }

    async fn rooms_with_member(&self, user: UserId) -> Result<Vec<Room>, StoreError> {
        Ok(self
            .rooms
            .iter()
            .filter(|r| r.members.contains(&user))
            .map(|r| r.clone())
            .collect())
    }

    async fn append_message(
        &self,
        room: RoomId,
        sender: Option<UserId>,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, StoreError> {
        if !self.rooms.contains_key(&room) {
            return Err(StoreError::RoomNotFound(room));
        }
        Ok(self.push_message(room, sender, content, kind))
    }

    async fn recent_messages(
        &self,
        room: RoomId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .get(&room)
            .map(|log| {
                log.iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_display_name_uniqueness() {
        let store = MemoryStore::new();
        store.create_user("alice").await.unwrap();
        assert!(matches!(
            store.create_user("alice").await,
            Err(StoreError::DisplayNameTaken(_))
        ));
    }

    #[tokio::test]
    async fn test_membership_never_duplicates() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice").await.unwrap();
        let bob = store.create_user("bob").await.unwrap();
        let room = store.create_room("General", alice.id, "").await.unwrap();

        assert!(store.add_member(room.id, bob.id).await.unwrap());
        assert!(!store.add_member(room.id, bob.id).await.unwrap());

        let room = store.room(room.id).await.unwrap().unwrap();
        assert_eq!(room.members.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_member_reports_remaining() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice").await.unwrap();
        let room = store.create_room("General", alice.id, "").await.unwrap();

        assert_eq!(
            store.remove_member(room.id, alice.id).await.unwrap(),
            Some(0)
        );
        // Not a member anymore
        assert_eq!(store.remove_member(room.id, alice.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_message_timestamps_non_decreasing() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice").await.unwrap();
        let room = store.create_room("General", alice.id, "").await.unwrap();

        for i in 0..10 {
            store
                .append_message(room.id, Some(alice.id), &format!("m{i}"), MessageKind::Text)
                .await
                .unwrap();
        }

        let log = store.recent_messages(room.id, 100, 0).await.unwrap();
        for pair in log.windows(2) {
            // Descending order means each timestamp >= the next one.
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_recent_messages_limit_offset() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice").await.unwrap();
        let room = store.create_room("General", alice.id, "").await.unwrap();

        for i in 0..5 {
            store
                .append_message(room.id, Some(alice.id), &format!("m{i}"), MessageKind::Text)
                .await
                .unwrap();
        }

        // 5 text messages plus the creation system message.
        let newest = store.recent_messages(room.id, 2, 0).await.unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].content, "m4");
        assert_eq!(newest[1].content, "m3");

        let older = store.recent_messages(room.id, 2, 2).await.unwrap();
        assert_eq!(older[0].content, "m2");
    }

    #[tokio::test]
    async fn test_rooms_with_member() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice").await.unwrap();
        let bob = store.create_user("bob").await.unwrap();
        let r1 = store.create_room("R1", alice.id, "").await.unwrap();
        let _r2 = store.create_room("R2", bob.id, "").await.unwrap();
        store.add_member(r1.id, bob.id).await.unwrap();

        let rooms = store.rooms_with_member(alice.id).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, r1.id);

        let rooms = store.rooms_with_member(bob.id).await.unwrap();
        assert_eq!(rooms.len(), 2);
    }
}
