//! # palaver-store
//!
//! Durable-store contract for the Palaver chat backend.
//!
//! The realtime core consumes storage only through the [`ChatStore`]
//! trait: single-record CRUD over users, rooms, and messages, plus the
//! membership and history queries the coordinator needs. [`MemoryStore`]
//! is the in-process reference implementation used by the server binary
//! and the test suites; a SQL- or document-backed implementation plugs in
//! behind the same trait.

pub mod entities;
pub mod error;
pub mod memory;

use async_trait::async_trait;

pub use entities::{Message, MessageId, MessageKind, Room, RoomId, User, UserId};
pub use error::StoreError;
pub use memory::MemoryStore;

/// Storage contract consumed by the realtime core.
///
/// Implementations must provide strong single-record consistency: a read
/// issued after a completed write observes that write.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a user with a unique display name.
    ///
    /// New users start inactive; presence flips on authentication.
    async fn create_user(&self, display_name: &str) -> Result<User, StoreError>;

    /// Look up a user by id.
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Look up several users by id. Unknown ids are skipped.
    async fn users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    /// Set a user's presence flag and refresh their last-active timestamp.
    async fn set_presence(&self, id: UserId, active: bool) -> Result<(), StoreError>;

    /// Create a room. The creator becomes the sole member and a system
    /// message recording the creation is appended.
    async fn create_room(
        &self,
        name: &str,
        creator: UserId,
        description: &str,
    ) -> Result<Room, StoreError>;

    /// Look up a room by id.
    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;

    /// Add a user to a room's membership set.
    ///
    /// Returns `false` when the user was already a member; the set never
    /// holds duplicates.
    async fn add_member(&self, room: RoomId, user: UserId) -> Result<bool, StoreError>;

    /// Remove a user from a room's membership set.
    ///
    /// Returns `None` when the user was not a member, otherwise the number
    /// of members remaining.
    async fn remove_member(&self, room: RoomId, user: UserId)
        -> Result<Option<usize>, StoreError>;

    /// Set a room's active flag.
    async fn set_room_active(&self, room: RoomId, active: bool) -> Result<(), StoreError>;

    /// All rooms the user is currently a member of.
    async fn rooms_with_member(&self, user: UserId) -> Result<Vec<Room>, StoreError>;

    /// Persist a message. The store assigns the id and a timestamp that is
    /// non-decreasing within the room.
    async fn append_message(
        &self,
        room: RoomId,
        sender: Option<UserId>,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, StoreError>;

    /// Messages of a room sorted timestamp-descending, with limit/offset.
    async fn recent_messages(
        &self,
        room: RoomId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError>;
}
