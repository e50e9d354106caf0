//! Persistent entities for the Palaver chat backend.
//!
//! Users, rooms, and messages outlive any connection. Ids are UUID
//! newtypes so membership checks and registry lookups always compare the
//! same canonical representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Identifier of a user.
    UserId
);
entity_id!(
    /// Identifier of a room.
    RoomId
);
entity_id!(
    /// Identifier of a message.
    MessageId
);

/// A registered user.
///
/// The presence flag is the only field the realtime core mutates: it flips
/// to active on authentication and to inactive on disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Unique display name.
    pub display_name: String,
    /// Whether the user currently has a live connection.
    pub active: bool,
    /// Last activity timestamp.
    pub last_active: DateTime<Utc>,
}

/// A named room scoping message visibility and broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Room name.
    pub name: String,
    /// The user who created the room.
    pub creator: UserId,
    /// Free-form description.
    pub description: String,
    /// Member user ids. Set-typed, so duplicates cannot exist.
    pub members: HashSet<UserId>,
    /// Cleared when a leave empties the membership. Inactive rooms remain
    /// joinable.
    pub active: bool,
}

impl Room {
    /// Check whether a user is a member of this room.
    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }
}

/// The kind of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Authored by a user.
    Text,
    /// Generated by the server to narrate membership and lifecycle events.
    System,
}

/// A persisted chat or system message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Room this message belongs to.
    pub room_id: RoomId,
    /// Sender, absent for pure system messages.
    pub sender: Option<UserId>,
    /// Message content.
    pub content: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Assigned at persistence time, non-decreasing per room.
    pub timestamp: DateTime<Utc>,
}
