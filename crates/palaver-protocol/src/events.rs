//! Event types for the Palaver wire protocol.
//!
//! Events are the messages exchanged between clients and the server.
//! Each event carries a `"type"` tag on the wire and the fields relevant
//! to its operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A message authored by a user.
    Text,
    /// A message generated by the server to narrate room lifecycle events.
    System,
}

/// A message as delivered to clients.
///
/// Sender fields are absent for system messages that have no human sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    /// Message identifier.
    pub id: Uuid,
    /// Room this message belongs to.
    pub room_id: Uuid,
    /// Sender's user id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,
    /// Sender's display name, resolved at delivery time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Message kind.
    pub kind: MessageKind,
    /// Message content.
    pub content: String,
    /// Timestamp assigned at persistence time.
    pub timestamp: DateTime<Utc>,
}

/// A room member as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// User identifier.
    pub id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Whether the user currently has a live connection.
    pub active: bool,
    /// Last activity timestamp.
    pub last_active: DateTime<Utc>,
}

/// An event sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Present a bearer credential for this connection.
    Authenticate { credential: String },
    /// Join a room (idempotent for existing members).
    JoinRoom { room_id: Uuid },
    /// Leave a room.
    LeaveRoom { room_id: Uuid },
    /// Post a chat message to a room.
    ChatMessage { room_id: Uuid, content: String },
    /// Request the member list of a room.
    GetRoomUsers { room_id: Uuid },
    /// Ephemeral typing indicator, best-effort.
    TypingStatus { room_id: Uuid, is_typing: bool },
}

/// An event sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authentication succeeded.
    Authenticated {
        user_id: Uuid,
        display_name: String,
    },
    /// Authentication failed; the connection stays open.
    AuthError { message: String },
    /// A request failed; session state is unchanged.
    Error { message: String },
    /// Snapshot of a room, sent to the caller of a join.
    RoomJoined {
        room_id: Uuid,
        name: String,
        description: String,
        /// Recent messages in chronological order.
        messages: Vec<MessageView>,
        users: Vec<MemberInfo>,
    },
    /// Confirmation of a leave, sent to the leaver.
    RoomLeft { room_id: Uuid },
    /// Another user joined a room you are in.
    UserJoined {
        user_id: Uuid,
        display_name: String,
        message: MessageView,
    },
    /// Another user left a room you are in.
    UserLeft {
        user_id: Uuid,
        display_name: String,
        message: MessageView,
    },
    /// Another user's connection closed.
    UserOffline {
        user_id: Uuid,
        display_name: String,
        message: MessageView,
    },
    /// A new message was posted to a room you are in.
    NewMessage { message: MessageView, room_id: Uuid },
    /// Member list of a room, sent on request.
    RoomUsers {
        room_id: Uuid,
        users: Vec<MemberInfo>,
    },
    /// Another member's typing indicator changed.
    TypingStatus {
        user_id: Uuid,
        display_name: String,
        is_typing: bool,
    },
}

impl ServerEvent {
    /// Create an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Create an `AuthError` event.
    #[must_use]
    pub fn auth_error(message: impl Into<String>) -> Self {
        ServerEvent::AuthError {
            message: message.into(),
        }
    }
}
