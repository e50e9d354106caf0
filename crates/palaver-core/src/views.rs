//! Conversions from store entities to wire views.

use palaver_protocol::{MemberInfo, MessageView};
use palaver_store::{Message, MessageKind, User};

/// Build the wire view of a message, attaching the sender's display name
/// when the caller has resolved it.
#[must_use]
pub fn message_view(message: &Message, sender_name: Option<String>) -> MessageView {
    MessageView {
        id: message.id.as_uuid(),
        room_id: message.room_id.as_uuid(),
        sender_id: message.sender.map(|s| s.as_uuid()),
        sender_name,
        kind: match message.kind {
            MessageKind::Text => palaver_protocol::MessageKind::Text,
            MessageKind::System => palaver_protocol::MessageKind::System,
        },
        content: message.content.clone(),
        timestamp: message.timestamp,
    }
}

/// Build the wire view of a room member.
#[must_use]
pub fn member_info(user: &User) -> MemberInfo {
    MemberInfo {
        id: user.id.as_uuid(),
        display_name: user.display_name.clone(),
        active: user.active,
        last_active: user.last_active,
    }
}
