//! Message pipeline: validate, persist, then republish.
//!
//! Persist-before-broadcast is mandatory: a message that failed to persist
//! is never broadcast, and the failure propagates to the sender instead of
//! being swallowed.

use palaver_protocol::{MessageView, ServerEvent};
use palaver_store::{ChatStore, MessageKind, RoomId, UserId};
use std::sync::Arc;
use tracing::debug;

use crate::error::ChatError;
use crate::relay::BroadcastRelay;
use crate::views::message_view;

/// Accepts chat messages from sessions and fans them out.
pub struct MessagePipeline {
    store: Arc<dyn ChatStore>,
    relay: Arc<BroadcastRelay>,
}

impl MessagePipeline {
    /// Create a pipeline over the given store and relay.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, relay: Arc<BroadcastRelay>) -> Self {
        Self { store, relay }
    }

    /// Post a text message to a room.
    ///
    /// On success the persisted message is broadcast as `new_message` to
    /// every member including the sender, so all clients render from one
    /// authoritative stream.
    ///
    /// # Errors
    ///
    /// `EmptyContent` for blank content, `RoomNotFound`, `NotAMember`,
    /// or a store failure (in which case nothing was broadcast).
    pub async fn post(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: &str,
    ) -> Result<MessageView, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }

        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        if !room.is_member(sender_id) {
            return Err(ChatError::NotAMember);
        }
        let sender = self
            .store
            .user(sender_id)
            .await?
            .ok_or(ChatError::UserNotFound)?;

        let message = self
            .store
            .append_message(room_id, Some(sender_id), content, MessageKind::Text)
            .await?;

        let view = message_view(&message, Some(sender.display_name));
        debug!(room = %room_id, sender = %sender_id, message = %message.id, "Message persisted");

        let event = ServerEvent::NewMessage {
            message: view.clone(),
            room_id: room_id.as_uuid(),
        };
        self.relay.broadcast(room_id, &event, None).await;

        Ok(view)
    }
}
