//! Error taxonomy of the realtime core.
//!
//! Every variant surfaces to the originating caller as an `error` event
//! with no session state change. Store failures inside best-effort fan-out
//! (disconnect notices, typing signals) are logged and skipped instead.

use palaver_store::StoreError;
use thiserror::Error;

/// Errors produced by the room coordinator and message pipeline.
///
/// Display strings double as the user-facing `error` event messages.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The referenced room does not exist.
    #[error("Room not found")]
    RoomNotFound,

    /// The referenced user does not exist.
    #[error("User not found")]
    UserNotFound,

    /// The caller is not a member of the room.
    #[error("You are not in this room")]
    NotAMember,

    /// The message content is blank after trimming.
    #[error("Message cannot be empty")]
    EmptyContent,

    /// The durable store failed; nothing was broadcast.
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}
