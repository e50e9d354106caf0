//! Store errors.

use thiserror::Error;

use crate::entities::{RoomId, UserId};

/// Errors surfaced by a [`ChatStore`](crate::ChatStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No user with the given id.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// No room with the given id.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// The display name is already taken.
    #[error("Display name already taken: {0}")]
    DisplayNameTaken(String),

    /// Driver-level failure (connection lost, write rejected, ...).
    #[error("Store backend error: {0}")]
    Backend(String),
}
