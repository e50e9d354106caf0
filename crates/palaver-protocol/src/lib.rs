//! # palaver-protocol
//!
//! Wire protocol definitions for the Palaver chat backend.
//!
//! The protocol is JSON over WebSocket text frames: each frame carries one
//! event, discriminated by a `"type"` tag. Inbound events are the session
//! commands a client may issue (`authenticate`, `join_room`, ...); outbound
//! events are the replies and room fan-out a client observes
//! (`authenticated`, `new_message`, `user_offline`, ...).

pub mod codec;
pub mod events;

pub use codec::{decode_event, encode_event, ProtocolError};
pub use events::{ClientEvent, MemberInfo, MessageKind, MessageView, ServerEvent};
