//! Codec for the Palaver wire protocol.
//!
//! Events travel as JSON text frames, one event per WebSocket message,
//! discriminated by a `"type"` tag.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Protocol errors that can occur while decoding inbound frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object. Such frames are dropped.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The frame is a JSON object but not a recognized event. The session
    /// replies with an error event.
    #[error("Unknown or ill-formed event type: {0}")]
    UnknownEvent(String),
}

/// Encode a server event as a JSON text frame.
///
/// Serialization of a `ServerEvent` cannot fail: every payload field is a
/// plain struct with string keys.
#[must_use]
pub fn encode_event(event: &ServerEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","message":"Internal serialization error"}"#.to_string()
    })
}

/// Decode a client event from a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] when the frame is not a JSON
/// object, and [`ProtocolError::UnknownEvent`] when it is an object but
/// does not deserialize into a known event.
pub fn decode_event(frame: &str) -> Result<ClientEvent, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if !value.is_object() {
        return Err(ProtocolError::Malformed("expected a JSON object".into()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::UnknownEvent(e.to_string()))
}
