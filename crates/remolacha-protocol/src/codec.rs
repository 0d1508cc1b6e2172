//! JSON text codec for frames.
//!
//! The physical socket is message oriented, so a frame needs no length
//! prefix: one socket message carries exactly one JSON-encoded [`Frame`].

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;

/// Encodes a frame as a JSON text message.
///
/// # Example
///
/// ```rust
/// use remolacha_protocol::{ConnectionId, Frame, encode_frame};
///
/// let text = encode_frame(&Frame::close(ConnectionId::from(3))).unwrap();
/// assert_eq!(text, r#"{"action":"close","connectionId":"3"}"#);
/// ```
pub fn encode_frame(frame: &Frame) -> ProtocolResult<String> {
    let json = serde_json::to_string(frame)?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    Ok(json)
}

/// Decodes one socket message into a frame.
pub fn decode_frame(data: &[u8]) -> ProtocolResult<Frame> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }

    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    Ok(serde_json::from_slice(data)?)
}
