//! Wire protocol for multiplexing logical connections over one socket.
//!
//! A client keeps exactly one persistent, message-oriented socket to the
//! server. Every message on it is a JSON [`Frame`] tagged with an action and
//! a connection ID, so any number of independent exchanges can share the
//! socket:
//!
//! ```text
//! open  -> data* -> close      (happy path)
//! open  -> error -> close      (routing or handler failure)
//! ```
//!
//! # Example
//!
//! ```rust
//! use remolacha_protocol::{ConnectionId, Frame, decode_frame, encode_frame};
//! use serde_json::json;
//!
//! let frame = Frame::open(ConnectionId::from(0), "remolacha.Files", "readDirectory", json!({"path": "/tmp"}));
//! let text = encode_frame(&frame).unwrap();
//! assert_eq!(decode_frame(text.as_bytes()).unwrap(), frame);
//! ```

mod codec;
mod connection;
mod error;
mod frame;
pub mod socket;

pub use codec::{decode_frame, encode_frame};
pub use connection::{ConnectionEvent, ConnectionState, EventStream, Subscribers};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{ConnectionId, Frame};
pub use socket::{FrameSink, FrameStream, PhysicalSocket};

/// Maximum encoded frame size (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
