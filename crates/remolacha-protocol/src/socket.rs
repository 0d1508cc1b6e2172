//! Physical socket abstraction.
//!
//! A [`PhysicalSocket`] is an ordered, message-oriented duplex channel of
//! [`Frame`]s. The multiplexing layers above only see this type, so the same
//! code runs over a WebSocket in production and over an in-memory pair in
//! tests.

use std::pin::Pin;

use futures_util::future;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::codec::{decode_frame, encode_frame};
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;

/// Write half of a physical socket.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ProtocolError> + Send>>;

/// Read half of a physical socket. Ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = ProtocolResult<Frame>> + Send>>;

/// One established physical connection.
pub struct PhysicalSocket {
    sink: FrameSink,
    stream: FrameStream,
}

impl PhysicalSocket {
    /// Wraps an arbitrary sink/stream pair.
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }

    /// Adapts a WebSocket: one text message per frame.
    ///
    /// Binary messages are decoded the same way; ping/pong and close control
    /// messages are left to tungstenite.
    pub fn from_websocket<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(ProtocolError::from)
            .with(|frame: Frame| future::ready(encode_frame(&frame).map(Message::text)));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(decode_frame(text.as_bytes())),
                Ok(Message::Binary(bytes)) => Some(decode_frame(&bytes)),
                Ok(_) => None,
                Err(error) => Some(Err(ProtocolError::from(error))),
            })
        });

        Self::new(Box::pin(sink), Box::pin(stream))
    }

    /// Two connected in-memory sockets. Frames go through the JSON codec so
    /// the wire format is exercised. Dropping one end ends the other's stream.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::memory(a_tx, b_rx), Self::memory(b_tx, a_rx))
    }

    fn memory(tx: mpsc::UnboundedSender<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        let sink = futures_util::sink::unfold(tx, |tx, frame: Frame| async move {
            let text = encode_frame(&frame)?;
            tx.send(text).map_err(|_| ProtocolError::SocketClosed)?;
            Ok::<_, ProtocolError>(tx)
        });

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            let text = rx.recv().await?;
            Some((decode_frame(text.as_bytes()), rx))
        });

        Self::new(Box::pin(sink), Box::pin(stream))
    }

    /// Splits into the write and read halves.
    pub fn split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl std::fmt::Debug for PhysicalSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalSocket").finish_non_exhaustive()
    }
}
