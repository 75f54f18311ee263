//! Transport trait definitions.

use std::future::Future;

use crate::protocol::{JsonRpcMessage, McpError};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Receiving half of a transport.
///
/// Owned by exactly one read loop; `recv` takes `&mut self` so a reader can
/// never be polled from two places at once.
pub trait FrameReader: Send + 'static {
    /// Receive the next inbound frame.
    ///
    /// Returns `Ok(None)` once the peer closed the stream. A frame that is not
    /// valid JSON-RPC yields [`McpError::Serialization`]; the reader stays
    /// usable and the caller may keep reading.
    fn recv(&mut self) -> impl Future<Output = Result<Option<JsonRpcMessage>>> + Send;
}

/// Sending half of a transport.
///
/// Shared between every task that answers or issues requests, so `send`
/// takes `&self` and must write each frame atomically with respect to other
/// senders.
pub trait FrameWriter: Send + Sync + 'static {
    /// Send one complete frame.
    fn send(&self, message: &JsonRpcMessage) -> impl Future<Output = Result<()>> + Send;

    /// Close the outbound direction. Later sends fail with
    /// [`McpError::ConnectionClosed`].
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A duplex framed channel that splits into one reader and one writer.
pub trait Transport: Send + 'static {
    /// Receiving half.
    type Reader: FrameReader;
    /// Sending half.
    type Writer: FrameWriter;

    /// Split into the receiving and sending halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
