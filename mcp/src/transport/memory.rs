//! In-process transport pair.
//!
//! Frames still travel as serialized JSON text, so both ends exercise the same
//! encode/decode path as a real pipe.

use async_channel::{Receiver, Sender};
use tracing::debug;

use super::traits::{FrameReader, FrameWriter, Result, Transport};
use crate::protocol::{JsonRpcMessage, McpError};

/// One end of an in-memory duplex channel.
#[derive(Debug)]
pub struct MemoryTransport {
    reader: MemoryReader,
    writer: MemoryWriter,
}

impl MemoryTransport {
    /// Create two connected ends; what one writes, the other reads.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (left_tx, left_rx) = async_channel::unbounded();
        let (right_tx, right_rx) = async_channel::unbounded();
        (
            Self {
                reader: MemoryReader { frames: right_rx },
                writer: MemoryWriter { frames: left_tx },
            },
            Self {
                reader: MemoryReader { frames: left_rx },
                writer: MemoryWriter { frames: right_tx },
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

/// Receiving half of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryReader {
    frames: Receiver<String>,
}

impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<JsonRpcMessage>> {
        let Ok(frame) = self.frames.recv().await else {
            return Ok(None);
        };
        debug!("MCP RX: {}", frame);
        serde_json::from_str(&frame)
            .map(Some)
            .map_err(McpError::Serialization)
    }
}

/// Sending half of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryWriter {
    frames: Sender<String>,
}

impl MemoryWriter {
    /// Send a frame verbatim, bypassing serialization.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ConnectionClosed`] if either end was closed.
    pub async fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        self.frames
            .send(frame.into())
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }
}

impl FrameWriter for MemoryWriter {
    async fn send(&self, message: &JsonRpcMessage) -> Result<()> {
        let frame = serde_json::to_string(message)?;
        debug!("MCP TX: {}", frame);
        self.send_raw(frame).await
    }

    async fn close(&self) -> Result<()> {
        self.frames.close();
        Ok(())
    }
}
