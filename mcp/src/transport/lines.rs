//! Newline-delimited JSON framing over any async byte stream.

use async_lock::Mutex;
use futures_lite::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::traits::{FrameReader, FrameWriter, Result};
use crate::protocol::{JsonRpcMessage, McpError};

/// Reads one JSON-RPC message per line.
///
/// Blank lines are skipped; end of stream is reported as `None`. A line that
/// is not valid JSON, including one that is not even UTF-8, is reported as
/// [`McpError::Serialization`] and the reader moves on to the next line.
pub struct LineReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R> std::fmt::Debug for LineReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader").finish_non_exhaustive()
    }
}

impl<R> LineReader<R> {
    /// Wrap a buffered reader.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> FrameReader for LineReader<R> {
    async fn recv(&mut self) -> Result<Option<JsonRpcMessage>> {
        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(None);
            }

            let frame = self.line.trim_ascii();
            if frame.is_empty() {
                continue;
            }
            debug!("MCP RX: {}", String::from_utf8_lossy(frame));
            return serde_json::from_slice(frame)
                .map(Some)
                .map_err(McpError::Serialization);
        }
    }
}

/// Writes one JSON-RPC message per line.
///
/// Concurrent senders are serialized by an async mutex held for the whole
/// frame, so two frames never interleave.
pub struct LineWriter<W> {
    inner: Mutex<Option<W>>,
}

impl<W> std::fmt::Debug for LineWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineWriter").finish_non_exhaustive()
    }
}

impl<W> LineWriter<W> {
    /// Wrap a writer.
    pub const fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(Some(inner)),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> FrameWriter for LineWriter<W> {
    async fn send(&self, message: &JsonRpcMessage) -> Result<()> {
        let mut frame = serde_json::to_string(message)?;
        debug!("MCP TX: {}", frame);
        frame.push('\n');

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(McpError::ConnectionClosed)?;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let writer = self.inner.lock().await.take();
        if let Some(mut writer) = writer {
            writer.close().await?;
        }
        Ok(())
    }
}
