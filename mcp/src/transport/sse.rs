//! HTTP event-stream transport for MCP (experimental).
//!
//! Inbound frames arrive on a long-lived `GET` as server-sent events, one JSON
//! message per `message` event. Outbound frames are sent as individual `POST`
//! bodies. Servers may announce the POST target with an `endpoint` event;
//! until they do, frames are posted to the stream URL itself.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_io::Timer;
use futures_lite::{Stream, StreamExt, future};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::debug;

use super::traits::{FrameReader, FrameWriter, Result, Transport};
use crate::protocol::{JsonRpcMessage, McpError};

/// How long [`SseTransport::connect`] waits for an `endpoint` event.
const ENDPOINT_WAIT: Duration = Duration::from_secs(2);

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Transport over an HTTP event stream.
///
/// Requires a Tokio runtime, as the HTTP client does.
pub struct SseTransport {
    reader: SseReader,
    writer: SseWriter,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("endpoint", &self.writer.endpoint())
            .finish_non_exhaustive()
    }
}

impl SseTransport {
    /// Open the event stream at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the stream cannot be opened.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Client::new(), url).await
    }

    /// Open the event stream at `url` using a preconfigured HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the stream cannot be opened.
    pub async fn connect_with(client: Client, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| McpError::InvalidConfig(format!("Invalid MCP server URL `{url}`: {e}")))?;

        debug!("Opening MCP event stream: {url}");
        let response = client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let endpoint = Arc::new(RwLock::new(url.clone()));
        let mut reader = SseReader {
            stream: Box::pin(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| bytes.to_vec())),
            ),
            decoder: SseDecoder::default(),
            base: url,
            endpoint: Arc::clone(&endpoint),
            stashed: VecDeque::new(),
        };

        future::or(reader.prime(), async {
            Timer::after(ENDPOINT_WAIT).await;
            debug!("No endpoint announced, posting to the stream URL");
            Ok(())
        })
        .await?;

        Ok(Self {
            reader,
            writer: SseWriter {
                client,
                endpoint,
                closed: AtomicBool::new(false),
            },
        })
    }
}

impl Transport for SseTransport {
    type Reader = SseReader;
    type Writer = SseWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

/// Receiving half of an [`SseTransport`].
pub struct SseReader {
    stream: ByteStream,
    decoder: SseDecoder,
    base: Url,
    endpoint: Arc<RwLock<Url>>,
    stashed: VecDeque<String>,
}

impl std::fmt::Debug for SseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseReader")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl SseReader {
    /// Reads until the endpoint is known or the first message arrives.
    async fn prime(&mut self) -> Result<()> {
        loop {
            while let Some(event) = self.decoder.next_event() {
                if self.absorb(event)? {
                    return Ok(());
                }
            }
            if !self.fill().await? {
                return Err(McpError::ConnectionClosed);
            }
        }
    }

    /// Routes one event. Returns whether it was an endpoint or a message.
    fn absorb(&mut self, event: SseEvent) -> Result<bool> {
        match event.event.as_str() {
            "endpoint" => {
                let target = self.base.join(event.data.trim()).map_err(|e| {
                    McpError::Transport(format!("Invalid endpoint `{}`: {e}", event.data))
                })?;
                debug!("MCP endpoint: {target}");
                *self
                    .endpoint
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = target;
                Ok(true)
            }
            "message" => {
                self.stashed.push_back(event.data);
                Ok(true)
            }
            other => {
                debug!("Ignoring event `{other}`");
                Ok(false)
            }
        }
    }

    /// Pulls one chunk off the wire. Returns `false` at end of stream.
    async fn fill(&mut self) -> Result<bool> {
        match self.stream.next().await {
            Some(Ok(chunk)) => {
                self.decoder.feed(&chunk);
                Ok(true)
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(false),
        }
    }
}

impl FrameReader for SseReader {
    async fn recv(&mut self) -> Result<Option<JsonRpcMessage>> {
        loop {
            if let Some(frame) = self.stashed.pop_front() {
                debug!("MCP RX: {}", frame);
                return serde_json::from_str(&frame)
                    .map(Some)
                    .map_err(McpError::Serialization);
            }
            if let Some(event) = self.decoder.next_event() {
                self.absorb(event)?;
                continue;
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }
}

/// Sending half of an [`SseTransport`].
#[derive(Debug)]
pub struct SseWriter {
    client: Client,
    endpoint: Arc<RwLock<Url>>,
    closed: AtomicBool,
}

impl SseWriter {
    /// Current POST target.
    #[must_use]
    pub fn endpoint(&self) -> Url {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FrameWriter for SseWriter {
    async fn send(&self, message: &JsonRpcMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::ConnectionClosed);
        }

        let frame = serde_json::to_string(message)?;
        debug!("MCP TX: {}", frame);
        self.client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(frame)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn next_event(&mut self) -> Option<SseEvent> {
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    return Some(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').map_or((&*line, ""), |(f, v)| {
                (f, v.strip_prefix(' ').unwrap_or(v))
            });
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
