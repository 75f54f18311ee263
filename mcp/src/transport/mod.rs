//! Transport layer for MCP communication.
//!
//! A [`Transport`] splits into one [`FrameReader`], consumed by a single read
//! loop, and one [`FrameWriter`], shared by every task that needs to send.
//!
//! | Transport | Framing |
//! |-----------|---------|
//! | [`StdioTransport`] | newline-delimited JSON on this process's stdin/stdout |
//! | [`ChildProcessTransport`] | newline-delimited JSON on a spawned process's pipes |
//! | [`SseTransport`] | server-sent events in, one `POST` per frame out (experimental) |
//! | [`MemoryTransport`] | in-process channel pair |

mod child;
mod lines;
mod memory;
mod sse;
mod stdio;
mod traits;

pub use child::{ChildProcessTransport, ChildWriter};
pub use lines::{LineReader, LineWriter};
pub use memory::{MemoryReader, MemoryTransport, MemoryWriter};
pub use sse::{SseReader, SseTransport, SseWriter};
pub use stdio::StdioTransport;
pub use traits::{FrameReader, FrameWriter, Result, Transport};
