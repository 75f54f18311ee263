//! Standard I/O transport for MCP.
//!
//! This transport uses stdin/stdout for communication, which is the standard
//! method for MCP servers that run as subprocesses (e.g., Claude Desktop integration).

use std::io::{Stdin, Stdout};

use async_io::Async;
use futures_lite::io::BufReader;

use super::lines::{LineReader, LineWriter};
use super::traits::Transport;

/// Transport using the hosting process's standard input/output.
///
/// Messages are sent as newline-delimited JSON. Anything else written to
/// stdout corrupts the stream, so log to stderr when serving over stdio.
pub struct StdioTransport {
    reader: LineReader<BufReader<Async<Stdin>>>,
    writer: LineWriter<Async<Stdout>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport").finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Create a new stdio transport.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin/stdout cannot be made async.
    pub fn new() -> std::io::Result<Self> {
        let stdin = Async::new(std::io::stdin())?;
        let stdout = Async::new(std::io::stdout())?;

        Ok(Self {
            reader: LineReader::new(BufReader::new(stdin)),
            writer: LineWriter::new(stdout),
        })
    }
}

impl Transport for StdioTransport {
    type Reader = LineReader<BufReader<Async<Stdin>>>;
    type Writer = LineWriter<Async<Stdout>>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}
