//! Child process transport for MCP.
//!
//! This transport spawns a subprocess and communicates with it via stdio pipes.

use std::ffi::OsStr;

use async_lock::Mutex;
use async_process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use futures_lite::io::BufReader;
use tracing::debug;

use super::lines::{LineReader, LineWriter};
use super::traits::{FrameWriter, Result, Transport};
use crate::protocol::{JsonRpcMessage, McpError};

/// Transport that spawns and communicates with a child process.
///
/// This is typically used to connect to MCP servers that run as separate processes,
/// such as npm packages or standalone binaries. The child's stderr is inherited.
pub struct ChildProcessTransport {
    reader: LineReader<BufReader<ChildStdout>>,
    writer: ChildWriter,
}

impl std::fmt::Debug for ChildProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessTransport").finish_non_exhaustive()
    }
}

impl ChildProcessTransport {
    /// Spawn a new child process transport.
    ///
    /// # Arguments
    ///
    /// * `program` - The program to execute.
    /// * `args` - Arguments to pass to the program.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn spawn(program: &str, args: &[&str]) -> Result<Self> {
        Self::spawn_with_env(program, args, std::iter::empty::<(&str, &str)>())
    }

    /// Spawn a child process with extra environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn spawn_with_env<A, K, V>(
        program: &str,
        args: &[A],
        env: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        A: AsRef<OsStr>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        debug!(
            "Spawning MCP server: {} {:?}",
            program,
            args.iter()
                .map(|arg| -> &OsStr { arg.as_ref() })
                .collect::<Vec<_>>()
        );

        let child = Command::new(program)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        Self::from_child(child)
    }

    /// Create a transport from an existing child process.
    ///
    /// # Arguments
    ///
    /// * `child` - Child process with stdin/stdout captured.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin/stdout are not available.
    pub fn from_child(mut child: Child) -> Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("Child process stdin not available".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("Child process stdout not available".to_string()))?;

        Ok(Self {
            reader: LineReader::new(BufReader::new(stdout)),
            writer: ChildWriter {
                lines: LineWriter::new(stdin),
                child: Mutex::new(Some(child)),
            },
        })
    }
}

impl Transport for ChildProcessTransport {
    type Reader = LineReader<BufReader<ChildStdout>>;
    type Writer = ChildWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

/// Writes to the child's stdin; closing it also terminates the child.
pub struct ChildWriter {
    lines: LineWriter<ChildStdin>,
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for ChildWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildWriter").finish_non_exhaustive()
    }
}

impl FrameWriter for ChildWriter {
    async fn send(&self, message: &JsonRpcMessage) -> Result<()> {
        self.lines.send(message).await
    }

    async fn close(&self) -> Result<()> {
        let closed = self.lines.close().await;
        if let Some(mut child) = self.child.lock().await.take() {
            // The child may already have exited on its own.
            let _ = child.kill();
            let status = child.status().await?;
            debug!("MCP server process exited: {status}");
        }
        closed
    }
}
