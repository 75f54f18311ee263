//! MCP server implementation.
//!
//! The server reads requests from a transport, dispatches them against a
//! capability catalog and writes the responses back.

#[allow(clippy::module_inception)]
mod server;

pub use server::McpServer;
