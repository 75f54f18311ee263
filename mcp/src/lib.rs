//! # MCP (Model Context Protocol) for capstan
//!
//! This crate carries the capabilities of `capstan-core` over the wire.
//!
//! ## Overview
//!
//! The Model Context Protocol (MCP) is a standard protocol for connecting AI applications
//! with external data sources and tools. This crate implements:
//!
//! - **MCP Server**: serve a [`Catalog`](capstan_core::Catalog) of tools, prompts and
//!   resources to any MCP client
//! - **MCP Client**: connect to MCP servers, list their capabilities and invoke them,
//!   with an optional permission gate in front of every tool call
//!
//! Messages are JSON-RPC 2.0 frames. Transports live in [`transport`]: newline-delimited
//! JSON over stdio or a child process, and an experimental HTTP event-stream variant.
//!
//! ## Exposing Tools as an MCP Server
//!
//! ```ignore
//! use capstan_mcp::McpServer;
//!
//! let server = McpServer::new("my-server", "1.0.0");
//! server.catalog().tools.register(MyCustomTool);
//! server.catalog().prompts.register(CodeReview);
//!
//! // Serve over stdio until the client disconnects
//! server.serve_stdio().await?;
//! ```
//!
//! Tools registered while the server runs are announced to the client with a
//! `notifications/tools/list_changed` notification.
//!
//! ### Claude Desktop Integration
//!
//! To use your MCP server with Claude Desktop, add it to your Claude Desktop config
//! (`~/Library/Application Support/Claude/claude_desktop_config.json` on macOS):
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "my-server": {
//!       "command": "/path/to/my-server-binary"
//!     }
//!   }
//! }
//! ```
//!
//! ## Using MCP Servers
//!
//! ```ignore
//! use capstan_mcp::{ClientOptions, McpClient, transport::ChildProcessTransport};
//!
//! let transport = ChildProcessTransport::spawn("npx", &["-y", "@modelcontextprotocol/server-filesystem", "/tmp"])?;
//! let options = ClientOptions::new()
//!     .permission_gate(|tool, _args| tool != "delete_file");
//! let client = McpClient::connect_with(transport, options).await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("{}: {}", tool.name, tool.description.unwrap_or_default());
//! }
//! let result = client.call_tool("read_file", serde_json::json!({"path": "/tmp/notes.txt"})).await?;
//! ```
//!
//! ### Loading from Configuration
//!
//! Server configurations follow the Claude Desktop format:
//!
//! ```ignore
//! use capstan_mcp::{McpConnection, McpServersConfig};
//!
//! // {
//! //   "filesystem": {
//! //     "command": "npx",
//! //     "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"]
//! //   },
//! //   "remote": { "url": "http://localhost:8080/sse" }
//! // }
//! let config: McpServersConfig = serde_json::from_str(&config_json)?;
//! let connections = McpConnection::from_configs(&config).await?;
//! ```
//!
//! ## Error Handling
//!
//! Protocol and transport failures are reported as [`McpError`]. Failures of the
//! capability itself never are: a tool that fails, panics, is unknown or is denied
//! by the permission gate produces a [`CallToolResult`] with `is_error` set.
//!
//! ```ignore
//! use capstan_mcp::{McpConnection, McpError};
//!
//! match McpConnection::spawn("npx", &["-y", "some-server"]).await {
//!     Ok(conn) => { /* use connection */ }
//!     Err(McpError::Io(e)) => eprintln!("IO error: {e}"),
//!     Err(McpError::InvalidConfig(msg)) => eprintln!("Config error: {msg}"),
//!     Err(McpError::Timeout) => eprintln!("Connection timed out"),
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! ```
//!
//! ## Runtime
//!
//! Read loops and per-request handlers are spawned with Tokio, so servers and clients
//! must run inside a Tokio runtime.

mod client;
pub mod protocol;
mod server;
pub mod transport;

// Re-export main types
pub use capstan_core::{CallToolResult, Content};
pub use client::{
    ClientOptions, DEFAULT_TIMEOUT, McpClient, McpConnection, McpServerConfig, McpServersConfig,
    NotificationHandler, PERMISSION_DENIED, PermissionGate,
};
pub use protocol::McpError;
pub use server::McpServer;
