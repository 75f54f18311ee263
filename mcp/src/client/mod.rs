//! MCP client implementation.
//!
//! The client connects to MCP servers and provides methods to
//! list and call tools, render prompts, read resources, etc.

#[allow(clippy::module_inception)]
mod client;
mod toolset;

pub use client::{
    ClientOptions, DEFAULT_TIMEOUT, McpClient, NotificationHandler, PERMISSION_DENIED,
    PermissionGate,
};
pub use toolset::{McpConnection, McpServerConfig, McpServersConfig};
