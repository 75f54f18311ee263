//! MCP protocol types and JSON-RPC message definitions.

mod error;
mod message;
pub mod methods;
mod types;

pub use error::{ErrorCode, JsonRpcError, McpError};
pub use message::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use types::{
    CallToolParams, ClientCapabilities, ClientInfo, GetPromptParams, InitializeParams,
    InitializeResult, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, ListedTools, McpToolDefinition, PROTOCOL_VERSION, PaginatedParams,
    PromptsCapability, ReadResourceParams, ResourcesCapability, RootsCapability,
    ServerCapabilities, ServerInfo, ToolsCapability,
};
