//! Configured MCP connections.
//!
//! Provides a unified interface for connecting to MCP servers
//! via different transports (child process, HTTP event stream, stdio).

use std::collections::HashMap;

use capstan_core::CallToolResult;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::protocol::{McpError, McpToolDefinition};
use crate::transport::{ChildProcessTransport, SseTransport, StdioTransport};

use super::{ClientOptions, McpClient};

/// Configuration for a single MCP server.
///
/// This matches the format used by Claude Desktop and other MCP clients.
///
/// # Example JSON
///
/// ```json
/// {
///   "command": "npx",
///   "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerConfig {
    /// The command to run (for process-based servers).
    pub command: Option<String>,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Event-stream URL for HTTP-based servers.
    pub url: Option<String>,

    /// Optional environment variables for the process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Configuration for multiple MCP servers, keyed by server name.
///
/// # Example JSON
///
/// ```json
/// {
///   "filesystem": {
///     "command": "npx",
///     "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"]
///   },
///   "remote": {
///     "url": "http://localhost:8080/sse"
///   }
/// }
/// ```
pub type McpServersConfig = HashMap<String, McpServerConfig>;

/// A single MCP connection with its cached tools.
///
/// This enum handles all transport types internally, hiding the
/// transport abstraction from users.
#[non_exhaustive]
#[allow(missing_docs)]
pub enum McpConnection {
    /// Connection via spawned child process.
    Process {
        client: McpClient<ChildProcessTransport>,
        tools: Vec<McpToolDefinition>,
        server_name: Option<String>,
    },
    /// Connection via HTTP event stream.
    Sse {
        client: McpClient<SseTransport>,
        tools: Vec<McpToolDefinition>,
        server_name: Option<String>,
    },
    /// Connection via this process's stdio (when running as a subprocess).
    Stdio {
        client: McpClient<StdioTransport>,
        tools: Vec<McpToolDefinition>,
        server_name: Option<String>,
    },
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Process { .. } => "McpConnection::Process",
            Self::Sse { .. } => "McpConnection::Sse",
            Self::Stdio { .. } => "McpConnection::Stdio",
        };
        f.debug_struct(kind)
            .field("server_name", &self.server_name())
            .field("tool_count", &self.definitions().len())
            .finish()
    }
}

macro_rules! with_client {
    ($conn:expr, $client:ident => $body:expr) => {
        match $conn {
            McpConnection::Process { $client, .. } => $body,
            McpConnection::Sse { $client, .. } => $body,
            McpConnection::Stdio { $client, .. } => $body,
        }
    };
}

impl McpConnection {
    /// Connect to an MCP server using configuration.
    ///
    /// A `url` selects the event-stream transport; otherwise `command` is
    /// spawned with `args` and `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or connection fails.
    pub async fn from_config(config: &McpServerConfig) -> Result<Self, McpError> {
        Self::from_config_with(config, ClientOptions::default()).await
    }

    /// Connect using configuration and custom client options.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or connection fails.
    pub async fn from_config_with(
        config: &McpServerConfig,
        options: ClientOptions,
    ) -> Result<Self, McpError> {
        if let Some(url) = &config.url {
            let transport = SseTransport::connect(url).await?;
            let client = McpClient::connect_with(transport, options).await?;
            let (tools, server_name) = Self::discover(&client).await?;
            Ok(Self::Sse {
                client,
                tools,
                server_name,
            })
        } else if let Some(command) = &config.command {
            let transport = ChildProcessTransport::spawn_with_env(command, &config.args, &config.env)?;
            let client = McpClient::connect_with(transport, options).await?;
            let (tools, server_name) = Self::discover(&client).await?;
            Ok(Self::Process {
                client,
                tools,
                server_name,
            })
        } else {
            Err(McpError::InvalidConfig(
                "Config must have either 'command' or 'url'".to_string(),
            ))
        }
    }

    /// Connect to multiple MCP servers from a configuration map.
    ///
    /// Returns a vector of (name, connection) pairs for all connections.
    ///
    /// # Errors
    ///
    /// Returns an error if any connection fails.
    pub async fn from_configs(configs: &McpServersConfig) -> Result<Vec<(String, Self)>, McpError> {
        let mut connections = Vec::new();

        for (name, config) in configs {
            let conn = Self::from_config(config).await.map_err(|e| {
                McpError::InvalidConfig(format!("Failed to connect to MCP server '{name}': {e}"))
            })?;
            info!("Connected to MCP server: {name}");
            connections.push((name.clone(), conn));
        }

        Ok(connections)
    }

    /// Connect to an MCP server via a spawned child process.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or connection fails.
    pub async fn spawn(program: &str, args: &[&str]) -> Result<Self, McpError> {
        let transport = ChildProcessTransport::spawn(program, args)?;
        let client = McpClient::connect(transport).await?;
        let (tools, server_name) = Self::discover(&client).await?;

        Ok(Self::Process {
            client,
            tools,
            server_name,
        })
    }

    /// Connect to an MCP server via its HTTP event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP connection fails.
    pub async fn sse(url: &str) -> Result<Self, McpError> {
        Self::from_config(&McpServerConfig {
            url: Some(url.to_string()),
            ..McpServerConfig::default()
        })
        .await
    }

    /// Connect via stdio (when running as a subprocess).
    ///
    /// # Errors
    ///
    /// Returns an error if stdio cannot be initialized.
    pub async fn stdio() -> Result<Self, McpError> {
        let client = McpClient::connect(StdioTransport::new()?).await?;
        let (tools, server_name) = Self::discover(&client).await?;

        Ok(Self::Stdio {
            client,
            tools,
            server_name,
        })
    }

    async fn discover<T: crate::transport::Transport>(
        client: &McpClient<T>,
    ) -> Result<(Vec<McpToolDefinition>, Option<String>), McpError> {
        let tools = client.list_tools().await?;
        let server_name = client.server_info().map(|i| i.name.clone());
        Ok((tools, server_name))
    }

    /// Returns the server name if available.
    #[must_use]
    pub fn server_name(&self) -> Option<&str> {
        match self {
            Self::Process { server_name, .. }
            | Self::Sse { server_name, .. }
            | Self::Stdio { server_name, .. } => server_name.as_deref(),
        }
    }

    /// Returns the cached tool definitions.
    #[must_use]
    pub fn definitions(&self) -> &[McpToolDefinition] {
        match self {
            Self::Process { tools, .. } | Self::Sse { tools, .. } | Self::Stdio { tools, .. } => {
                tools
            }
        }
    }

    /// Check if this connection has a tool with the given name.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.definitions().iter().any(|d| d.name == name)
    }

    /// Re-fetch the tool list, e.g. after a list-changed notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn refresh_tools(&mut self) -> Result<(), McpError> {
        let fresh = with_client!(&*self, client => client.list_tools().await)?;
        match self {
            Self::Process { tools, .. } | Self::Sse { tools, .. } | Self::Stdio { tools, .. } => {
                *tools = fresh;
            }
        }
        Ok(())
    }

    /// Call a tool on this MCP server.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool call fails.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        with_client!(self, client => client.call_tool(name, arguments).await)
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails.
    pub async fn close(&self) -> Result<(), McpError> {
        with_client!(self, client => client.close().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_claude_desktop_config() {
        let configs: McpServersConfig = serde_json::from_str(
            r#"{
                "filesystem": {
                    "command": "npx",
                    "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
                    "env": {"DEBUG": "1"}
                },
                "remote": {"url": "http://localhost:8080/sse"}
            }"#,
        )
        .unwrap();

        let fs = &configs["filesystem"];
        assert_eq!(fs.command.as_deref(), Some("npx"));
        assert_eq!(fs.args.len(), 3);
        assert_eq!(fs.env["DEBUG"], "1");
        assert!(fs.url.is_none());

        let remote = &configs["remote"];
        assert!(remote.command.is_none());
        assert!(remote.args.is_empty());
    }

    #[tokio::test]
    async fn config_without_command_or_url_is_rejected() {
        let error = McpConnection::from_config(&McpServerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(error, McpError::InvalidConfig(_)));
    }
}
