//! MCP server that exposes a capability catalog.

use std::sync::Arc;

use capstan_core::{CallToolResult, Catalog, ReadResourceResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::protocol::methods;
use crate::protocol::{
    CallToolParams, GetPromptParams, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, McpError,
    PROTOCOL_VERSION, ReadResourceParams, ServerCapabilities, ServerInfo,
};
use crate::transport::{FrameReader, FrameWriter, StdioTransport, Transport};

/// MCP server that serves the tools, prompts and resources of one [`Catalog`].
///
/// The server is cheap to clone; clones share the catalog. Registering into
/// the catalog while [`run`](Self::run) is active announces the change to the
/// connected client with a list-changed notification.
///
/// # Example
///
/// ```ignore
/// use capstan_mcp::McpServer;
///
/// let server = McpServer::new("my-server", "1.0.0");
/// server.catalog().tools.register(MyTool);
/// server.serve_stdio().await?;
/// ```
#[derive(Debug, Clone)]
pub struct McpServer {
    catalog: Arc<Catalog>,
    info: ServerInfo,
    instructions: Option<String>,
}

impl McpServer {
    /// Create a server with an empty catalog.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            catalog: Arc::new(Catalog::new()),
            info: ServerInfo {
                name: name.into(),
                version: Some(version.into()),
            },
            instructions: None,
        }
    }

    /// Serve an existing catalog instead of an empty one.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Instructions sent to the client during initialization.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// The catalog this server serves.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Server identity announced during initialization.
    #[must_use]
    pub const fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Serve over this process's stdin/stdout until the client disconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if stdio cannot be initialized or a fatal transport
    /// error occurs.
    pub async fn serve_stdio(&self) -> Result<(), McpError> {
        self.run(StdioTransport::new()?).await
    }

    /// Run the server main loop.
    ///
    /// Each request is handled on its own task, so a slow tool never blocks
    /// other calls; responses are written in completion order. Malformed
    /// frames are logged and skipped. The loop ends when the peer closes the
    /// connection; requests already read are still answered before the
    /// transport is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if a fatal transport error occurs.
    pub async fn run<T: Transport>(&self, transport: T) -> Result<(), McpError> {
        info!("MCP server starting: {}", self.info.name);

        let (mut reader, writer) = transport.split();
        let writer = Arc::new(writer);
        let forwarder = tokio::spawn(forward_list_changes(
            self.catalog.subscribe(),
            Arc::clone(&writer),
        ));
        let mut handlers = JoinSet::new();

        let outcome = loop {
            match reader.recv().await {
                Ok(Some(message)) => self.handle_message(message, &writer, &mut handlers),
                Ok(None) => {
                    debug!("Connection closed");
                    break Ok(());
                }
                Err(McpError::Serialization(e)) => {
                    warn!("Skipping malformed frame: {e}");
                }
                Err(e) => break Err(e),
            }
            while handlers.try_join_next().is_some() {}
        };

        if !handlers.is_empty() {
            debug!("Finishing {} in-flight requests", handlers.len());
        }
        while handlers.join_next().await.is_some() {}

        forwarder.abort();
        if let Err(e) = writer.close().await {
            debug!("Error closing transport: {e}");
        }
        outcome
    }

    fn handle_message<W: FrameWriter>(
        &self,
        message: JsonRpcMessage,
        writer: &Arc<W>,
        handlers: &mut JoinSet<()>,
    ) {
        match message {
            JsonRpcMessage::Request(req) => {
                let server = self.clone();
                let writer = Arc::clone(writer);
                handlers.spawn(async move {
                    let response = server.handle_request(req).await;
                    if let Err(e) = writer.send(&response.into()).await {
                        debug!("Failed to send response: {e}");
                    }
                });
            }
            JsonRpcMessage::Notification(notif) => {
                if notif.method == methods::INITIALIZED {
                    debug!("Client initialized");
                } else {
                    debug!("Received notification: {}", notif.method);
                }
            }
            JsonRpcMessage::Response(res) => {
                debug!("Unexpected response message for request {}", res.id);
            }
        }
    }

    /// Handle one request and produce its response.
    ///
    /// Never fails: unknown methods, bad parameters and capability faults
    /// all come back as a response.
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling request: {}", req.method);

        let JsonRpcRequest {
            id, method, params, ..
        } = req;
        let result = match method.as_str() {
            methods::INITIALIZE => self.initialize(params),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => to_value(&ListToolsResult {
                tools: self.catalog.tools.definitions(),
                next_cursor: None,
            }),
            methods::TOOLS_CALL => match parse::<CallToolParams>(params) {
                Ok(params) => to_value(&self.call_tool(params).await),
                Err(e) => Err(e),
            },
            methods::PROMPTS_LIST => to_value(&ListPromptsResult {
                prompts: self.catalog.prompts.definitions(),
                next_cursor: None,
            }),
            methods::PROMPTS_GET => match parse::<GetPromptParams>(params) {
                Ok(params) => self.get_prompt(params).await,
                Err(e) => Err(e),
            },
            methods::RESOURCES_LIST => to_value(&ListResourcesResult {
                resources: self.catalog.resources.definitions(),
                next_cursor: None,
            }),
            methods::RESOURCES_TEMPLATES_LIST => to_value(&ListResourceTemplatesResult {
                resource_templates: self.catalog.resources.template_definitions(),
                next_cursor: None,
            }),
            methods::RESOURCES_READ => match parse::<ReadResourceParams>(params) {
                Ok(params) => self.read_resource(params).await,
                Err(e) => Err(e),
            },
            other => Err(JsonRpcError::method_not_found(other)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: Option<InitializeParams> = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        if let Some(params) = params {
            info!(
                "Client connected: {} v{} (protocol {})",
                params.client_info.name, params.client_info.version, params.protocol_version
            );
        }

        to_value(&InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::all(),
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    /// Unknown tools and missing required arguments are reported as error
    /// results rather than protocol errors, so the caller's model sees them.
    async fn call_tool(&self, params: CallToolParams) -> CallToolResult {
        let Some(tool) = self.catalog.tools.get(&params.name) else {
            warn!("Call to unknown tool `{}`", params.name);
            return CallToolResult::error(format!("Tool '{}' not found", params.name));
        };

        let arguments = params.arguments.unwrap_or_default();
        let missing = tool.definition().input_schema().missing_required(&arguments);
        if !missing.is_empty() {
            return CallToolResult::error(format!(
                "Missing required parameter(s) for tool '{}': {}",
                params.name,
                missing.join(", ")
            ));
        }

        let result = tool.call(arguments).await;
        debug!(
            "Tool {} returned {} content items (error: {})",
            params.name,
            result.content.len(),
            result.is_error
        );
        result
    }

    async fn get_prompt(&self, params: GetPromptParams) -> Result<Value, JsonRpcError> {
        let prompt = self.catalog.prompts.get(&params.name).ok_or_else(|| {
            JsonRpcError::invalid_params(format!("Prompt '{}' not found", params.name))
        })?;
        to_value(&prompt.get(params.arguments.unwrap_or_default()).await)
    }

    async fn read_resource(&self, params: ReadResourceParams) -> Result<Value, JsonRpcError> {
        let (resource, variables) = self.catalog.resources.resolve(&params.uri).ok_or_else(|| {
            JsonRpcError::invalid_params(format!("Resource not found: {}", params.uri))
        })?;
        let result: ReadResourceResult = resource
            .read(&params.uri, variables)
            .await
            .map_err(|e| JsonRpcError::internal_error(format!("{e:#}")))?;
        to_value(&result)
    }
}

async fn forward_list_changes<W: FrameWriter>(
    changes: async_channel::Receiver<capstan_core::ListChanged>,
    writer: Arc<W>,
) {
    while let Ok(changed) = changes.recv().await {
        let notification = JsonRpcNotification::new(methods::list_changed(changed.0));
        if let Err(e) = writer.send(&notification.into()).await {
            debug!("Stopped forwarding list changes: {e}");
            break;
        }
    }
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_value(value: &impl Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
