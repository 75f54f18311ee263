//! MCP client for connecting to MCP servers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use async_channel::Sender;
use async_io::Timer;
use capstan_core::{
    CallToolResult, GetPromptResult, PromptDefinition, ReadResourceResult, ResourceDefinition,
    ResourceTemplateDefinition,
};
use futures_lite::future;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::methods;
use crate::protocol::{
    CallToolParams, ClientInfo, GetPromptParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListedTools, McpError,
    McpToolDefinition, PaginatedParams, ReadResourceParams, RequestId, ServerCapabilities,
    ServerInfo,
};
use crate::transport::{FrameReader, FrameWriter, Transport};

/// Default deadline for a request awaiting its response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Consulted with the tool name and arguments before a tool call is sent.
/// Returning `false` denies the call.
pub type PermissionGate = Arc<dyn Fn(&str, &Map<String, Value>) -> bool + Send + Sync>;

/// Receives every notification the server sends.
pub type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// Message returned, without contacting the server, for a denied tool call.
pub const PERMISSION_DENIED: &str = "Permission Denied.";

/// Options for [`McpClient::connect_with`].
#[derive(Clone)]
pub struct ClientOptions {
    info: ClientInfo,
    timeout: Option<Duration>,
    gate: Option<PermissionGate>,
    on_notification: Option<NotificationHandler>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("info", &self.info)
            .field("timeout", &self.timeout)
            .field("gate", &self.gate.is_some())
            .field("on_notification", &self.on_notification.is_some())
            .finish()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            info: ClientInfo::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            gate: None,
            on_notification: None,
        }
    }
}

impl ClientOptions {
    /// Default options: 60 second timeout, no gate, notifications logged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity announced to the server.
    #[must_use]
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = ClientInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Deadline for each request; `None` waits indefinitely.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Gate consulted before every tool call.
    #[must_use]
    pub fn permission_gate(
        mut self,
        gate: impl Fn(&str, &Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Handler for server notifications such as list-changed events.
    #[must_use]
    pub fn on_notification(
        mut self,
        handler: impl Fn(JsonRpcNotification) + Send + Sync + 'static,
    ) -> Self {
        self.on_notification = Some(Arc::new(handler));
        self
    }
}

/// MCP client for connecting to and interacting with MCP servers.
///
/// A background task owns the transport's reader and resolves responses by
/// request id, so the client may be cloned and used from many tasks at once.
/// Responses may arrive in any order. Closing the client, or losing the
/// connection, fails every request still waiting with
/// [`McpError::ConnectionClosed`].
///
/// Must be created inside a Tokio runtime.
///
/// # Example
///
/// ```ignore
/// use capstan_mcp::{McpClient, transport::ChildProcessTransport};
///
/// let transport = ChildProcessTransport::spawn("npx", &["-y", "@mcp/server"])?;
/// let client = McpClient::connect(transport).await?;
///
/// // List available tools
/// let tools = client.list_tools().await?;
///
/// // Call a tool
/// let result = client.call_tool("my_tool", serde_json::json!({"arg": "value"})).await?;
/// ```
pub struct McpClient<T: Transport> {
    inner: Arc<Inner<T::Writer>>,
}

impl<T: Transport> Clone for McpClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> fmt::Debug for McpClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("server_info", &self.server_info())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> McpClient<T> {
    /// Connect to an MCP server and perform initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or initialization fails.
    pub async fn connect(transport: T) -> Result<Self, McpError> {
        Self::connect_with(transport, ClientOptions::default()).await
    }

    /// Connect with custom options and perform initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or initialization fails.
    pub async fn connect_with(transport: T, options: ClientOptions) -> Result<Self, McpError> {
        let (reader, writer) = transport.split();
        let inner = Arc::new(Inner {
            writer,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
            options,
            reader: Mutex::new(None),
            handshake: OnceLock::new(),
        });
        let task = tokio::spawn(read_loop(reader, Arc::downgrade(&inner)));
        *lock(&inner.reader) = Some(task);

        let client = Self { inner };
        client.initialize().await?;
        Ok(client)
    }

    /// Perform MCP initialization handshake.
    async fn initialize(&self) -> Result<(), McpError> {
        let params = serde_json::to_value(InitializeParams::new(self.inner.options.info.clone()))?;
        let result: InitializeResult = self.request(methods::INITIALIZE, Some(params)).await?;

        debug!(
            "Connected to MCP server: {} v{}",
            result.server_info.name,
            result.server_info.version.as_deref().unwrap_or("unknown")
        );
        let _ = self.inner.handshake.set(result);

        self.notify(methods::INITIALIZED, None).await
    }

    /// Get the server information.
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.inner.handshake.get().map(|init| &init.server_info)
    }

    /// Get the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.inner.handshake.get().map(|init| &init.capabilities)
    }

    /// Instructions the server sent during initialization.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.inner
            .handshake
            .get()
            .and_then(|init| init.instructions.as_deref())
    }

    /// Whether the connection has been closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// List available tools from the server, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let tools = self.paginate::<ListedTools>(methods::TOOLS_LIST).await?;
        debug!("Listed {} tools", tools.len());
        Ok(tools)
    }

    /// Call a tool on the server.
    ///
    /// `arguments` must be a JSON object or `null`. If a permission gate is
    /// configured and denies the call, an error result with the message
    /// `"Permission Denied."` is returned and nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or times out. A tool that ran
    /// and failed is not an error here; it yields a result with `is_error`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.call_tool_with_timeout(name, arguments, self.inner.options.timeout)
            .await
    }

    /// Call a tool with a deadline other than the client default.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(JsonRpcError::invalid_params(format!(
                    "Tool arguments must be an object, got {other}"
                ))
                .into());
            }
        };

        if let Some(gate) = &self.inner.options.gate {
            if !gate(name, &arguments) {
                debug!("Permission denied for tool {name}");
                return Ok(CallToolResult::error(PERMISSION_DENIED));
            }
        }

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        })?;
        let value = self
            .inner
            .request(methods::TOOLS_CALL, Some(params), timeout)
            .await?;
        let result: CallToolResult = serde_json::from_value(value)?;

        debug!("Tool {} returned {} content items", name, result.content.len());
        Ok(result)
    }

    /// List available prompts, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
        self.paginate::<ListPromptsResult>(methods::PROMPTS_LIST).await
    }

    /// Render a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the prompt is unknown.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<GetPromptResult, McpError> {
        let params = serde_json::to_value(GetPromptParams {
            name: name.to_string(),
            arguments: Some(arguments),
        })?;
        self.request(methods::PROMPTS_GET, Some(params)).await
    }

    /// List available resources from the server, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or resources are not supported.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, McpError> {
        let resources = self
            .paginate::<ListResourcesResult>(methods::RESOURCES_LIST)
            .await?;
        debug!("Listed {} resources", resources.len());
        Ok(resources)
    }

    /// List resource templates, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_resource_templates(
        &self,
    ) -> Result<Vec<ResourceTemplateDefinition>, McpError> {
        self.paginate::<ListResourceTemplatesResult>(methods::RESOURCES_TEMPLATES_LIST)
            .await
    }

    /// Read a resource from the server.
    ///
    /// # Arguments
    ///
    /// * `uri` - The resource URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let params = serde_json::to_value(ReadResourceParams {
            uri: uri.to_string(),
        })?;
        self.request(methods::RESOURCES_READ, Some(params)).await
    }

    /// Liveness probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer.
    pub async fn ping(&self) -> Result<(), McpError> {
        let _: Value = self.request(methods::PING, None).await?;
        Ok(())
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let notification = match params {
            Some(params) => JsonRpcNotification::with_params(method, params),
            None => JsonRpcNotification::new(method),
        };
        self.inner.writer.send(&notification.into()).await
    }

    /// Send a request with the default timeout and decode its result.
    ///
    /// # Errors
    ///
    /// Returns the server's JSON-RPC error, a transport error, or
    /// [`McpError::Timeout`].
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R, McpError> {
        let value = self
            .inner
            .request(method, params, self.inner.options.timeout)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn paginate<P: Page>(&self, method: &str) -> Result<Vec<P::Item>, McpError> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let params = serde_json::to_value(PaginatedParams { cursor })?;
            let page: P = self.request(method, Some(params)).await?;
            let (page_items, next) = page.into_parts();
            items.extend(page_items);
            match next {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!("{method} repeated cursor `{next}`, stopping pagination");
                    return Ok(items);
                }
                None => return Ok(items),
            }
        }
    }

    /// Close the client connection.
    ///
    /// Every request still awaiting a response fails with
    /// [`McpError::ConnectionClosed`].
    ///
    /// # Errors
    ///
    /// Returns an error if closing the transport fails.
    pub async fn close(&self) -> Result<(), McpError> {
        self.inner.fail_pending();
        if let Some(task) = lock(&self.inner.reader).take() {
            task.abort();
        }
        self.inner.writer.close().await
    }
}

struct Inner<W> {
    writer: W,
    pending: Mutex<HashMap<RequestId, Sender<JsonRpcResponse>>>,
    next_id: AtomicI64,
    closed: AtomicBool,
    options: ClientOptions,
    reader: Mutex<Option<JoinHandle<()>>>,
    handshake: OnceLock<InitializeResult>,
}

impl<W: FrameWriter> Inner<W> {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = async_channel::bounded(1);
        lock(&self.pending).insert(id.clone(), sender);
        // Closed between the check above and the insert: nobody will fail us.
        if self.closed.load(Ordering::SeqCst) {
            lock(&self.pending).remove(&id);
            return Err(McpError::ConnectionClosed);
        }

        let request = match params {
            Some(params) => JsonRpcRequest::with_params(id.clone(), method, params),
            None => JsonRpcRequest::new(id.clone(), method),
        };
        if let Err(e) = self.writer.send(&request.into()).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        let response = async {
            receiver
                .recv()
                .await
                .map_err(|_| McpError::ConnectionClosed)
        };
        let response = match timeout {
            Some(limit) => {
                future::or(response, async {
                    Timer::after(limit).await;
                    Err(McpError::Timeout)
                })
                .await
            }
            None => response.await,
        };

        if response.is_err() {
            lock(&self.pending).remove(&id);
        }
        if matches!(response, Err(McpError::Timeout)) {
            warn!("Request {id} ({method}) timed out");
        }
        response?.into_result().map_err(McpError::JsonRpc)
    }

    async fn dispatch(&self, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(response) => {
                let waiter = lock(&self.pending).remove(&response.id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.try_send(response);
                    }
                    None => debug!("Dropping unmatched response {}", response.id),
                }
            }
            JsonRpcMessage::Notification(notification) => match &self.options.on_notification {
                Some(handler) => handler(notification),
                None => debug!("Received notification: {}", notification.method),
            },
            JsonRpcMessage::Request(request) => {
                let response = if request.method == methods::PING {
                    JsonRpcResponse::success(request.id, json!({}))
                } else {
                    JsonRpcResponse::error(
                        request.id,
                        JsonRpcError::method_not_found(&request.method),
                    )
                };
                if let Err(e) = self.writer.send(&response.into()).await {
                    debug!("Failed to answer server request: {e}");
                }
            }
        }
    }
}

impl<W> Inner<W> {
    fn fail_pending(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let waiters = std::mem::take(&mut *lock(&self.pending));
        if !waiters.is_empty() {
            debug!("Failing {} pending requests", waiters.len());
        }
    }
}

impl<W> Drop for Inner<W> {
    fn drop(&mut self) {
        if let Some(task) = self
            .reader
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

async fn read_loop<R: FrameReader, W: FrameWriter>(mut reader: R, inner: Weak<Inner<W>>) {
    loop {
        let message = match reader.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("MCP server closed the connection");
                break;
            }
            Err(McpError::Serialization(e)) => {
                warn!("Skipping malformed frame: {e}");
                continue;
            }
            Err(e) => {
                warn!("MCP transport failed: {e}");
                break;
            }
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.dispatch(message).await;
    }

    if let Some(inner) = inner.upgrade() {
        inner.fail_pending();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One page of a paginated `*/list` result.
trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

impl Page for ListedTools {
    type Item = McpToolDefinition;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>) {
        (self.tools, self.next_cursor)
    }
}

impl Page for ListPromptsResult {
    type Item = PromptDefinition;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>) {
        (self.prompts, self.next_cursor)
    }
}

impl Page for ListResourcesResult {
    type Item = ResourceDefinition;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>) {
        (self.resources, self.next_cursor)
    }
}

impl Page for ListResourceTemplatesResult {
    type Item = ResourceTemplateDefinition;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>) {
        (self.resource_templates, self.next_cursor)
    }
}
