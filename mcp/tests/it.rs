//! End-to-end tests: a real server and client talking over an in-memory pipe.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use capstan_core::{
    CallToolResult, Content, GetPromptResult, PromptMessage, Resource, Role, Tool,
};
use capstan_mcp::protocol::{
    ErrorCode, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    PROTOCOL_VERSION, RequestId, ServerCapabilities, ServerInfo, methods,
};
use capstan_mcp::transport::{
    FrameReader, FrameWriter, LineReader, MemoryReader, MemoryTransport, MemoryWriter, Transport,
};
use capstan_mcp::{ClientOptions, McpClient, McpError, McpServer};
use futures_lite::io::{BufReader, Cursor};
use md5::{Digest, Md5};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sha2::Sha256;
use tokio::time::timeout;

const DEADLINE: Duration = Duration::from_secs(5);

#[derive(JsonSchema, Deserialize)]
struct EchoArgs {
    /// Text to send back.
    input: String,
}

struct Echo;

impl Tool for Echo {
    fn name(&self) -> Cow<'static, str> {
        "echo".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Echoes the input back".into()
    }
    type Arguments = EchoArgs;
    type Output = String;

    async fn call(&self, args: EchoArgs) -> capstan_core::Result {
        Ok(args.input)
    }
}

#[derive(JsonSchema, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum Algorithm {
    Md5,
    Sha256,
}

#[derive(JsonSchema, Deserialize)]
struct HashArgs {
    input: String,
    algorithm: Algorithm,
}

struct Hash;

impl Tool for Hash {
    fn name(&self) -> Cow<'static, str> {
        "hash".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Hex digest of the input".into()
    }
    type Arguments = HashArgs;
    type Output = String;

    async fn call(&self, args: HashArgs) -> capstan_core::Result {
        Ok(match args.algorithm {
            Algorithm::Md5 => hex::encode(Md5::digest(args.input.as_bytes())),
            Algorithm::Sha256 => hex::encode(Sha256::digest(args.input.as_bytes())),
        })
    }
}

struct Boom;

impl Tool for Boom {
    fn name(&self) -> Cow<'static, str> {
        "boom".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Always fails".into()
    }
    type Arguments = ();
    type Output = String;

    async fn call(&self, (): ()) -> capstan_core::Result {
        anyhow::bail!("boom")
    }
}

struct Explode;

impl Tool for Explode {
    fn name(&self) -> Cow<'static, str> {
        "explode".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Panics".into()
    }
    type Arguments = ();
    type Output = String;

    #[allow(clippy::unused_async)]
    async fn call(&self, (): ()) -> capstan_core::Result {
        panic!("kaboom")
    }
}

#[derive(JsonSchema, Deserialize)]
struct SleepArgs {
    millis: u64,
}

struct Sleep;

impl Tool for Sleep {
    fn name(&self) -> Cow<'static, str> {
        "sleep".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Waits, then reports how long".into()
    }
    type Arguments = SleepArgs;
    type Output = String;

    async fn call(&self, args: SleepArgs) -> capstan_core::Result {
        tokio::time::sleep(Duration::from_millis(args.millis)).await;
        Ok(format!("slept {}ms", args.millis))
    }
}

struct Counted(Arc<AtomicUsize>);

impl Tool for Counted {
    fn name(&self) -> Cow<'static, str> {
        "counted".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Counts its invocations".into()
    }
    type Arguments = ();
    type Output = String;

    async fn call(&self, (): ()) -> capstan_core::Result {
        let hits = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(hits.to_string())
    }
}

struct Greeter(&'static str);

impl Tool for Greeter {
    fn name(&self) -> Cow<'static, str> {
        "greet".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Greets".into()
    }
    type Arguments = ();
    type Output = &'static str;

    async fn call(&self, (): ()) -> capstan_core::Result<&'static str> {
        Ok(self.0)
    }
}

#[derive(JsonSchema, Deserialize)]
struct ReviewArgs {
    /// Code to review.
    code: String,
    /// Focus of the review.
    #[serde(default)]
    focus: Option<String>,
}

struct Review;

impl capstan_core::Prompt for Review {
    fn name(&self) -> Cow<'static, str> {
        "review".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Asks for a code review".into()
    }
    type Arguments = ReviewArgs;
    type Output = GetPromptResult;

    async fn get(&self, args: ReviewArgs) -> capstan_core::Result<GetPromptResult> {
        let focus = args.focus.unwrap_or_else(|| "correctness".to_string());
        Ok(GetPromptResult::new([
            PromptMessage::user_text(format!("Review for {focus}:\n{}", args.code)),
            PromptMessage::assistant_text("Looking at it now."),
        ])
        .with_description("Code review"))
    }
}

#[derive(JsonSchema, Deserialize)]
struct GreetingArgs {
    name: String,
}

struct Greeting;

impl Resource for Greeting {
    fn uri(&self) -> Cow<'static, str> {
        "test://{name}".into()
    }
    fn name(&self) -> Cow<'static, str> {
        "greeting".into()
    }
    type Arguments = GreetingArgs;
    type Output = String;

    async fn read(&self, args: GreetingArgs) -> capstan_core::Result {
        Ok(format!("Hello, {}!", args.name))
    }
}

fn server() -> McpServer {
    let server = McpServer::new("it", "0.1.0").with_instructions("Use the tools.");
    let catalog = server.catalog();
    catalog.tools.register(Echo);
    catalog.tools.register(Hash);
    catalog.tools.register(Boom);
    catalog.tools.register(Explode);
    catalog.tools.register(Sleep);
    catalog.prompts.register(Review);
    catalog.resources.register(Greeting);
    server
}

async fn connect(server: &McpServer, options: ClientOptions) -> McpClient<MemoryTransport> {
    let (client_end, server_end) = MemoryTransport::pair();
    let server = server.clone();
    tokio::spawn(async move { server.run(server_end).await });
    timeout(DEADLINE, McpClient::connect_with(client_end, options))
        .await
        .expect("handshake timed out")
        .expect("handshake failed")
}

fn text_of(result: &CallToolResult) -> &str {
    assert_eq!(result.content.len(), 1, "expected one content item");
    result.first_text().expect("expected text content")
}

#[tokio::test]
async fn handshake_reports_server_identity() {
    let client = connect(&server(), ClientOptions::new()).await;
    let info = client.server_info().unwrap();
    assert_eq!(info.name, "it");
    assert_eq!(info.version.as_deref(), Some("0.1.0"));
    assert_eq!(client.instructions(), Some("Use the tools."));
    assert!(client.capabilities().unwrap().tools.is_some());
}

#[tokio::test]
async fn lists_tools_with_required_parameters() {
    let client = connect(&server(), ClientOptions::new()).await;
    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, ["boom", "echo", "explode", "hash", "sleep"]);

    let hash = tools.iter().find(|tool| tool.name == "hash").unwrap();
    let mut required = hash.required();
    required.sort_unstable();
    assert_eq!(required, ["algorithm", "input"]);
}

#[tokio::test]
async fn echo_returns_its_input() {
    let client = connect(&server(), ClientOptions::new()).await;
    let result = client
        .call_tool("echo", json!({"input": "hello"}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.content, [Content::text("hello")]);
}

#[tokio::test]
async fn hash_computes_md5() {
    let client = connect(&server(), ClientOptions::new()).await;
    let result = client
        .call_tool("hash", json!({"input": "test", "algorithm": "MD5"}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(text_of(&result), "098f6bcd4621d373cade4e832627b4f6");
}

#[tokio::test]
async fn failing_tool_yields_error_result() {
    let client = connect(&server(), ClientOptions::new()).await;
    let result = client.call_tool("boom", Value::Null).await.unwrap();
    assert!(result.is_error);
    assert_eq!(text_of(&result), "boom");

    // The server is still serving.
    let result = client.call_tool("echo", json!({"input": "still here"})).await.unwrap();
    assert_eq!(text_of(&result), "still here");
}

#[tokio::test]
async fn panicking_tool_is_contained() {
    let client = connect(&server(), ClientOptions::new()).await;
    let result = client.call_tool("explode", json!({})).await.unwrap();
    assert!(result.is_error);
    assert_eq!(text_of(&result), "kaboom");
    client.ping().await.unwrap();
}

#[tokio::test]
async fn missing_required_argument_yields_error_result() {
    let client = connect(&server(), ClientOptions::new()).await;
    for (tool, arguments) in [
        ("echo", json!({})),
        ("hash", json!({"input": "test"})),
        ("sleep", json!({"millis": null})),
    ] {
        let result = client.call_tool(tool, arguments).await.unwrap();
        assert!(result.is_error, "{tool} accepted missing arguments");
    }
}

#[tokio::test]
async fn unknown_tool_yields_error_result() {
    let client = connect(&server(), ClientOptions::new()).await;
    let result = client.call_tool("nope", json!({})).await.unwrap();
    assert!(result.is_error);
    assert_eq!(text_of(&result), "Tool 'nope' not found");
}

#[tokio::test]
async fn concurrent_calls_do_not_leak_values() {
    let client = connect(&server(), ClientOptions::new()).await;
    let calls: Vec<_> = (0..10)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let input = format!("Message {i}");
                let result = client
                    .call_tool("echo", json!({ "input": input }))
                    .await
                    .unwrap();
                (input, result)
            })
        })
        .collect();

    for call in calls {
        let (input, result) = call.await.unwrap();
        assert!(!result.is_error);
        assert_eq!(text_of(&result), input);
    }
}

#[tokio::test]
async fn slow_call_does_not_block_fast_ones() {
    let client = connect(&server(), ClientOptions::new()).await;
    let slow = tokio::spawn({
        let client = client.clone();
        async move { client.call_tool("sleep", json!({"millis": 300})).await }
    });

    let fast = client.call_tool("echo", json!({"input": "quick"})).await.unwrap();
    assert_eq!(text_of(&fast), "quick");
    assert!(!slow.is_finished());

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(text_of(&slow), "slept 300ms");
}

#[tokio::test]
async fn closing_fails_requests_in_flight() {
    let client = connect(&server(), ClientOptions::new()).await;
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.call_tool("sleep", json!({"millis": 60_000})).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.close().await.unwrap();
    let outcome = timeout(DEADLINE, pending)
        .await
        .expect("pending request hung after close")
        .unwrap();
    assert!(matches!(outcome, Err(McpError::ConnectionClosed)));
    assert!(client.is_closed());
    assert!(matches!(
        client.ping().await,
        Err(McpError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn permission_gate_blocks_before_sending() {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = server();
    server.catalog().tools.register(Counted(Arc::clone(&hits)));

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let options = ClientOptions::new().permission_gate({
        let seen = Arc::clone(&seen);
        move |tool: &str, arguments: &Map<String, Value>| {
            seen.lock().unwrap().push((tool.to_string(), arguments.clone()));
            tool != "counted"
        }
    });
    let client = connect(&server, options).await;

    let denied = client.call_tool("counted", json!({"why": "test"})).await.unwrap();
    assert!(denied.is_error);
    assert_eq!(text_of(&denied), "Permission Denied.");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let allowed = client.call_tool("echo", json!({"input": "ok"})).await.unwrap();
    assert!(!allowed.is_error);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "counted");
    assert_eq!(seen[0].1["why"], "test");
}

#[tokio::test]
async fn later_registration_wins() {
    let server = server();
    server.catalog().tools.register(Greeter("first"));
    server.catalog().tools.register(Greeter("second"));
    let client = connect(&server, ClientOptions::new()).await;

    let result = client.call_tool("greet", json!({})).await.unwrap();
    assert_eq!(text_of(&result), "second");
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.iter().filter(|tool| tool.name == "greet").count(), 1);
}

#[tokio::test]
async fn registration_while_running_notifies_client() {
    let (sender, changes) = async_channel::unbounded();
    let options = ClientOptions::new().on_notification(move |notification| {
        let _ = sender.try_send(notification.method);
    });
    let server = server();
    let client = connect(&server, options).await;

    server.catalog().tools.register(Greeter("hi"));
    let method = timeout(DEADLINE, changes.recv()).await.unwrap().unwrap();
    assert_eq!(method, methods::TOOLS_LIST_CHANGED);

    let tools = client.list_tools().await.unwrap();
    assert!(tools.iter().any(|tool| tool.name == "greet"));
}

#[tokio::test]
async fn unknown_method_is_a_protocol_error() {
    let client = connect(&server(), ClientOptions::new()).await;
    let error = client
        .request::<Value>("completion/complete", None)
        .await
        .unwrap_err();
    let McpError::JsonRpc(error) = error else {
        panic!("expected a JSON-RPC error, got {error}");
    };
    assert_eq!(error.code, ErrorCode::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn prompts_are_listed_and_rendered() {
    let client = connect(&server(), ClientOptions::new()).await;

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].name, "review");
    let arguments: Vec<(&str, bool)> = prompts[0]
        .arguments
        .iter()
        .map(|argument| (argument.name.as_str(), argument.required))
        .collect();
    assert_eq!(arguments, [("code", true), ("focus", false)]);

    let mut arguments = Map::new();
    arguments.insert("code".into(), json!("fn main() {}"));
    let rendered = client.get_prompt("review", arguments).await.unwrap();
    assert_eq!(rendered.description.as_deref(), Some("Code review"));
    assert_eq!(rendered.messages.len(), 2);
    assert_eq!(rendered.messages[0].role, Role::User);
    assert_eq!(
        rendered.messages[0].content.as_text(),
        Some("Review for correctness:\nfn main() {}")
    );

    let error = client.get_prompt("missing", Map::new()).await.unwrap_err();
    assert!(matches!(error, McpError::JsonRpc(e) if e.code == ErrorCode::INVALID_PARAMS));
}

#[tokio::test]
async fn templated_resources_resolve_variables() {
    let client = connect(&server(), ClientOptions::new()).await;

    assert!(client.list_resources().await.unwrap().is_empty());
    let templates = client.list_resource_templates().await.unwrap();
    assert_eq!(templates[0].uri_template, "test://{name}");

    let read = client.read_resource("test://world").await.unwrap();
    assert_eq!(read.contents.len(), 1);
    assert_eq!(read.contents[0].uri(), "test://world");
    assert_eq!(read.contents[0].as_text(), Some("Hello, world!"));

    let error = client.read_resource("other://world").await.unwrap_err();
    assert!(matches!(error, McpError::JsonRpc(e) if e.code == ErrorCode::INVALID_PARAMS));
}

#[tokio::test]
async fn malformed_frame_does_not_stop_the_server() {
    let (peer, server_end) = MemoryTransport::pair();
    let server = server();
    tokio::spawn(async move { server.run(server_end).await });
    let (mut reader, writer) = peer.split();

    writer.send_raw("this is not json").await.unwrap();
    writer.send_raw("{\"jsonrpc\":\"2.0\"}").await.unwrap();
    writer
        .send(&JsonRpcRequest::new("after-garbage", methods::PING).into())
        .await
        .unwrap();

    let reply = timeout(DEADLINE, reader.recv()).await.unwrap().unwrap().unwrap();
    let JsonRpcMessage::Response(reply) = reply else {
        panic!("expected a response");
    };
    assert_eq!(reply.id, RequestId::from("after-garbage"));
    assert_eq!(reply.into_result().unwrap(), json!({}));
}

/// Plays the server by hand: answers the handshake, then hands back the
/// first request it sees without answering it.
async fn scripted_peer(
    reader: &mut impl FrameReader,
    writer: &impl FrameWriter,
) -> JsonRpcRequest {
    loop {
        let Some(JsonRpcMessage::Request(request)) = reader.recv().await.unwrap() else {
            continue;
        };
        if request.method != methods::INITIALIZE {
            return request;
        }
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::all(),
            server_info: ServerInfo {
                name: "scripted".into(),
                version: None,
            },
            instructions: None,
        };
        let response = JsonRpcResponse::success(request.id, serde_json::to_value(result).unwrap());
        writer.send(&response.into()).await.unwrap();
    }
}

#[tokio::test]
async fn timed_out_request_drops_late_response() {
    let (client_end, server_end) = MemoryTransport::pair();
    let (mut server_reader, server_writer) = server_end.split();
    let peer = tokio::spawn(async move {
        let request = scripted_peer(&mut server_reader, &server_writer).await;
        (request, server_writer)
    });

    let client = McpClient::connect(client_end).await.unwrap();
    let error = client
        .call_tool_with_timeout("echo", json!({"input": "late"}), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(error, McpError::Timeout));

    // Answer the abandoned request; the client must ignore it.
    let (request, server_writer) = peer.await.unwrap();
    let late = JsonRpcResponse::success(
        request.id,
        serde_json::to_value(CallToolResult::text("late")).unwrap(),
    );
    server_writer.send(&late.into()).await.unwrap();
    assert!(!client.is_closed());
}

#[tokio::test]
async fn peer_hangup_fails_pending_requests() {
    let (client_end, server_end) = MemoryTransport::pair();
    let (mut server_reader, server_writer) = server_end.split();
    let peer = tokio::spawn(async move {
        let request = scripted_peer(&mut server_reader, &server_writer).await;
        server_writer.close().await.unwrap();
        request
    });

    let client = McpClient::connect(client_end).await.unwrap();
    let outcome = timeout(DEADLINE, client.call_tool("echo", json!({"input": "x"})))
        .await
        .expect("request hung after hangup");
    assert!(matches!(outcome, Err(McpError::ConnectionClosed)));
    assert_eq!(peer.await.unwrap().method, methods::TOOLS_CALL);
    assert!(client.is_closed());
}

#[tokio::test]
async fn repeated_cursor_ends_pagination() {
    let (client_end, server_end) = MemoryTransport::pair();
    let (mut server_reader, server_writer) = server_end.split();
    let peer = tokio::spawn(async move {
        let mut request = scripted_peer(&mut server_reader, &server_writer).await;
        let mut pages = 0;
        loop {
            assert_eq!(request.method, methods::TOOLS_LIST);
            pages += 1;
            let page = json!({
                "tools": [{"name": format!("tool-{pages}"), "inputSchema": {"type": "object"}}],
                "nextCursor": "again",
            });
            server_writer
                .send(&JsonRpcResponse::success(request.id, page).into())
                .await
                .unwrap();
            match server_reader.recv().await.unwrap() {
                Some(JsonRpcMessage::Request(next)) => request = next,
                _ => return pages,
            }
        }
    });

    let client = McpClient::connect(client_end).await.unwrap();
    let tools = timeout(DEADLINE, client.list_tools())
        .await
        .expect("pagination never ended")
        .unwrap();
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, ["tool-1", "tool-2"]);

    client.close().await.unwrap();
    assert_eq!(peer.await.unwrap(), 2);
}

#[tokio::test]
async fn requests_read_before_eof_are_answered() {
    let (peer, server_end) = MemoryTransport::pair();
    let server = server();
    let running = tokio::spawn(async move { server.run(server_end).await });
    let (mut reader, writer) = peer.split();

    let request = JsonRpcRequest::with_params(
        "last-words",
        methods::TOOLS_CALL,
        json!({"name": "sleep", "arguments": {"millis": 100}}),
    );
    writer.send(&request.into()).await.unwrap();
    writer.close().await.unwrap();

    let reply = timeout(DEADLINE, reader.recv()).await.unwrap().unwrap();
    let Some(JsonRpcMessage::Response(reply)) = reply else {
        panic!("expected a response before the server hung up");
    };
    assert_eq!(reply.id, RequestId::from("last-words"));
    let result: CallToolResult = serde_json::from_value(reply.into_result().unwrap()).unwrap();
    assert_eq!(text_of(&result), "slept 100ms");

    assert!(reader.recv().await.unwrap().is_none());
    timeout(DEADLINE, running).await.unwrap().unwrap().unwrap();
}

/// Line-framed input from a fixed byte buffer, answers into a memory pipe.
struct ScriptedLines {
    input: Vec<u8>,
    output: MemoryWriter,
}

impl Transport for ScriptedLines {
    type Reader = LineReader<BufReader<Cursor<Vec<u8>>>>;
    type Writer = MemoryWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (LineReader::new(BufReader::new(Cursor::new(self.input))), self.output)
    }
}

async fn drain_ids(reader: &mut MemoryReader) -> Vec<String> {
    let mut ids = Vec::new();
    while let Some(message) = timeout(DEADLINE, reader.recv()).await.unwrap().unwrap() {
        if let JsonRpcMessage::Response(response) = message {
            ids.push(response.id.to_string());
        }
    }
    ids.sort();
    ids
}

#[tokio::test]
async fn non_utf8_line_does_not_end_the_session() {
    let mut input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".to_vec();
    input.extend_from_slice(b"\xff\xfe garbage\n");
    input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");

    let (peer, server_end) = MemoryTransport::pair();
    let (_, output) = server_end.split();
    let (mut reader, _writer) = peer.split();

    let outcome = server().run(ScriptedLines { input, output }).await;
    assert!(outcome.is_ok(), "session ended with {outcome:?}");
    assert_eq!(drain_ids(&mut reader).await, ["1", "2"]);
}
