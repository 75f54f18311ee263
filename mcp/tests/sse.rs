//! Integration tests for the HTTP event-stream transport against a local axum server.

use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use capstan_core::Tool;
use capstan_mcp::protocol::JsonRpcMessage;
use capstan_mcp::transport::{SseTransport, Transport};
use capstan_mcp::{McpClient, McpServer};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;

type EventSender = Sender<Result<Event, Infallible>>;

#[derive(Clone)]
struct Bridge {
    server: McpServer,
    stream: Arc<Mutex<Option<EventSender>>>,
}

#[derive(JsonSchema, Deserialize)]
struct EchoArgs {
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

async fn open_stream(State(bridge): State<Bridge>) -> Sse<Receiver<Result<Event, Infallible>>> {
    let (sender, events) = async_channel::unbounded();
    let _ = sender.try_send(Ok(Event::default().event("endpoint").data("/messages")));
    *bridge.stream.lock().unwrap() = Some(sender);
    Sse::new(events)
}

async fn post_message(State(bridge): State<Bridge>, body: String) -> StatusCode {
    let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    if let JsonRpcMessage::Request(request) = message {
        let response = bridge.server.handle_request(request).await;
        let frame = serde_json::to_string(&JsonRpcMessage::from(response)).unwrap();
        let stream = bridge.stream.lock().unwrap().clone();
        if let Some(stream) = stream {
            let _ = stream.send(Ok(Event::default().event("message").data(frame))).await;
        }
    }
    StatusCode::ACCEPTED
}

/// Serves a bridge on an ephemeral port and returns its event-stream URL.
async fn serve() -> String {
    let server = McpServer::new("sse-it", "0.1.0");
    server.catalog().tools.register(Echo);
    let bridge = Bridge {
        server,
        stream: Arc::default(),
    };
    let app = Router::new()
        .route("/sse", get(open_stream))
        .route("/messages", post(post_message))
        .with_state(bridge);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}/sse")
}

#[tokio::test]
async fn test_endpoint_event_redirects_posts() {
    let url = serve().await;
    let transport = SseTransport::connect(&url).await.unwrap();
    let (_reader, writer) = transport.split();
    assert_eq!(writer.endpoint().path(), "/messages");
}

#[tokio::test]
async fn test_client_over_event_stream() {
    let url = serve().await;
    let transport = SseTransport::connect(&url).await.unwrap();
    let client = timeout(Duration::from_secs(5), McpClient::connect(transport))
        .await
        .expect("handshake timed out")
        .unwrap();
    assert_eq!(client.server_info().unwrap().name, "sse-it");

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let result = client
        .call_tool("echo", json!({"input": "over http"}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.first_text(), Some("over http"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let error = SseTransport::connect(&format!("http://{addr}/sse"))
        .await
        .unwrap_err();
    assert!(matches!(error, capstan_mcp::McpError::Http(_)));
}
