//! A minimal MCP server over stdio with one tool, one prompt and one resource.
//!
//! Run with: cargo run --example stdio_server -p capstan-mcp
//!
//! Logs go to stderr; stdout carries the protocol.

use std::borrow::Cow;

use capstan_core::{Prompt, Resource, Tool};
use capstan_mcp::McpServer;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

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
struct ReviewArgs {
    /// Code to review.
    code: String,
}

struct Review;

impl Prompt for Review {
    fn name(&self) -> Cow<'static, str> {
        "review".into()
    }
    fn description(&self) -> Cow<'static, str> {
        "Asks for a code review".into()
    }
    type Arguments = ReviewArgs;
    type Output = String;

    async fn get(&self, args: ReviewArgs) -> capstan_core::Result {
        Ok(format!("Please review this code:\n\n{}", args.code))
    }
}

struct Motd;

impl Resource for Motd {
    fn uri(&self) -> Cow<'static, str> {
        "motd://today".into()
    }
    fn name(&self) -> Cow<'static, str> {
        "motd".into()
    }
    type Arguments = ();
    type Output = String;

    async fn read(&self, (): ()) -> capstan_core::Result {
        Ok("Have a productive day.".to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let server = McpServer::new("capstan-example", env!("CARGO_PKG_VERSION"));
    server.catalog().tools.register(Echo);
    server.catalog().prompts.register(Review);
    server.catalog().resources.register(Motd);

    server.serve_stdio().await?;
    Ok(())
}
