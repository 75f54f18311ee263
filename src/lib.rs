//! # capstan
//!
//! High level façade crate that re-exports everything from [`capstan_core`] plus the
//! `#[tool]`, `#[prompt]` and `#[resource]` attribute macros, and the MCP runtime as
//! [`mcp`]. Pull this crate into your binary to publish typed capabilities to any
//! Model Context Protocol client, or to call the capabilities of any MCP server.
//!
//! ## What's inside?
//!
//! - [`Tool`], [`Prompt`] and [`Resource`] traits with JSON-schema derived argument
//!   descriptions and lenient argument binding.
//! - A live [`Catalog`] whose registries announce every change.
//! - The uniform [`CallToolResult`] / [`Content`] model shared by both sides of the wire.
//! - `#[tool]`-style macros that turn plain functions into capabilities.
//!
//! ## Example
//!
//! ```rust,no_run
//! use capstan::{mcp::McpServer, tool};
//!
//! /// Adds two numbers.
//! #[tool]
//! fn add(a: f64, b: f64) -> String {
//!     (a + b).to_string()
//! }
//!
//! async fn serve() -> Result<(), capstan::mcp::McpError> {
//!     let server = McpServer::new("calculator", "1.0.0");
//!     server.catalog().tools.register(Add);
//!     server.serve_stdio().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`capstan_core::tool`]: tools, definitions and the panic-safe handler.
//! - [`capstan_core::prompt`] and [`capstan_core::resource`]: prompt templates and
//!   (templated) resources.
//! - [`capstan_core::schema`]: input schemas and argument coercion.
//! - [`mcp`]: JSON-RPC protocol, transports, server and client.

pub use capstan_core::*;
#[cfg(feature = "derive")]
pub use capstan_derive::{prompt, resource, tool};
#[cfg(feature = "mcp")]
pub use capstan_mcp as mcp;

#[doc(hidden)]
/// For internal use only.
pub mod __private {
    pub use schemars;
    pub use serde;
}
