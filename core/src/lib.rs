//! # capstan-core
//!
//! Capability model for hosts speaking the Model Context Protocol.
//!
//! A host exposes three kinds of capabilities:
//!
//! | Kind | Trait | Invoked with |
//! |------|-------|--------------|
//! | **Tools** | [`Tool`] | `tools/call` |
//! | **Prompts** | [`Prompt`] | `prompts/get` |
//! | **Resources** | [`Resource`] | `resources/read` |
//!
//! Each capability is wrapped in a handler ([`ToolHandler`], [`PromptHandler`],
//! [`ResourceHandler`]) that binds the caller's untyped JSON arguments against
//! a schema derived from the capability's argument type and contains every
//! failure. Handlers live in a [`Catalog`] owned by one server.
//!
//! ```text
//! ┌──────────────┐   register   ┌──────────────┐   lookup + call   ┌──────────────┐
//! │  Host code   │─────────────▶│   Catalog    │◀──────────────────│ Dispatch loop│
//! │ #[tool] fns  │              │ tools        │                   │ (capstan-mcp)│
//! │ impl Tool    │              │ prompts      │──────────────────▶│              │
//! └──────────────┘              │ resources    │  CallToolResult   └──────────────┘
//!                               └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::borrow::Cow;
//! use capstan_core::{Catalog, Tool};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(JsonSchema, Deserialize)]
//! struct EchoArgs {
//!     input: String,
//! }
//!
//! struct Echo;
//!
//! impl Tool for Echo {
//!     fn name(&self) -> Cow<'static, str> {
//!         "echo".into()
//!     }
//!     fn description(&self) -> Cow<'static, str> {
//!         "Echoes the input back".into()
//!     }
//!     type Arguments = EchoArgs;
//!     type Output = String;
//!
//!     async fn call(&self, args: EchoArgs) -> capstan_core::Result {
//!         Ok(args.input)
//!     }
//! }
//!
//! let catalog = Catalog::new();
//! catalog.tools.register(Echo);
//! assert_eq!(catalog.tools.names(), ["echo"]);
//! ```

pub mod content;
pub mod prompt;
pub mod registry;
pub mod resource;
pub mod result;
pub mod schema;
pub mod tool;

#[doc(inline)]
pub use content::{
    Annotations, AudioContent, Content, ContentError, EmbeddedResource, ImageContent,
    ResourceBody, ResourceContents, TextContent, VideoContent,
};
#[doc(inline)]
pub use prompt::{
    GetPromptResult, Prompt, PromptArgument, PromptDefinition, PromptHandler, PromptMessage, Role,
};
#[doc(inline)]
pub use registry::{
    Capability, CapabilityKind, Catalog, ListChanged, Prompts, Registry, Resources, Tools,
};
#[doc(inline)]
pub use resource::{
    IntoContents, ReadResourceResult, Resource, ResourceDefinition, ResourceHandler,
    ResourceTemplateDefinition, UriTemplate,
};
#[doc(inline)]
pub use result::{CallToolResult, ContentBuilder};
#[doc(inline)]
pub use schema::{ArgumentSource, BindError, Binding, InputSchema, Param, ParamOverride, Shape};
#[doc(inline)]
pub use tool::{Tool, ToolDefinition, ToolHandler, json};

/// Result type used by capability bodies.
///
/// Type alias for [`anyhow::Result<T>`](anyhow::Result) with [`String`] as default success type.
pub type Result<T = String> = anyhow::Result<T>;

pub use anyhow::Error;
