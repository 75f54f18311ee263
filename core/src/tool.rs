//! # Tools
//!
//! A tool is a named, schema-described function a caller can invoke with a
//! JSON argument bag. Implement [`Tool`] by hand, or annotate a plain function
//! with `#[capstan::tool]` to generate the implementation.
//!
//! ```rust
//! use std::borrow::Cow;
//! use capstan_core::Tool;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(JsonSchema, Deserialize)]
//! struct MathArgs {
//!     /// Operation: "add", "subtract", "multiply", "divide"
//!     operation: String,
//!     a: f64,
//!     b: f64,
//! }
//!
//! struct Calculator;
//!
//! impl Tool for Calculator {
//!     fn name(&self) -> Cow<'static, str> {
//!         "calculator".into()
//!     }
//!     fn description(&self) -> Cow<'static, str> {
//!         "Performs basic math operations".into()
//!     }
//!     type Arguments = MathArgs;
//!     type Output = String;
//!
//!     async fn call(&self, args: Self::Arguments) -> capstan_core::Result {
//!         let result = match args.operation.as_str() {
//!             "add" => args.a + args.b,
//!             "subtract" => args.a - args.b,
//!             "multiply" => args.a * args.b,
//!             "divide" if args.b != 0.0 => args.a / args.b,
//!             "divide" => return Err(anyhow::Error::msg("Division by zero")),
//!             _ => return Err(anyhow::Error::msg("Unknown operation")),
//!         };
//!         Ok(result.to_string())
//!     }
//! }
//! ```
//!
//! Tools are executed through a [`ToolHandler`], which binds the raw
//! arguments against the tool's [`InputSchema`] and turns every failure,
//! panics included, into an error [`CallToolResult`].

use std::any::Any;
use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_lite::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::result::CallToolResult;
use crate::schema::{InputSchema, ParamOverride};

/// A capability that callers invoke with arguments.
pub trait Tool: Send + Sync + 'static {
    /// Tool name. Must be unique within a registry.
    fn name(&self) -> Cow<'static, str>;
    /// Tool description shown to callers.
    fn description(&self) -> Cow<'static, str>;
    /// Optional human-readable title.
    fn title(&self) -> Option<Cow<'static, str>> {
        None
    }
    /// Per-parameter adjustments on top of the derived schema.
    fn parameter_overrides(&self) -> &'static [ParamOverride] {
        &[]
    }

    /// Tool arguments type.
    type Arguments: JsonSchema + DeserializeOwned + Send;
    /// Tool output, converted into a [`CallToolResult`].
    type Output: Into<CallToolResult> + Send;

    /// Executes the tool with the provided arguments.
    fn call(&self, arguments: Self::Arguments)
    -> impl Future<Output = Result<Self::Output>> + Send;
}

/// Serializes a value to a JSON string.
///
/// Strings are returned verbatim rather than quoted.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(value
        .as_str()
        .map_or_else(|| format!("{value:#}"), ToString::to_string))
}

/// Tool metadata advertised to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    name: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<Cow<'static, str>>,
    #[serde(default)]
    description: Cow<'static, str>,
    input_schema: InputSchema,
}

impl ToolDefinition {
    /// Creates the definition of a tool.
    #[must_use]
    pub fn new<T: Tool>(tool: &T) -> Self {
        Self {
            name: tool.name(),
            title: tool.title(),
            description: tool.description(),
            input_schema: InputSchema::of::<T::Arguments>()
                .with_overrides(tool.parameter_overrides()),
        }
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool title, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameter schema.
    #[must_use]
    pub const fn input_schema(&self) -> &InputSchema {
        &self.input_schema
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

trait ErasedTool: Send + Sync {
    fn call(&self, arguments: Map<String, Value>) -> BoxFuture<'_, Result<CallToolResult>>;
}

impl<T: Tool> ErasedTool for T {
    fn call(&self, arguments: Map<String, Value>) -> BoxFuture<'_, Result<CallToolResult>> {
        Box::pin(async move {
            let arguments: T::Arguments = decode_arguments(arguments)?;
            Ok(Tool::call(self, arguments).await?.into())
        })
    }
}

/// Invocation handler for one registered tool.
pub struct ToolHandler {
    definition: ToolDefinition,
    tool: Box<dyn ErasedTool>,
}

impl Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandler")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl ToolHandler {
    /// Wraps a tool.
    #[must_use]
    pub fn new<T: Tool>(tool: T) -> Self {
        Self {
            definition: ToolDefinition::new(&tool),
            tool: Box::new(tool),
        }
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Tool definition.
    #[must_use]
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Runs the tool. Never fails: binding errors, tool errors and panics all
    /// come back as an error result.
    pub async fn call(&self, arguments: Map<String, Value>) -> CallToolResult {
        let binding = match self.definition.input_schema.bind(arguments) {
            Ok(binding) => binding,
            Err(err) => return CallToolResult::error(err.to_string()),
        };

        match AssertUnwindSafe(self.tool.call(binding.into_arguments()))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => CallToolResult::error(err.to_string()),
            Err(panic) => CallToolResult::error(panic_message(panic.as_ref())),
        }
    }
}

/// Deserializes bound arguments. An empty bag also satisfies `()`.
pub(crate) fn decode_arguments<T: DeserializeOwned>(
    arguments: Map<String, Value>,
) -> serde_json::Result<T> {
    if arguments.is_empty() {
        if let Ok(unit) = serde_json::from_value(Value::Null) {
            return Ok(unit);
        }
    }
    serde_json::from_value(Value::Object(arguments))
}

/// Message carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "capability panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use serde_json::json;

    #[derive(JsonSchema, Deserialize, Debug, PartialEq)]
    struct CalculatorArgs {
        operation: String,
        a: f64,
        b: f64,
    }

    struct Calculator;

    impl Tool for Calculator {
        fn name(&self) -> Cow<'static, str> {
            "calculator".into()
        }
        fn description(&self) -> Cow<'static, str> {
            "Performs basic mathematical operations".into()
        }
        type Arguments = CalculatorArgs;
        type Output = String;

        async fn call(&self, args: Self::Arguments) -> Result {
            match args.operation.as_str() {
                "add" => Ok((args.a + args.b).to_string()),
                "multiply" => Ok((args.a * args.b).to_string()),
                "divide" => {
                    if args.b == 0.0 {
                        Err(anyhow::Error::msg("Division by zero"))
                    } else {
                        Ok((args.a / args.b).to_string())
                    }
                }
                "explode" => panic!("calculator exploded"),
                _ => Err(anyhow::Error::msg(format!(
                    "Unknown operation: {}",
                    args.operation
                ))),
            }
        }
    }

    struct Gallery;

    impl Tool for Gallery {
        fn name(&self) -> Cow<'static, str> {
            "gallery".into()
        }
        fn description(&self) -> Cow<'static, str> {
            "Returns mixed content".into()
        }
        type Arguments = ();
        type Output = CallToolResult;

        async fn call(&self, (): ()) -> Result<CallToolResult> {
            Ok(CallToolResult::builder()
                .text("caption")
                .image("aGk=", "image/png")
                .build())
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn json_utility() {
        let value = json!({
            "name": "test",
            "value": 42
        });

        let json_str = json(&value).unwrap();
        assert!(json_str.contains("\"name\": \"test\""));
        assert!(json_str.contains("\"value\": 42"));
        assert_eq!(json(&"plain").unwrap(), "plain");
    }

    #[test]
    fn tool_definition_creation() {
        let definition = ToolDefinition::new(&Calculator);

        assert_eq!(definition.name(), "calculator");
        assert_eq!(
            definition.description(),
            "Performs basic mathematical operations"
        );
        let required: Vec<_> = definition.input_schema().required().collect();
        assert_eq!(required.len(), 3);

        let wire = serde_json::to_value(&definition).unwrap();
        assert_eq!(wire["inputSchema"]["type"], "object");
        assert!(wire.get("title").is_none());
    }

    #[tokio::test]
    async fn string_output_becomes_text_result() {
        let handler = ToolHandler::new(Calculator);
        let result = handler
            .call(args(json!({"operation": "add", "a": 5, "b": 3})))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, vec![Content::text("8")]);
    }

    #[tokio::test]
    async fn numeric_strings_are_coerced() {
        let handler = ToolHandler::new(Calculator);
        let result = handler
            .call(args(json!({"operation": "multiply", "a": "4", "b": "2.5"})))
            .await;
        assert_eq!(result.first_text(), Some("10"));
    }

    #[tokio::test]
    async fn errors_become_error_results() {
        let handler = ToolHandler::new(Calculator);
        let result = handler
            .call(args(json!({"operation": "divide", "a": 10, "b": 0})))
            .await;
        assert!(result.is_error);
        assert_eq!(result.content, vec![Content::text("Division by zero")]);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let handler = ToolHandler::new(Calculator);
        let result = handler
            .call(args(json!({"operation": "explode", "a": 0, "b": 0})))
            .await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("calculator exploded"));
    }

    #[tokio::test]
    async fn bind_errors_become_error_results() {
        let handler = ToolHandler::new(Calculator);
        let result = handler
            .call(args(json!({"operation": "add", "a": "five", "b": 1})))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("`a`"));
    }

    #[tokio::test]
    async fn unit_arguments_and_rich_output() {
        let handler = ToolHandler::new(Gallery);
        assert!(handler.definition().input_schema().params().is_empty());

        let result = handler.call(Map::new()).await;
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 2);
        assert_eq!(result.content[1].kind(), "image");
    }

    #[test]
    fn handler_debug() {
        let handler = ToolHandler::new(Calculator);
        let debug_str = format!("{handler:?}");
        assert!(debug_str.contains("ToolHandler"));
        assert!(debug_str.contains("calculator"));
    }
}
