//! Templated prompts.
//!
//! A prompt turns a small set of named arguments into a list of messages a
//! caller can feed to a model. Returning plain text produces a single `user`
//! message.

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
use crate::content::Content;
use crate::schema::{InputSchema, ParamOverride};
use crate::tool::{decode_arguments, panic_message};

/// A capability that renders messages from arguments.
pub trait Prompt: Send + Sync + 'static {
    /// Prompt name. Must be unique within a registry.
    fn name(&self) -> Cow<'static, str>;
    /// Prompt description.
    fn description(&self) -> Cow<'static, str>;
    /// Optional human-readable title.
    fn title(&self) -> Option<Cow<'static, str>> {
        None
    }
    /// Per-argument adjustments on top of the derived schema.
    fn parameter_overrides(&self) -> &'static [ParamOverride] {
        &[]
    }

    /// Prompt arguments type.
    type Arguments: JsonSchema + DeserializeOwned + Send;
    /// Rendered output.
    type Output: Into<GetPromptResult> + Send;

    /// Renders the prompt.
    fn get(&self, arguments: Self::Arguments) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Assistant,
}

/// One message produced by a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker.
    pub role: Role,
    /// Message body.
    pub content: Content,
}

impl PromptMessage {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<Content>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// A user text message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(Content::text(text))
    }

    /// An assistant text message.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(Content::text(text))
    }
}

/// Result of rendering a prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Description of the rendered prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages in order.
    #[serde(default)]
    pub messages: Vec<PromptMessage>,
}

impl GetPromptResult {
    /// Creates a result from messages.
    #[must_use]
    pub fn new(messages: impl IntoIterator<Item = PromptMessage>) -> Self {
        Self {
            description: None,
            messages: messages.into_iter().collect(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The result reported when rendering fails.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::new([PromptMessage::user_text(format!(
            "Error executing prompt: {message}"
        ))])
        .with_description(format!("Error: {message}"))
    }
}

impl From<String> for GetPromptResult {
    fn from(text: String) -> Self {
        Self::new([PromptMessage::user_text(text)])
    }
}

impl From<&str> for GetPromptResult {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

impl From<PromptMessage> for GetPromptResult {
    fn from(message: PromptMessage) -> Self {
        Self::new([message])
    }
}

impl From<Vec<PromptMessage>> for GetPromptResult {
    fn from(messages: Vec<PromptMessage>) -> Self {
        Self::new(messages)
    }
}

/// A declared prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Argument description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// Prompt metadata advertised to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Prompt name.
    pub name: Cow<'static, str>,
    /// Prompt title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Cow<'static, str>>,
    /// Prompt description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Cow<'static, str>>,
    /// Declared arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

impl PromptDefinition {
    /// Creates the definition of a prompt.
    #[must_use]
    pub fn new<P: Prompt>(prompt: &P) -> Self {
        let description = prompt.description();
        Self {
            name: prompt.name(),
            title: prompt.title(),
            description: (!description.is_empty()).then_some(description),
            arguments: Self::arguments_of(&Self::schema_of(prompt)),
        }
    }

    fn schema_of<P: Prompt>(prompt: &P) -> InputSchema {
        InputSchema::of::<P::Arguments>().with_overrides(prompt.parameter_overrides())
    }

    fn arguments_of(schema: &InputSchema) -> Vec<PromptArgument> {
        schema
            .params()
            .iter()
            .map(|param| PromptArgument {
                name: param.name.clone(),
                description: param.description.clone(),
                required: param.required,
            })
            .collect()
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

trait ErasedPrompt: Send + Sync {
    fn get(&self, arguments: Map<String, Value>) -> BoxFuture<'_, Result<GetPromptResult>>;
}

impl<P: Prompt> ErasedPrompt for P {
    fn get(&self, arguments: Map<String, Value>) -> BoxFuture<'_, Result<GetPromptResult>> {
        Box::pin(async move {
            let arguments: P::Arguments = decode_arguments(arguments)?;
            Ok(Prompt::get(self, arguments).await?.into())
        })
    }
}

/// Invocation handler for one registered prompt.
pub struct PromptHandler {
    definition: PromptDefinition,
    schema: InputSchema,
    prompt: Box<dyn ErasedPrompt>,
}

impl Debug for PromptHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptHandler")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl PromptHandler {
    /// Wraps a prompt.
    #[must_use]
    pub fn new<P: Prompt>(prompt: P) -> Self {
        Self {
            definition: PromptDefinition::new(&prompt),
            schema: PromptDefinition::schema_of(&prompt),
            prompt: Box::new(prompt),
        }
    }

    /// Prompt name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Prompt definition.
    #[must_use]
    pub const fn definition(&self) -> &PromptDefinition {
        &self.definition
    }

    /// Argument schema.
    #[must_use]
    pub const fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Renders the prompt. Failures are folded into the result.
    pub async fn get(&self, arguments: Map<String, Value>) -> GetPromptResult {
        let binding = match self.schema.bind(arguments) {
            Ok(binding) => binding,
            Err(err) => return GetPromptResult::error(&err.to_string()),
        };

        match AssertUnwindSafe(self.prompt.get(binding.into_arguments()))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => GetPromptResult::error(&err.to_string()),
            Err(panic) => GetPromptResult::error(&panic_message(panic.as_ref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema, Deserialize)]
    struct ReviewArgs {
        /// Code to review
        code: String,
        language: Option<String>,
        #[serde(default)]
        strict: bool,
    }

    struct Review;

    impl Prompt for Review {
        fn name(&self) -> Cow<'static, str> {
            "review".into()
        }
        fn description(&self) -> Cow<'static, str> {
            "Reviews a snippet".into()
        }
        fn parameter_overrides(&self) -> &'static [ParamOverride] {
            const OVERRIDES: &[ParamOverride] = &[ParamOverride::new("language").required(true)];
            OVERRIDES
        }
        type Arguments = ReviewArgs;
        type Output = GetPromptResult;

        async fn get(&self, args: ReviewArgs) -> Result<GetPromptResult> {
            if args.code == "fail" {
                anyhow::bail!("nothing to review");
            }
            let language = args.language.unwrap_or_else(|| "text".into());
            Ok(GetPromptResult::new([
                PromptMessage::user_text(format!("Review this {language}: {}", args.code)),
                PromptMessage::assistant_text(if args.strict { "strictly" } else { "gently" }),
            ]))
        }
    }

    struct Greeting;

    impl Prompt for Greeting {
        fn name(&self) -> Cow<'static, str> {
            "greeting".into()
        }
        fn description(&self) -> Cow<'static, str> {
            Cow::Borrowed("")
        }
        type Arguments = ();
        type Output = String;

        async fn get(&self, (): ()) -> Result {
            Ok("Say hello".into())
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn definition_lists_arguments() {
        let handler = PromptHandler::new(Review);
        let definition = handler.definition();

        let code = definition.arguments.iter().find(|a| a.name == "code").unwrap();
        assert!(code.required);
        assert_eq!(code.description.as_deref(), Some("Code to review"));

        let language = definition.arguments.iter().find(|a| a.name == "language").unwrap();
        assert!(language.required);

        let strict = definition.arguments.iter().find(|a| a.name == "strict").unwrap();
        assert!(!strict.required);
    }

    #[test]
    fn empty_description_is_omitted() {
        let wire = serde_json::to_value(PromptDefinition::new(&Greeting)).unwrap();
        assert_eq!(wire, json!({"name": "greeting"}));
    }

    #[tokio::test]
    async fn renders_messages_in_order() {
        let handler = PromptHandler::new(Review);
        let result = handler
            .get(args(json!({"code": "x = 1", "language": "python", "strict": "true"})))
            .await;

        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].role, Role::User);
        assert_eq!(result.messages[0].content.as_text(), Some("Review this python: x = 1"));
        assert_eq!(result.messages[1].content.as_text(), Some("strictly"));
    }

    #[tokio::test]
    async fn text_output_becomes_user_message() {
        let result = PromptHandler::new(Greeting).get(Map::new()).await;
        assert_eq!(result.messages, vec![PromptMessage::user_text("Say hello")]);
        assert!(result.description.is_none());
    }

    #[tokio::test]
    async fn failures_are_reported_in_the_result() {
        let result = PromptHandler::new(Review).get(args(json!({"code": "fail"}))).await;

        assert_eq!(result.description.as_deref(), Some("Error: nothing to review"));
        assert_eq!(
            result.messages,
            vec![PromptMessage::user_text("Error executing prompt: nothing to review")]
        );
    }
}
