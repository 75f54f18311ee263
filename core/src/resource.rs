//! Addressable resources.
//!
//! A resource is read by URI. Its address is either a concrete URI
//! (`config://app`) or a URI template with `{variable}` placeholders
//! (`test://{name}`). Template variables are bound to the resource's
//! arguments the same way tool arguments are.

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_lite::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::content::ResourceContents;
use crate::schema::InputSchema;
use crate::tool::{decode_arguments, panic_message};

/// MIME type used for raw byte output.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A capability read by URI.
pub trait Resource: Send + Sync + 'static {
    /// Concrete URI or URI template.
    fn uri(&self) -> Cow<'static, str>;
    /// Resource name.
    fn name(&self) -> Cow<'static, str>;
    /// Resource description.
    fn description(&self) -> Option<Cow<'static, str>> {
        None
    }
    /// MIME type of the contents.
    fn mime_type(&self) -> Option<Cow<'static, str>> {
        None
    }

    /// Template variables. Use `()` for concrete URIs.
    type Arguments: JsonSchema + DeserializeOwned + Send;
    /// Read output.
    type Output: IntoContents + Send;

    /// Reads the resource.
    fn read(&self, arguments: Self::Arguments) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// Conversion of a read output into resource contents.
pub trait IntoContents {
    /// Converts `self`, addressed at `uri`.
    fn into_contents(self, uri: &str, mime_type: Option<&str>) -> Vec<ResourceContents>;
}

impl IntoContents for String {
    fn into_contents(self, uri: &str, mime_type: Option<&str>) -> Vec<ResourceContents> {
        vec![ResourceContents::text(uri, self, mime_type)]
    }
}

impl IntoContents for &str {
    fn into_contents(self, uri: &str, mime_type: Option<&str>) -> Vec<ResourceContents> {
        self.to_string().into_contents(uri, mime_type)
    }
}

impl IntoContents for Vec<u8> {
    fn into_contents(self, uri: &str, mime_type: Option<&str>) -> Vec<ResourceContents> {
        vec![ResourceContents::blob(
            uri,
            STANDARD.encode(self),
            mime_type.unwrap_or(OCTET_STREAM),
        )]
    }
}

impl IntoContents for ResourceContents {
    fn into_contents(self, _uri: &str, _mime_type: Option<&str>) -> Vec<ResourceContents> {
        vec![self]
    }
}

impl IntoContents for Vec<ResourceContents> {
    fn into_contents(self, _uri: &str, _mime_type: Option<&str>) -> Vec<ResourceContents> {
        self
    }
}

/// Concrete resource advertised by `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Resource URI.
    pub uri: String,
    /// Resource name.
    pub name: String,
    /// Resource description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Templated resource advertised by `resources/templates/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDefinition {
    /// URI template, e.g. `test://{name}`.
    pub uri_template: String,
    /// Resource name.
    pub name: String,
    /// Resource description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Contents read.
    pub contents: Vec<ResourceContents>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable { name: String, reserved: bool },
}

/// A URI template supporting `{var}` and `{+var}` expressions.
///
/// `{var}` matches one path segment (no `/`); `{+var}` may span segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parses a template. Unterminated braces are kept literally.
    #[must_use]
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let expression = &rest[start + 1..start + len];
            let (reserved, name) = expression
                .strip_prefix('+')
                .map_or((false, expression), |name| (true, name));
            segments.push(Segment::Variable {
                name: name.to_string(),
                reserved,
            });
            rest = &rest[start + len + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Self { segments }
    }

    /// Whether the template has any variables.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Variable { .. }))
    }

    /// Variable names in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches a concrete URI, returning the variable bindings.
    #[must_use]
    pub fn matches(&self, uri: &str) -> Option<Map<String, Value>> {
        let mut bindings = Map::new();
        let mut rest = uri;
        let mut segments = self.segments.iter().peekable();

        while let Some(segment) = segments.next() {
            match segment {
                Segment::Literal(literal) => rest = rest.strip_prefix(literal.as_str())?,
                Segment::Variable { name, reserved } => {
                    let end = match segments.peek() {
                        Some(Segment::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let value = &rest[..end];
                    if value.is_empty() || (!reserved && value.contains('/')) {
                        return None;
                    }
                    bindings.insert(name.clone(), Value::String(value.to_string()));
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(bindings)
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

trait ErasedResource: Send + Sync {
    fn read<'a>(
        &'a self,
        uri: &'a str,
        mime_type: Option<&'a str>,
        arguments: Map<String, Value>,
    ) -> BoxFuture<'a, Result<Vec<ResourceContents>>>;
}

impl<R: Resource> ErasedResource for R {
    fn read<'a>(
        &'a self,
        uri: &'a str,
        mime_type: Option<&'a str>,
        arguments: Map<String, Value>,
    ) -> BoxFuture<'a, Result<Vec<ResourceContents>>> {
        Box::pin(async move {
            let arguments: R::Arguments = decode_arguments(arguments)?;
            Ok(Resource::read(self, arguments)
                .await?
                .into_contents(uri, mime_type))
        })
    }
}

/// Read handler for one registered resource.
pub struct ResourceHandler {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    template: UriTemplate,
    schema: InputSchema,
    resource: Box<dyn ErasedResource>,
}

impl Debug for ResourceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandler")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ResourceHandler {
    /// Wraps a resource.
    #[must_use]
    pub fn new<R: Resource>(resource: R) -> Self {
        let uri = resource.uri().into_owned();
        Self {
            template: UriTemplate::parse(&uri),
            name: resource.name().into_owned(),
            description: resource.description().map(Cow::into_owned),
            mime_type: resource.mime_type().map(Cow::into_owned),
            schema: InputSchema::of::<R::Arguments>(),
            uri,
            resource: Box::new(resource),
        }
    }

    /// Registered URI or URI template. Used as the registry key.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this resource is addressed by a template.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.template.is_template()
    }

    /// Matches a concrete URI against this resource's address.
    #[must_use]
    pub fn matches(&self, uri: &str) -> Option<Map<String, Value>> {
        if self.is_template() {
            self.template.matches(uri)
        } else {
            (self.uri == uri).then(Map::new)
        }
    }

    /// Definition for `resources/list`. `None` for templates.
    #[must_use]
    pub fn definition(&self) -> Option<ResourceDefinition> {
        (!self.is_template()).then(|| ResourceDefinition {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        })
    }

    /// Definition for `resources/templates/list`. `None` for concrete URIs.
    #[must_use]
    pub fn template_definition(&self) -> Option<ResourceTemplateDefinition> {
        self.is_template().then(|| ResourceTemplateDefinition {
            uri_template: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        })
    }

    /// Reads the resource at `uri` with the variables bound from it.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the resource body fails or panics.
    pub async fn read(&self, uri: &str, variables: Map<String, Value>) -> Result<ReadResourceResult> {
        let arguments = self.schema.bind(variables)?.into_arguments();
        let read = self
            .resource
            .read(uri, self.mime_type.as_deref(), arguments);
        match AssertUnwindSafe(read).catch_unwind().await {
            Ok(contents) => Ok(ReadResourceResult {
                contents: contents?,
            }),
            Err(panic) => Err(anyhow::Error::msg(panic_message(panic.as_ref()))),
        }
    }
}
