//! The uniform result envelope returned from every tool invocation.

use serde::{Deserialize, Serialize};

use crate::content::{
    AudioContent, Content, EmbeddedResource, ImageContent, ResourceContents, TextContent,
    VideoContent,
};

/// Result of a tool call.
///
/// Failures are encoded in-band: `is_error` is `true` and `content` holds a
/// single text item with the failure message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Result content, in production order.
    #[serde(default)]
    pub content: Vec<Content>,
    /// Whether this is an error result.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Creates a successful result over the given content.
    #[must_use]
    pub fn success(content: impl IntoIterator<Item = Content>) -> Self {
        Self {
            content: content.into_iter().collect(),
            is_error: false,
        }
    }

    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::success([Content::text(text)])
    }

    /// Creates an error result carrying one text item.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }

    /// Result holding only images.
    #[must_use]
    pub fn images(images: impl IntoIterator<Item = ImageContent>) -> Self {
        Self::success(images.into_iter().map(Content::Image))
    }

    /// Result holding only audio clips.
    #[must_use]
    pub fn audios(audios: impl IntoIterator<Item = AudioContent>) -> Self {
        Self::success(audios.into_iter().map(Content::Audio))
    }

    /// Result holding only videos.
    #[must_use]
    pub fn videos(videos: impl IntoIterator<Item = VideoContent>) -> Self {
        Self::success(videos.into_iter().map(Content::Video))
    }

    /// Result holding only embedded resources.
    #[must_use]
    pub fn resources(resources: impl IntoIterator<Item = EmbeddedResource>) -> Self {
        Self::success(resources.into_iter().map(Content::Resource))
    }

    /// Result holding a heterogeneous sequence of content.
    #[must_use]
    pub fn mixed(contents: impl IntoIterator<Item = Content>) -> Self {
        Self::success(contents)
    }

    /// Starts an incremental builder.
    #[must_use]
    pub fn builder() -> ContentBuilder {
        ContentBuilder::new()
    }

    /// Text of the first content item, if it is text.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(Content::as_text)
    }
}

impl From<String> for CallToolResult {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&str> for CallToolResult {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<()> for CallToolResult {
    fn from((): ()) -> Self {
        Self::success([])
    }
}

impl From<Content> for CallToolResult {
    fn from(content: Content) -> Self {
        Self::success([content])
    }
}

impl From<Vec<Content>> for CallToolResult {
    fn from(content: Vec<Content>) -> Self {
        Self::success(content)
    }
}

impl From<ContentBuilder> for CallToolResult {
    fn from(builder: ContentBuilder) -> Self {
        builder.build()
    }
}

/// Accumulates content items and finalizes them into a [`CallToolResult`].
///
/// ```rust
/// use capstan_core::CallToolResult;
///
/// let result = CallToolResult::builder()
///     .text("here is the chart")
///     .image("iVBORw0KGgo=", "image/png")
///     .build();
/// assert_eq!(result.content.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContentBuilder {
    contents: Vec<Content>,
}

impl ContentBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            contents: Vec::new(),
        }
    }

    /// Appends text.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.push(TextContent::new(text))
    }

    /// Appends a base64 image.
    #[must_use]
    pub fn image(self, data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.push(ImageContent::new(data, mime_type))
    }

    /// Appends base64 audio.
    #[must_use]
    pub fn audio(self, data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.push(AudioContent::new(data, mime_type))
    }

    /// Appends a base64 video.
    #[must_use]
    pub fn video(self, data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.push(VideoContent::new(data, mime_type))
    }

    /// Appends an embedded resource.
    #[must_use]
    pub fn resource(self, resource: ResourceContents) -> Self {
        self.push(EmbeddedResource::new(resource))
    }

    /// Appends a text resource. `mime_type` defaults to `text/plain`.
    #[must_use]
    pub fn text_resource(
        self,
        uri: impl Into<String>,
        text: impl Into<String>,
        mime_type: Option<&str>,
    ) -> Self {
        self.resource(ResourceContents::text(uri, text, mime_type))
    }

    /// Appends a base64 binary resource.
    #[must_use]
    pub fn blob_resource(
        self,
        uri: impl Into<String>,
        blob: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        self.resource(ResourceContents::blob(uri, blob, mime_type))
    }

    /// Appends any content item.
    #[must_use]
    pub fn push(mut self, content: impl Into<Content>) -> Self {
        self.contents.push(content.into());
        self
    }

    /// Number of items appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Finalizes into a successful result.
    #[must_use]
    pub fn build(self) -> CallToolResult {
        CallToolResult::mixed(self.contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_result_shape() {
        let result = CallToolResult::error("boom");
        assert!(result.is_error);
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.first_text(), Some("boom"));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"content": [{"type": "text", "text": "boom"}], "isError": true})
        );
    }

    #[test]
    fn missing_is_error_defaults_to_false() {
        let result: CallToolResult =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "ok"}]})).unwrap();
        assert!(!result.is_error);
    }

    #[test]
    fn builder_preserves_append_order() {
        let result = CallToolResult::builder()
            .text("first")
            .image("aW1n", "image/png")
            .audio("YXVk", "audio/wav")
            .video("dmlk", "video/mp4")
            .text_resource("test://doc", "body", None)
            .blob_resource("test://bin", "AAE=", "application/octet-stream")
            .text("last")
            .build();

        let kinds: Vec<_> = result.content.iter().map(Content::kind).collect();
        assert_eq!(
            kinds,
            ["text", "image", "audio", "video", "resource", "resource", "text"]
        );
        assert_eq!(result.content.last().and_then(Content::as_text), Some("last"));
        assert!(!result.is_error);
    }

    #[test]
    fn homogeneous_lists() {
        let result = CallToolResult::images([
            ImageContent::new("YQ==", "image/png"),
            ImageContent::new("Yg==", "image/jpeg"),
        ]);
        assert!(result.content.iter().all(|c| c.kind() == "image"));
        assert_eq!(result.content.len(), 2);

        let result = CallToolResult::resources([EmbeddedResource::from_text("a://1", "x", None)]);
        assert_eq!(result.content[0].kind(), "resource");
    }

    #[test]
    fn plain_values_convert() {
        assert_eq!(CallToolResult::from("hi").first_text(), Some("hi"));
        assert_eq!(CallToolResult::from(String::from("hi")).first_text(), Some("hi"));
        assert!(CallToolResult::from(()).content.is_empty());
    }
}
