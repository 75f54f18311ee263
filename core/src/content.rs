//! Content payloads carried inside tool results and prompt messages.
//!
//! Every payload is one variant of the closed [`Content`] enum and serializes
//! with a `type` discriminator:
//!
//! ```json
//! { "type": "text", "text": "hello" }
//! { "type": "image", "data": "iVBORw0...", "mimeType": "image/png" }
//! { "type": "resource", "resource": { "uri": "file:///a.txt", "mimeType": "text/plain", "text": "..." } }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default MIME type for text resources.
pub const TEXT_PLAIN: &str = "text/plain";

/// Errors raised when building content from invalid parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// A resource carried both `text` and `blob`.
    #[error("resource `{uri}` must not carry both text and blob")]
    BothTextAndBlob {
        /// Resource URI.
        uri: String,
    },
    /// A resource carried neither `text` nor `blob`.
    #[error("resource `{uri}` must carry either text or blob")]
    MissingBody {
        /// Resource URI.
        uri: String,
    },
}

/// One typed payload unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text(TextContent),
    /// Base64-encoded image.
    Image(ImageContent),
    /// Base64-encoded audio.
    Audio(AudioContent),
    /// Base64-encoded video.
    Video(VideoContent),
    /// Embedded resource.
    Resource(EmbeddedResource),
}

impl Content {
    /// Creates text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent::new(text))
    }

    /// Creates image content from base64 data.
    #[must_use]
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image(ImageContent::new(data, mime_type))
    }

    /// Creates audio content from base64 data.
    #[must_use]
    pub fn audio(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Audio(AudioContent::new(data, mime_type))
    }

    /// Creates video content from base64 data.
    #[must_use]
    pub fn video(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Video(VideoContent::new(data, mime_type))
    }

    /// Creates embedded resource content.
    #[must_use]
    pub fn resource(resource: ResourceContents) -> Self {
        Self::Resource(EmbeddedResource::new(resource))
    }

    /// The wire discriminator of this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
            Self::Resource(_) => "resource",
        }
    }

    /// Returns the text if this is text content.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(&text.text),
            _ => None,
        }
    }
}

impl From<TextContent> for Content {
    fn from(value: TextContent) -> Self {
        Self::Text(value)
    }
}

impl From<ImageContent> for Content {
    fn from(value: ImageContent) -> Self {
        Self::Image(value)
    }
}

impl From<AudioContent> for Content {
    fn from(value: AudioContent) -> Self {
        Self::Audio(value)
    }
}

impl From<VideoContent> for Content {
    fn from(value: VideoContent) -> Self {
        Self::Video(value)
    }
}

impl From<EmbeddedResource> for Content {
    fn from(value: EmbeddedResource) -> Self {
        Self::Resource(value)
    }
}

/// Text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    /// Text value.
    pub text: String,
    /// Content annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl TextContent {
    /// Creates text content without annotations.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            annotations: None,
        }
    }
}

macro_rules! binary_content {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            /// Base64-encoded payload.
            pub data: String,
            /// MIME type of the payload.
            pub mime_type: String,
            /// Content annotations.
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub annotations: Option<Annotations>,
        }

        impl $name {
            /// Creates content from already base64-encoded data.
            #[must_use]
            pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
                Self {
                    data: data.into(),
                    mime_type: mime_type.into(),
                    annotations: None,
                }
            }

            /// Creates content by base64-encoding raw bytes.
            #[must_use]
            pub fn from_bytes(bytes: impl AsRef<[u8]>, mime_type: impl Into<String>) -> Self {
                Self::new(STANDARD.encode(bytes), mime_type)
            }

            /// Decodes the base64 payload.
            ///
            /// # Errors
            ///
            /// Returns an error if `data` is not valid base64.
            pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
                STANDARD.decode(&self.data)
            }
        }
    };
}

binary_content!(
    /// Image content (e.g. `image/png`).
    ImageContent
);
binary_content!(
    /// Audio content (e.g. `audio/mpeg`, `audio/wav`).
    AudioContent
);
binary_content!(
    /// Video content (e.g. `video/mp4`, `video/webm`).
    VideoContent
);

/// Resource embedded in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedResource {
    /// The resource contents.
    pub resource: ResourceContents,
    /// Content annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl EmbeddedResource {
    /// Wraps resource contents.
    #[must_use]
    pub const fn new(resource: ResourceContents) -> Self {
        Self {
            resource,
            annotations: None,
        }
    }

    /// Embeds a text resource. `mime_type` defaults to `text/plain`.
    #[must_use]
    pub fn from_text(uri: impl Into<String>, text: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self::new(ResourceContents::text(uri, text, mime_type))
    }

    /// Embeds a binary resource.
    #[must_use]
    pub fn from_blob(
        uri: impl Into<String>,
        blob: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::new(ResourceContents::blob(uri, blob, mime_type))
    }
}

/// Body of a resource: exactly one of text or base64 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBody {
    /// Text body.
    Text(String),
    /// Base64-encoded binary body.
    Blob(String),
}

/// Contents of a resource.
///
/// Serializes as `{ "uri", "mimeType"?, "text" | "blob" }`. Deserializing a
/// value that carries both or neither body field fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawResourceContents", into = "RawResourceContents")]
pub struct ResourceContents {
    uri: String,
    mime_type: Option<String>,
    body: ResourceBody,
}

impl ResourceContents {
    /// Creates text resource contents. `mime_type` defaults to `text/plain`.
    #[must_use]
    pub fn text(uri: impl Into<String>, text: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: Some(mime_type.unwrap_or(TEXT_PLAIN).to_string()),
            body: ResourceBody::Text(text.into()),
        }
    }

    /// Creates binary resource contents from base64 data.
    #[must_use]
    pub fn blob(uri: impl Into<String>, blob: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            body: ResourceBody::Blob(blob.into()),
        }
    }

    /// Creates resource contents from loose parts.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] unless exactly one of `text` and `blob` is given.
    pub fn try_new(
        uri: impl Into<String>,
        mime_type: Option<String>,
        text: Option<String>,
        blob: Option<String>,
    ) -> Result<Self, ContentError> {
        let uri = uri.into();
        let body = match (text, blob) {
            (Some(text), None) => ResourceBody::Text(text),
            (None, Some(blob)) => ResourceBody::Blob(blob),
            (Some(_), Some(_)) => return Err(ContentError::BothTextAndBlob { uri }),
            (None, None) => return Err(ContentError::MissingBody { uri }),
        };
        Ok(Self {
            uri,
            mime_type,
            body,
        })
    }

    /// Resource URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// MIME type, if known.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// The resource body.
    #[must_use]
    pub const fn body(&self) -> &ResourceBody {
        &self.body
    }

    /// Text body, if this is a text resource.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            ResourceBody::Text(text) => Some(text),
            ResourceBody::Blob(_) => None,
        }
    }

    /// Base64 body, if this is a binary resource.
    #[must_use]
    pub fn as_blob(&self) -> Option<&str> {
        match &self.body {
            ResourceBody::Blob(blob) => Some(blob),
            ResourceBody::Text(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResourceContents {
    uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blob: Option<String>,
}

impl TryFrom<RawResourceContents> for ResourceContents {
    type Error = ContentError;

    fn try_from(raw: RawResourceContents) -> Result<Self, Self::Error> {
        Self::try_new(raw.uri, raw.mime_type, raw.text, raw.blob)
    }
}

impl From<ResourceContents> for RawResourceContents {
    fn from(contents: ResourceContents) -> Self {
        let (text, blob) = match contents.body {
            ResourceBody::Text(text) => (Some(text), None),
            ResourceBody::Blob(blob) => (None, Some(blob)),
        };
        Self {
            uri: contents.uri,
            mime_type: contents.mime_type,
            text,
            blob,
        }
    }
}

/// Content annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    /// Target audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<String>>,
    /// Priority level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}
