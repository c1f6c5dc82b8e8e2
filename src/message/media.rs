use std::sync::Arc;

use super::non_blank;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("media url must not be blank")]
    BlankUrl,
    #[error("media bytes must not be empty")]
    EmptyBytes,
    #[error("platform file reference needs a platform and a file id")]
    BlankPlatformFile,
}

/// Reference to media content. Exactly one of: a remote URL, in-memory bytes,
/// or a platform-specific file identifier (e.g. a Telegram `file_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Url(UrlRef),
    Bytes(BytesRef),
    PlatformFile(PlatformFileRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRef {
    url: String,
}

impl UrlRef {
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Media held in memory. The bytes are owned and never mutated after construction,
/// so clones share one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesRef {
    name: Option<String>,
    bytes: Arc<[u8]>,
    mime: Option<String>,
}

impl BytesRef {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFileRef {
    platform: String,
    file_id: String,
}

impl PlatformFileRef {
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }
}

impl MediaRef {
    pub fn url(url: impl Into<String>) -> Result<Self, MediaError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(MediaError::BlankUrl);
        }
        Ok(MediaRef::Url(UrlRef { url }))
    }

    /// Copies `bytes` into an owned buffer.
    pub fn bytes(
        name: Option<String>,
        bytes: impl AsRef<[u8]>,
        mime: Option<String>,
    ) -> Result<Self, MediaError> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(MediaError::EmptyBytes);
        }
        Ok(MediaRef::Bytes(BytesRef {
            name: non_blank(name),
            bytes: Arc::from(bytes),
            mime: non_blank(mime),
        }))
    }

    pub fn platform_file(
        platform: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Result<Self, MediaError> {
        let platform = platform.into();
        let file_id = file_id.into();
        if platform.trim().is_empty() || file_id.trim().is_empty() {
            return Err(MediaError::BlankPlatformFile);
        }
        Ok(MediaRef::PlatformFile(PlatformFileRef { platform, file_id }))
    }
}

/// An image or file segment, shared by inbound and outbound messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    media: MediaRef,
    caption: Option<String>,
    name: Option<String>,
    mime: Option<String>,
    size: Option<u64>,
}

impl MediaPart {
    pub fn new(media: MediaRef) -> Self {
        Self {
            media,
            caption: None,
            name: None,
            mime: None,
            size: None,
        }
    }

    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = non_blank(caption);
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = non_blank(name);
        self
    }

    pub fn with_mime(mut self, mime: Option<String>) -> Self {
        self.mime = non_blank(mime);
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size.filter(|s| *s > 0);
        self
    }

    pub fn media(&self) -> &MediaRef {
        &self.media
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }
}
