use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message received from the platform, after mention stripping.
///
/// Immutable once built; `id` is the dedup identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Platform-native message id (Discord snowflake).
    pub id: String,

    /// Platform-native channel id the message arrived on.
    pub channel_id: String,

    /// Human-readable display name of the sender.
    pub author: String,

    /// Plain text content with mention markup removed.
    pub text: String,

    /// Remote binaries referenced by the message.
    #[serde(default)]
    pub attachment_refs: Vec<AttachmentRef>,

    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            author: author.into(),
            text: text.into(),
            attachment_refs: Vec::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_attachments(mut self, refs: Vec<AttachmentRef>) -> Self {
        self.attachment_refs = refs;
        self
    }
}

/// Pointer to a remote blob. Never carries the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub filename: String,
    /// Size declared by the platform, in bytes.
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

impl AttachmentRef {
    /// Build a ref for a bare URL (e.g. an image link found in text).
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let filename = path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("attachment")
            .to_string();
        Self {
            url: url.to_string(),
            filename,
            size: None,
            content_type: None,
        }
    }
}

/// A file to upload alongside an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub filename: String,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_ignores_query() {
        let r = AttachmentRef::from_url("https://cdn.example.com/a/b/cat.png?size=large#x");
        assert_eq!(r.filename, "cat.png");
        assert_eq!(r.size, None);
    }

    #[test]
    fn filename_falls_back_for_trailing_slash() {
        let r = AttachmentRef::from_url("https://example.com/");
        assert_eq!(r.filename, "attachment");
    }

    #[test]
    fn event_serializes_without_loss() {
        let ev = InboundEvent::new("1", "2", "ann", "hi").with_attachments(vec![
            AttachmentRef::from_url("https://x/y.jpg"),
        ]);
        let json = serde_json::to_string(&ev).unwrap();
        let back: InboundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }
}
