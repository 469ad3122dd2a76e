//! Attachment download, content-addressed storage and image packaging.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::LazyLock;

use base64::Engine;
use image::ImageReader;
use regex::Regex;
use relay_agent::ImageSource;
use relay_channels::{AttachmentRef, OutboundFile};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::store::{content_hash, ContentStore};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\((https?://[^\s)]+)\)").expect("markdown image pattern compiles")
});
static BARE_IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[^\s<>()\[\]]+\.(?:png|jpe?g|gif|webp)\b(?:\?[^\s<>()\[\]]*)?")
        .expect("image url pattern compiles")
});

/// Best-effort image metadata. `format` is `"unknown"` when decoding fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
}

impl ImageInfo {
    fn unknown() -> Self {
        Self {
            width: None,
            height: None,
            format: "unknown".to_string(),
        }
    }
}

/// Outcome of processing one [`AttachmentRef`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadedAttachment {
    pub filename: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub content_hash: Option<String>,
    pub is_image: bool,
    #[serde(skip)]
    pub base64_payload: Option<String>,
    pub image_info: Option<ImageInfo>,
    pub stored_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl DownloadedAttachment {
    fn failed(r: &AttachmentRef, error: String) -> Self {
        Self {
            filename: r.filename.clone(),
            size: r.size.unwrap_or(0),
            content_type: r.content_type.clone(),
            content_hash: None,
            is_image: is_image_name(&r.filename),
            base64_payload: None,
            image_info: None,
            stored_path: None,
            error: Some(error),
        }
    }

    /// Media type to declare for an image block.
    pub fn media_type(&self) -> String {
        match &self.content_type {
            Some(ct) if ct.starts_with("image/") => ct.clone(),
            _ => media_type_for(&self.filename).to_string(),
        }
    }

    /// Base64 image block, for successfully downloaded images only.
    pub fn image_source(&self) -> Option<ImageSource> {
        match (&self.error, &self.base64_payload) {
            (None, Some(data)) if self.is_image => {
                Some(ImageSource::base64(self.media_type(), data.clone()))
            }
            _ => None,
        }
    }

    /// Bracketed note telling the agent about an attachment it cannot see
    /// as an image block.
    pub fn note(&self) -> Option<String> {
        if let Some(err) = &self.error {
            return Some(format!("[Attachment '{}' unavailable: {}]", self.filename, err));
        }
        if self.is_image {
            return None;
        }
        let ct = self.content_type.as_deref().unwrap_or("unknown");
        Some(format!(
            "[Attachment: '{}' ({}, {} bytes)]",
            self.filename, ct, self.size
        ))
    }
}

fn extension(name: &str) -> Option<String> {
    let base = name.split(['?', '#']).next().unwrap_or(name);
    let (_, ext) = base.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_image_name(name: &str) -> bool {
    extension(name).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

fn media_type_for(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Read dimensions and format from the header without a full decode.
pub fn image_info(bytes: &[u8]) -> ImageInfo {
    let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(r) => r,
        Err(_) => return ImageInfo::unknown(),
    };
    let Some(format) = reader.format() else {
        return ImageInfo::unknown();
    };
    let format = format!("{format:?}").to_lowercase();
    match reader.into_dimensions() {
        Ok((width, height)) => ImageInfo {
            width: Some(width),
            height: Some(height),
            format,
        },
        Err(_) => ImageInfo {
            width: None,
            height: None,
            format,
        },
    }
}

/// Image URLs mentioned in `text`: markdown images first, then bare links
/// ending in an image extension. Duplicates are dropped.
pub fn image_urls_in(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let markdown = MARKDOWN_IMAGE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str());
    let bare = BARE_IMAGE_URL.find_iter(text).map(|m| m.as_str());
    for url in markdown.chain(bare) {
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Downloads attachments for one bot identity.
pub struct AttachmentPipeline {
    client: reqwest::Client,
    store: ContentStore,
    max_bytes: u64,
    enabled: bool,
}

impl AttachmentPipeline {
    pub fn new(client: reqwest::Client, store: ContentStore, max_bytes: u64, enabled: bool) -> Self {
        Self {
            client,
            store,
            max_bytes,
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Download, hash, store and classify every ref. One record per ref;
    /// failures are recorded, never raised.
    pub async fn process(&self, refs: &[AttachmentRef]) -> Vec<DownloadedAttachment> {
        if !self.enabled {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            out.push(self.process_one(r).await);
        }
        out
    }

    async fn process_one(&self, r: &AttachmentRef) -> DownloadedAttachment {
        if let Some(size) = r.size.filter(|s| *s > self.max_bytes) {
            warn!(filename = %r.filename, size, limit = self.max_bytes, "attachment too large, skipped");
            let err = PipelineError::TooLarge {
                size,
                limit: self.max_bytes,
            };
            return DownloadedAttachment::failed(r, err.to_string());
        }

        let bytes = match self.download(&r.url).await {
            Ok(b) => b,
            Err(e) => {
                warn!(filename = %r.filename, error = %e, "attachment download failed");
                return DownloadedAttachment::failed(r, e.to_string());
            }
        };

        let hash = content_hash(&bytes);
        let stored_path = match self.store.put(&hash, &bytes).await {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(filename = %r.filename, hash = %hash, error = %e, "failed to store attachment");
                None
            }
        };

        let is_image = is_image_name(&r.filename);
        let (base64_payload, info) = if is_image {
            let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
            (Some(b64), Some(image_info(&bytes)))
        } else {
            (None, None)
        };

        debug!(filename = %r.filename, bytes = bytes.len(), hash = %hash, is_image, "attachment processed");

        DownloadedAttachment {
            filename: r.filename.clone(),
            size: bytes.len() as u64,
            content_type: r.content_type.clone(),
            content_hash: Some(hash),
            is_image,
            base64_payload,
            image_info: info,
            stored_path,
            error: None,
        }
    }

    /// Fetch a URL into memory, refusing bodies over the size limit.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut resp = self.client.get(url).send().await?.error_for_status()?;
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(PipelineError::TooLarge {
                    size: len,
                    limit: self.max_bytes,
                });
            }
        }
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            let size = (buf.len() + chunk.len()) as u64;
            if size > self.max_bytes {
                return Err(PipelineError::TooLarge {
                    size,
                    limit: self.max_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Download the images a reply links to so they can ride along with it.
    pub async fn fetch_reply_images(&self, text: &str) -> Vec<OutboundFile> {
        if !self.enabled {
            return Vec::new();
        }
        let mut files = Vec::new();
        for url in image_urls_in(text) {
            match self.download(&url).await {
                Ok(data) => {
                    let filename = AttachmentRef::from_url(&url).filename;
                    files.push(OutboundFile { filename, data });
                }
                Err(e) => warn!(url = %url, error = %e, "failed to fetch reply image"),
            }
        }
        files
    }
}
