//! Source descriptors: one value per image to put in the document.
//!
//! An [`ImageSource`] is either backed by a live byte stream (an upload, a
//! local file, a fetched response body) or by a URL that the pipeline will
//! fetch itself. The byte stream is an owned [`ImageBody`]; dropping it is
//! what "closing" means, so a stream can only ever be released once.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Owned, readable byte stream of one encoded image.
pub type ImageBody = BoxStream<'static, io::Result<Bytes>>;

/// Content types the normaliser recognises without sniffing.
pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";
pub const WEBP: &str = "image/webp";

/// Extensions accepted by the directory scanner.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["webp", "jpg", "jpeg", "png"];

/// One image to process, in caller-assigned order.
pub struct ImageSource {
    /// Display name: upload filename, file name, or last URL path segment.
    pub original_name: String,
    /// Declared content type, e.g. `image/png`. May be empty.
    pub content_type: String,
    index: usize,
    body: Option<ImageBody>,
    url: Option<String>,
}

impl ImageSource {
    /// A source whose bytes are already available as a stream.
    pub fn from_body(
        index: usize,
        original_name: impl Into<String>,
        content_type: impl Into<String>,
        body: ImageBody,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.into(),
            index,
            body: Some(body),
            url: None,
        }
    }

    /// A source backed by an in-memory buffer (e.g. a multipart upload).
    pub fn from_bytes(
        index: usize,
        original_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self::from_body(
            index,
            original_name,
            content_type,
            stream::once(async move { Ok(data) }).boxed(),
        )
    }

    /// A source backed by a local file. The file is opened lazily, when the
    /// stream is first polled, so a queued item holds no descriptor.
    pub fn from_path(index: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = content_type_from_filename(&name).to_string();
        let body = stream::once(async move { tokio::fs::read(&path).await.map(Bytes::from) }).boxed();
        Self::from_body(index, name, content_type, body)
    }

    /// A source that the pipeline resolves with an HTTP GET.
    pub fn from_url(index: usize, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            original_name: url.clone(),
            content_type: String::new(),
            index,
            body: None,
            url: Some(url),
        }
    }

    /// Position in the requested output order. Sole ordering key.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// A source is usable when it has either a stream or a URL to fetch.
    pub fn is_usable(&self) -> bool {
        self.body.is_some() || self.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Take ownership of the byte stream, leaving `None` behind.
    pub fn take_body(&mut self) -> Option<ImageBody> {
        self.body.take()
    }

    /// Drop the byte stream now, if any.
    pub fn release(&mut self) {
        self.body = None;
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("original_name", &self.original_name)
            .field("content_type", &self.content_type)
            .field("index", &self.index)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .field("url", &self.url)
            .finish()
    }
}

/// Guess a content type from a file name's extension. Empty when unknown.
pub fn content_type_from_filename(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => JPEG,
        "png" => PNG,
        "webp" => WEBP,
        _ => "",
    }
}

/// Use the declared type unless it is missing or generic, then fall back to the extension.
pub fn resolve_content_type(declared: Option<&str>, file_name: &str) -> String {
    match declared.map(str::trim) {
        Some(ct) if !ct.is_empty() && !ct.eq_ignore_ascii_case("application/octet-stream") => {
            ct.to_string()
        }
        _ => content_type_from_filename(file_name).to_string(),
    }
}
