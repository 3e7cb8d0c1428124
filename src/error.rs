//! Error types for the img2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: the conversion as a whole cannot produce a
//!   document (no usable sources, caller cancelled, the PDF could not be
//!   serialised). Returned from the facade and mapped to CLI exit codes and
//!   HTTP status codes.
//!
//! * [`ImageError`] — **Non-fatal**: a single image failed (fetch error,
//!   unsupported content type, corrupt bytes) but every other image is
//!   unaffected. Stored inside [`crate::output::NormalizedImage`] so the
//!   assembler can skip the page and callers can report what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the img2pdf library.
///
/// Per-image failures use [`ImageError`] and never abort a batch on their own.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Nothing usable was supplied, or every image failed to normalise.
    #[error("no supported images were successfully processed")]
    NoSupportedImages,

    /// The input directory could not be read.
    #[error("could not read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Request payload was malformed (bad JSON, unreadable multipart field, …).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Cancellation ──────────────────────────────────────────────────────
    /// The caller cancelled the conversion (Ctrl-C, client disconnect, timeout).
    #[error("conversion was cancelled")]
    Cancelled,

    // ── Assembly / I/O errors ─────────────────────────────────────────────
    /// The PDF document could not be serialised.
    #[error("pdf generation failed: {0}")]
    PdfWrite(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// `true` when the error is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvertError::Cancelled)
    }
}

/// A non-fatal error for a single image.
///
/// Stored in [`crate::output::NormalizedImage`] when an image fails.
/// The conversion continues unless every image fails.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The HTTP request for a remote image could not be completed.
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// The remote server answered with something other than 200 OK.
    #[error("failed to fetch {url}: status {status}")]
    BadStatus { url: String, status: u16 },

    /// The remote server did not declare an `image/*` content type.
    #[error("unsupported content type from URL: {content_type} from {url}")]
    UnsupportedContentType { url: String, content_type: String },

    /// The descriptor carried neither a byte stream nor a URL.
    #[error("image source '{name}' has no data")]
    MissingSource { name: String },

    /// Reading the byte stream failed part-way.
    #[error("could not read image data for {name}: {detail}")]
    ReadFailed { name: String, detail: String },

    /// The bytes could not be decoded as an image.
    #[error("could not decode image {name}: {detail}")]
    DecodeFailed { name: String, detail: String },

    /// The bytes decoded, but to a format the PDF pipeline does not accept.
    #[error("unsupported image format for {name} (content type: {content_type})")]
    UnsupportedFormat { name: String, content_type: String },

    /// Re-encoding to a PDF-embeddable format failed.
    #[error("could not re-encode {name} to {target}: {detail}")]
    EncodeFailed {
        name: String,
        target: String,
        detail: String,
    },

    /// The PDF writer rejected the page for this image.
    #[error("could not add page for {name}: {detail}")]
    EmbedFailed { name: String, detail: String },

    /// The item was abandoned because the conversion was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The worker for this item exited without publishing a result.
    #[error("worker for {name} exited without a result")]
    WorkerLost { name: String },
}

impl ImageError {
    /// `true` for the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImageError::Cancelled)
    }
}
