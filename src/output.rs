//! Values produced by the pipeline stages and returned from the facade.

use crate::error::{ConvertError, ImageError};
use serde::{Deserialize, Serialize};

/// How an image payload is embedded in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PdfEncoding {
    /// Raw JPEG bytes, embedded with `DCTDecode`.
    Jpeg,
    /// PNG bytes; decoded and Flate-compressed at embed time.
    Png,
}

/// A normalised, PDF-embeddable image payload.
#[derive(Clone, PartialEq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    /// Page width in PDF units (1 pixel = 1 unit).
    pub width: f32,
    /// Page height in PDF units (1 pixel = 1 unit).
    pub height: f32,
    pub encoding: PdfEncoding,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Result of normalising one source. Either a payload or a per-image error.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// The source's caller-assigned ordering index.
    pub index: usize,
    pub original_name: String,
    pub outcome: Result<EncodedImage, ImageError>,
}

impl NormalizedImage {
    pub fn ok(index: usize, original_name: impl Into<String>, image: EncodedImage) -> Self {
        Self {
            index,
            original_name: original_name.into(),
            outcome: Ok(image),
        }
    }

    pub fn failed(index: usize, original_name: impl Into<String>, error: ImageError) -> Self {
        Self {
            index,
            original_name: original_name.into(),
            outcome: Err(error),
        }
    }

    pub fn cancelled(index: usize, original_name: impl Into<String>) -> Self {
        Self::failed(index, original_name, ImageError::Cancelled)
    }

    pub fn error(&self) -> Option<&ImageError> {
        self.outcome.as_ref().err()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error().is_some_and(ImageError::is_cancelled)
    }
}

/// What happened to one image, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageReport {
    pub index: usize,
    pub name: String,
    /// `true` if the image became a page of the document.
    pub embedded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ImageError>,
}

/// Timing and count statistics of one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionStats {
    pub total_images: usize,
    pub embedded_images: usize,
    pub failed_images: usize,
    pub cancelled_images: usize,
    /// Size of the serialised PDF; 0 when nothing was written.
    pub output_bytes: usize,
    pub normalize_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Final result of [`crate::convert::convert`].
///
/// `has_content` and `error` are independent: a document can have been
/// assembled and still carry an error when cancellation raced the write.
#[derive(Debug)]
pub struct ConversionOutcome {
    pub has_content: bool,
    pub error: Option<ConvertError>,
    /// One entry per submitted image, in index order.
    pub images: Vec<ImageReport>,
    pub stats: ConversionStats,
}

impl ConversionOutcome {
    /// An outcome that failed before any image was processed.
    pub fn failed(error: ConvertError) -> Self {
        Self {
            has_content: false,
            error: Some(error),
            images: Vec::new(),
            stats: ConversionStats::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.has_content && self.error.is_none()
    }

    /// Per-image failures, excluding cancellations.
    pub fn failures(&self) -> impl Iterator<Item = &ImageReport> {
        self.images
            .iter()
            .filter(|r| r.error.as_ref().is_some_and(|e| !e.is_cancelled()))
    }

    /// Collapse into a `Result`, for callers that only care about success.
    pub fn into_result(self) -> Result<ConversionStats, ConvertError> {
        match self.error {
            Some(e) => Err(e),
            None if !self.has_content => Err(ConvertError::NoSupportedImages),
            None => Ok(self.stats),
        }
    }
}
