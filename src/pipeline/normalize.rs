//! Single-item normaliser: one source in, one PDF-embeddable payload out.
//!
//! JPEG and PNG bytes are embedded as-is after a header-only probe for the
//! pixel dimensions. WebP, and anything whose declared type is missing or
//! unknown, is fully decoded and re-encoded. Decoding and encoding are CPU
//! bound and run in `spawn_blocking`.
//!
//! Failures are returned as values inside [`NormalizedImage`]; nothing here
//! aborts the batch. The source's byte stream is owned by [`normalize`] and
//! is dropped on every return path.

use crate::cancel::CancelSignal;
use crate::error::ImageError;
use crate::output::{EncodedImage, NormalizedImage, PdfEncoding};
use crate::source::{ImageBody, ImageSource, JPEG, PNG, WEBP};
use futures::StreamExt;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

/// Normalise one source. The source's stream is consumed and released.
pub async fn normalize(
    mut source: ImageSource,
    jpeg_quality: u8,
    cancel: &CancelSignal,
) -> NormalizedImage {
    let index = source.index();
    let name = std::mem::take(&mut source.original_name);

    if cancel.is_cancelled() {
        source.release();
        return NormalizedImage::cancelled(index, name);
    }

    let Some(body) = source.take_body() else {
        return NormalizedImage::failed(index, name.clone(), ImageError::MissingSource { name });
    };

    let data = match read_body(body, &name, cancel).await {
        Ok(data) => data,
        Err(e) => return NormalizedImage::failed(index, name, e),
    };
    debug!(index, name = %name, bytes = data.len(), "read image data");

    let content_type = std::mem::take(&mut source.content_type);
    let task_name = name.clone();
    let encoded = tokio::task::spawn_blocking(move || {
        encode_for_pdf(data, &content_type, &task_name, jpeg_quality)
    })
    .await;

    match encoded {
        Ok(Ok(image)) => NormalizedImage::ok(index, name, image),
        Ok(Err(e)) => NormalizedImage::failed(index, name, e),
        Err(join_err) => {
            warn!(index, name = %name, "normalise task failed: {join_err}");
            NormalizedImage::failed(
                index,
                name.clone(),
                ImageError::DecodeFailed {
                    name,
                    detail: format!("decoder task failed: {join_err}"),
                },
            )
        }
    }
}

/// Drain the stream into memory, stopping early on cancellation.
async fn read_body(
    mut body: ImageBody,
    name: &str,
    cancel: &CancelSignal,
) -> Result<Vec<u8>, ImageError> {
    let mut data = Vec::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImageError::Cancelled),
            next = body.next() => next,
        };
        match next {
            Some(Ok(chunk)) => data.extend_from_slice(&chunk),
            Some(Err(e)) => {
                return Err(ImageError::ReadFailed {
                    name: name.to_string(),
                    detail: e.to_string(),
                })
            }
            None => return Ok(data),
        }
    }
}

/// Lowercase, drop parameters, and fold `image/jpg` aliases into `image/jpeg`.
pub fn canonical_content_type(content_type: &str) -> String {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match media.as_str() {
        "image/jpg" | "image/pjpeg" => JPEG.to_string(),
        _ => media,
    }
}

/// Turn raw image bytes into an embeddable payload. Blocking.
pub fn encode_for_pdf(
    data: Vec<u8>,
    content_type: &str,
    name: &str,
    jpeg_quality: u8,
) -> Result<EncodedImage, ImageError> {
    let declared = canonical_content_type(content_type);
    let sniffed = image::guess_format(&data).ok();

    match (declared.as_str(), sniffed) {
        (JPEG, Some(ImageFormat::Jpeg)) => passthrough(data, ImageFormat::Jpeg, name),
        (PNG, Some(ImageFormat::Png)) => passthrough(data, ImageFormat::Png, name),
        (WEBP, _) => {
            let img = decode(&data, Some(ImageFormat::WebP), name)?;
            encode_jpeg(img, jpeg_quality, name)
        }
        _ => {
            if declared == JPEG || declared == PNG {
                debug!(name, declared = %declared, ?sniffed, "declared type does not match content");
            }
            reencode_sniffed(&data, sniffed, &declared, name, jpeg_quality)
        }
    }
}

/// Keep the original bytes; probe only the header for dimensions.
fn passthrough(data: Vec<u8>, format: ImageFormat, name: &str) -> Result<EncodedImage, ImageError> {
    let (width, height) = ImageReader::with_format(Cursor::new(&data), format)
        .into_dimensions()
        .map_err(|e| ImageError::DecodeFailed {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
    let encoding = match format {
        ImageFormat::Png => PdfEncoding::Png,
        _ => PdfEncoding::Jpeg,
    };
    Ok(EncodedImage {
        data,
        width: width as f32,
        height: height as f32,
        encoding,
    })
}

/// Generic path for unknown or mismatched declared types.
fn reencode_sniffed(
    data: &[u8],
    sniffed: Option<ImageFormat>,
    declared: &str,
    name: &str,
    jpeg_quality: u8,
) -> Result<EncodedImage, ImageError> {
    let unsupported = || ImageError::UnsupportedFormat {
        name: name.to_string(),
        content_type: declared.to_string(),
    };
    match sniffed {
        Some(ImageFormat::Png) => encode_png(decode(data, sniffed, name)?, name),
        Some(format @ (ImageFormat::Jpeg | ImageFormat::WebP)) => {
            encode_jpeg(decode(data, Some(format), name)?, jpeg_quality, name)
        }
        _ => Err(unsupported()),
    }
}

fn decode(data: &[u8], format: Option<ImageFormat>, name: &str) -> Result<DynamicImage, ImageError> {
    let result = match format {
        Some(f) => image::load_from_memory_with_format(data, f),
        None => image::load_from_memory(data),
    };
    result.map_err(|e| ImageError::DecodeFailed {
        name: name.to_string(),
        detail: e.to_string(),
    })
}

/// Reduce to 8 bits per channel. `keep_alpha` retains an alpha channel if present.
fn to_8bit(img: DynamicImage, keep_alpha: bool) -> DynamicImage {
    match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img,
        ColorType::La8 | ColorType::Rgba8 if keep_alpha => img,
        ColorType::L16 => DynamicImage::ImageLuma8(img.to_luma8()),
        ColorType::La8 | ColorType::La16 if keep_alpha => {
            DynamicImage::ImageLumaA8(img.to_luma_alpha8())
        }
        ColorType::La8 | ColorType::La16 => DynamicImage::ImageLuma8(img.to_luma8()),
        c if keep_alpha && c.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

fn encode_jpeg(img: DynamicImage, quality: u8, name: &str) -> Result<EncodedImage, ImageError> {
    let img = to_8bit(img, false);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality.clamp(1, 100))
        .encode(img.as_bytes(), img.width(), img.height(), img.color().into())
        .map_err(|e| ImageError::EncodeFailed {
            name: name.to_string(),
            target: "jpeg".into(),
            detail: e.to_string(),
        })?;
    Ok(EncodedImage {
        data: buf,
        width: img.width() as f32,
        height: img.height() as f32,
        encoding: PdfEncoding::Jpeg,
    })
}

fn encode_png(img: DynamicImage, name: &str) -> Result<EncodedImage, ImageError> {
    let img = to_8bit(img, true);
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ImageError::EncodeFailed {
            name: name.to_string(),
            target: "png".into(),
            detail: e.to_string(),
        })?;
    Ok(EncodedImage {
        data: buf,
        width: img.width() as f32,
        height: img.height() as f32,
        encoding: PdfEncoding::Png,
    })
}
