//! Conversion entry points.
//!
//! [`convert`] is the facade over the pipeline: drop unusable sources, run
//! the coordinator, assemble in `spawn_blocking`, write the document, and
//! fold everything into one [`ConversionOutcome`]. The other functions are
//! conveniences on top of it.

use crate::cancel::CancelSignal;
use crate::config::ConversionConfig;
use crate::error::{ConvertError, ImageError};
use crate::output::{ConversionOutcome, ConversionStats, ImageReport, NormalizedImage};
use crate::pipeline::assemble::{assemble, Assembly};
use crate::pipeline::coordinator::{self, PoolOptions};
use crate::pipeline::pdf::LopdfBuilder;
use crate::pipeline::{fetch, input};
use crate::source::ImageSource;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Convert `sources` into one PDF written to `out`.
///
/// Never panics on bad input; every failure is reported through the
/// returned outcome. Nothing is written to `out` unless at least one page
/// was embedded and the run was not cancelled.
///
/// # Example
/// ```rust,no_run
/// use img2pdf::{convert, CancelSignal, ConversionConfig, ImageSource};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sources = vec![
///     ImageSource::from_path(0, "scan-1.jpg"),
///     ImageSource::from_url(1, "https://example.com/scan-2.png"),
/// ];
/// let mut pdf = Vec::new();
/// let outcome = convert(sources, &ConversionConfig::default(), &CancelSignal::new(), &mut pdf).await;
/// let stats = outcome.into_result()?;
/// eprintln!("{} pages, {} bytes", stats.embedded_images, pdf.len());
/// # Ok(())
/// # }
/// ```
pub async fn convert<W>(
    sources: Vec<ImageSource>,
    config: &ConversionConfig,
    cancel: &CancelSignal,
    out: &mut W,
) -> ConversionOutcome
where
    W: AsyncWrite + Unpin + ?Sized,
{
    convert_with_client(&fetch::default_client(), sources, config, cancel, out).await
}

/// [`convert`] with a caller-supplied HTTP client for URL sources.
pub async fn convert_with_client<W>(
    client: &reqwest::Client,
    sources: Vec<ImageSource>,
    config: &ConversionConfig,
    cancel: &CancelSignal,
    out: &mut W,
) -> ConversionOutcome
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total_start = Instant::now();
    let total_images = sources.len();
    info!(images = total_images, workers = config.workers, "starting conversion");

    // ── Step 1: Drop sources with neither a body nor a URL ───────────────
    let (usable, unusable): (Vec<_>, Vec<_>) = sources.into_iter().partition(ImageSource::is_usable);
    let mut reports: Vec<ImageReport> = unusable
        .iter()
        .map(|s| ImageReport {
            index: s.index(),
            name: s.original_name.clone(),
            embedded: false,
            error: Some(ImageError::MissingSource {
                name: s.original_name.clone(),
            }),
        })
        .collect();
    drop(unusable);

    if usable.is_empty() {
        warn!("no usable image sources");
        let mut outcome = ConversionOutcome::failed(ConvertError::NoSupportedImages);
        outcome.stats.total_images = total_images;
        outcome.stats.failed_images = reports.len();
        outcome.images = reports;
        return outcome;
    }

    // ── Step 2: Normalise through the worker pool ────────────────────────
    let options = PoolOptions {
        workers: config.workers,
        jpeg_quality: config.jpeg_quality,
        progress: config.progress_callback.clone(),
    };
    let normalize_start = Instant::now();
    let results = coordinator::run(usable, &options, client, cancel).await;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;

    reports.extend(results.iter().map(|r| ImageReport {
        index: r.index,
        name: r.original_name.clone(),
        embedded: false,
        error: r.error().cloned(),
    }));
    let all_cancelled = !results.is_empty() && results.iter().all(NormalizedImage::is_cancelled);

    // ── Step 3: Assemble the document ────────────────────────────────────
    let assemble_start = Instant::now();
    let assembly_cancel = cancel.clone();
    let assembled = tokio::task::spawn_blocking(move || {
        let mut builder = LopdfBuilder::new();
        let mut buf = Vec::new();
        let assembly = assemble(results, &mut builder, &assembly_cancel, &mut buf);
        (assembly, buf)
    })
    .await;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

    let (assembly, pdf) = match assembled {
        Ok(pair) => pair,
        Err(e) => {
            let mut outcome =
                ConversionOutcome::failed(ConvertError::Internal(format!("assembly task failed: {e}")));
            outcome.images = reports;
            return outcome;
        }
    };

    // ── Step 4: Write and decide ─────────────────────────────────────────
    let Assembly {
        has_content,
        embedded,
        rejected,
        error: assembly_error,
        ..
    } = assembly;

    let mut output_bytes = 0;
    let error = if cancel.is_cancelled() {
        Some(ConvertError::Cancelled)
    } else if let Some(e) = assembly_error {
        Some(e)
    } else if !has_content {
        if all_cancelled {
            Some(ConvertError::Cancelled)
        } else {
            Some(ConvertError::NoSupportedImages)
        }
    } else {
        match write_output(out, &pdf).await {
            Ok(()) => {
                output_bytes = pdf.len();
                None
            }
            Err(e) => Some(e),
        }
    };

    let rejected: HashMap<usize, ImageError> = rejected.into_iter().collect();
    for report in &mut reports {
        if let Some(e) = rejected.get(&report.index) {
            report.error = Some(e.clone());
        }
        report.embedded = report.error.is_none() && embedded.contains(&report.index);
    }
    reports.sort_by_key(|r| r.index);

    let stats = ConversionStats {
        total_images,
        embedded_images: embedded.len(),
        failed_images: reports
            .iter()
            .filter(|r| r.error.as_ref().is_some_and(|e| !e.is_cancelled()))
            .count(),
        cancelled_images: reports
            .iter()
            .filter(|r| r.error.as_ref().is_some_and(ImageError::is_cancelled))
            .count(),
        output_bytes,
        normalize_duration_ms,
        assemble_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    match &error {
        None => info!(
            pages = stats.embedded_images,
            bytes = stats.output_bytes,
            total_ms = stats.total_duration_ms,
            "conversion complete"
        ),
        Some(e) => warn!(pages = stats.embedded_images, "conversion failed: {e}"),
    }

    ConversionOutcome {
        has_content,
        error,
        images: reports,
        stats,
    }
}

async fn write_output<W>(out: &mut W, pdf: &[u8]) -> Result<(), ConvertError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    out.write_all(pdf)
        .await
        .map_err(|e| ConvertError::PdfWrite(format!("writing output: {e}")))?;
    out.flush()
        .await
        .map_err(|e| ConvertError::PdfWrite(format!("flushing output: {e}")))
}

/// Convert and write the PDF to `output_path`.
///
/// Uses atomic write (temp file + rename): the target is only created when
/// the conversion succeeds. On failure, cancellation or an empty result any
/// file already at `output_path` is removed, so a stale document from an
/// earlier run is never mistaken for this run's output.
pub async fn convert_to_file(
    sources: Vec<ImageSource>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: &CancelSignal,
) -> ConversionOutcome {
    let path = output_path.as_ref();
    let mut pdf = Vec::new();
    let mut outcome = convert(sources, config, cancel, &mut pdf).await;
    if outcome.error.is_some() || !outcome.has_content {
        remove_stale_output(path).await;
        return outcome;
    }

    let bytes = pdf.len();
    if let Err(e) = write_atomic(path, pdf).await {
        outcome.error = Some(e);
        remove_stale_output(path).await;
    } else {
        debug!(path = %path.display(), bytes, "wrote output file");
    }
    outcome
}

/// Delete whatever sits at `path` from an earlier run. Missing is fine.
async fn remove_stale_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "removed output file of failed conversion"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "could not remove output file: {e}"),
    }
}

async fn write_atomic(path: &Path, data: Vec<u8>) -> Result<(), ConvertError> {
    let target = path.to_path_buf();
    let write_err = {
        let target = target.clone();
        move |source: std::io::Error| ConvertError::OutputWriteFailed {
            path: target.clone(),
            source,
        }
    };

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            tokio::fs::create_dir_all(parent).await.map_err(&write_err)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    // The temp file lives next to the target so the rename stays on one
    // filesystem; it is removed on drop if anything below fails.
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("output write task failed: {e}")))?
    .map_err(write_err)
}

/// Convert every supported image in `input_dir` (sorted by file name) into
/// `output_path`. Backs the batch CLI.
pub async fn convert_dir(
    input_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: &CancelSignal,
) -> ConversionOutcome {
    let sources = match input::sources_from_dir(input_dir.as_ref()).await {
        Ok(sources) => sources,
        Err(e) => {
            remove_stale_output(output_path.as_ref()).await;
            return ConversionOutcome::failed(e);
        }
    };
    info!(dir = %input_dir.as_ref().display(), images = sources.len(), "scanned input directory");
    convert_to_file(sources, output_path, config, cancel).await
}

/// Synchronous wrapper around [`convert`]; returns the PDF bytes.
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    sources: Vec<ImageSource>,
    config: &ConversionConfig,
) -> Result<Vec<u8>, ConvertError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?;
    let mut pdf = Vec::new();
    runtime
        .block_on(convert(sources, config, &CancelSignal::new(), &mut pdf))
        .into_result()?;
    Ok(pdf)
}
