//! Page assembly: ordered normalisation results in, one PDF out.
//!
//! Results are stably sorted by index and walked once. Failed items are
//! skipped, a page the builder rejects is skipped, and cancellation stops
//! the walk. The document is serialised only when at least one page was
//! embedded and the walk was not cancelled, so a cancelled run never
//! writes a partial document.

use crate::cancel::CancelSignal;
use crate::error::{ConvertError, ImageError};
use crate::output::NormalizedImage;
use crate::pipeline::pdf::PdfBuilder;
use std::io::Write;
use tracing::{debug, info, warn};

/// What the assembler did.
#[derive(Debug, Default)]
pub struct Assembly {
    /// At least one page was embedded.
    pub has_content: bool,
    /// Indices embedded as pages, in page order.
    pub embedded: Vec<usize>,
    /// Items whose page the builder rejected.
    pub rejected: Vec<(usize, ImageError)>,
    /// Bytes written to the output; 0 if nothing was serialised.
    pub bytes_written: usize,
    /// Cancellation or serialisation failure.
    pub error: Option<ConvertError>,
}

/// Resource name for the image at `position` (page order) with source `index`.
pub fn image_name(position: usize, index: usize) -> String {
    format!("Im{position}_{index}")
}

/// Add one page per successful result to `builder`, then write to `out`.
pub fn assemble(
    mut results: Vec<NormalizedImage>,
    builder: &mut dyn PdfBuilder,
    cancel: &CancelSignal,
    out: &mut dyn Write,
) -> Assembly {
    results.sort_by_key(|r| r.index);
    let mut assembly = Assembly::default();

    let mut items = results.into_iter().enumerate();
    for (position, result) in items.by_ref() {
        if cancel.is_cancelled() {
            info!(position, "cancelled during assembly; stopping");
            assembly.error = Some(ConvertError::Cancelled);
            break;
        }

        let image = match result.outcome {
            Ok(image) => image,
            Err(e) => {
                debug!(index = result.index, name = %result.original_name, "skipping page: {e}");
                continue;
            }
        };

        let name = image_name(position, result.index);
        match builder.add_image_page(&name, &image) {
            Ok(()) => {
                assembly.has_content = true;
                assembly.embedded.push(result.index);
            }
            Err(e) => {
                warn!(index = result.index, name = %result.original_name, "page rejected: {e}");
                assembly.rejected.push((
                    result.index,
                    ImageError::EmbedFailed {
                        name: result.original_name,
                        detail: e.to_string(),
                    },
                ));
            }
        }
    }
    // Remaining payloads are released here.
    drop(items);

    if assembly.error.is_some() || !assembly.has_content {
        return assembly;
    }

    let mut counted = CountingWriter { inner: out, written: 0 };
    match builder.write_to(&mut counted) {
        Ok(()) => {
            assembly.bytes_written = counted.written;
            info!(
                pages = builder.page_count(),
                bytes = counted.written,
                "document written"
            );
        }
        Err(e) => {
            assembly.bytes_written = counted.written;
            assembly.error = Some(ConvertError::PdfWrite(e.to_string()));
        }
    }
    assembly
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    written: usize,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
