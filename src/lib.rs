//! # img2pdf
//!
//! Assemble JPEG, PNG and WebP images into a single PDF: one page per image,
//! each page sized to its image, in caller-specified order.
//!
//! Images can come from uploads, local files or URLs. They are fetched and
//! normalised concurrently by a bounded worker pool, then reassembled
//! strictly by index, so concurrency never changes the page order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! sources (uploads / files / URLs)
//!  │
//!  ├─ 1. Coordinator  N workers, semaphore-bounded, cancellable
//!  │     ├─ fetch      URL → streaming body (reqwest)
//!  │     └─ normalise  JPEG/PNG passthrough, WebP → JPEG (spawn_blocking)
//!  ├─ 2. Assemble     index order, one page per image (lopdf)
//!  └─ 3. Output       PDF bytes + per-image report + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use img2pdf::{convert_to_file, CancelSignal, ConversionConfig, ImageSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sources = vec![
//!         ImageSource::from_path(0, "page-1.jpg"),
//!         ImageSource::from_path(1, "page-2.webp"),
//!     ];
//!     let config = ConversionConfig::default();
//!     let stats = convert_to_file(sources, "book.pdf", &config, &CancelSignal::new())
//!         .await
//!         .into_result()?;
//!     eprintln!("{} pages in {}ms", stats.embedded_images, stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `img2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`] and the `img2pdf-server` binary (axum) |
//!
//! Disable both when using only the library:
//! ```toml
//! img2pdf = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::{CancelOnDrop, CancelSignal};
pub use config::{ConversionConfig, ConversionConfigBuilder, RequestConfig, ServerConfig};
pub use convert::{convert, convert_dir, convert_sync, convert_to_file, convert_with_client};
pub use error::{ConvertError, ImageError};
pub use output::{
    ConversionOutcome, ConversionStats, EncodedImage, ImageReport, NormalizedImage, PdfEncoding,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{ImageBody, ImageSource};
