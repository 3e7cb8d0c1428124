//! Progress-callback trait for per-image conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the worker pool finishes each image. The CLI uses it to drive
//! an `indicatif` bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use img2pdf::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, name: &str, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {index}/{total} {name} ready ({bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each image.
///
/// Images are normalised concurrently, so `on_image_complete` and
/// `on_image_error` arrive in completion order and may be called from
/// different threads. Implementations must protect shared mutable state
/// with appropriate synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
/// All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any image is scheduled.
    fn on_conversion_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when a worker slot has been acquired for an image.
    fn on_image_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when an image has been normalised into an embeddable encoding.
    ///
    /// # Arguments
    /// * `index` — the caller-assigned ordering index
    /// * `total` — number of images in the batch
    /// * `name`  — display name of the image
    /// * `bytes` — size of the encoded payload that will be embedded
    fn on_image_complete(&self, index: usize, total: usize, name: &str, bytes: usize) {
        let _ = (index, total, name, bytes);
    }

    /// Called when an image fails (fetch, decode, re-encode) or is cancelled.
    fn on_image_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every image has a result.
    ///
    /// # Arguments
    /// * `total_images`  — number of images in the batch
    /// * `success_count` — images that normalised without error
    fn on_conversion_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
