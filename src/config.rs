//! Configuration types for image-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One conversion call reads the config
//! and never mutates it, so the same value can be shared across workers.
//!
//! The HTTP surface receives its knobs as a JSON object; [`RequestConfig`]
//! mirrors that wire shape and is folded onto the defaults with
//! [`RequestConfig::into_config`]. [`ServerConfig`] holds the listener-level
//! settings of the service binary.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default JPEG quality used when re-encoding WebP and other decoded images.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default suggested name of the produced document.
pub const DEFAULT_OUTPUT_FILENAME: &str = "converted.pdf";

/// Number of workers when none is configured: the machine's available parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration for one image-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use img2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .jpeg_quality(80)
///     .workers(4)
///     .output_filename("scans.pdf")
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// JPEG quality (1–100) for images that have to be re-encoded. Default: 90.
    ///
    /// JPEG and PNG inputs are embedded as-is and never touched by this knob.
    pub jpeg_quality: u8,

    /// Size of the worker pool, i.e. how many images are fetched and
    /// normalised at the same time. Default: available parallelism.
    pub workers: usize,

    /// Suggested output file name. Default: `converted.pdf`.
    pub output_filename: String,

    /// Receives per-image progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            workers: default_workers(),
            output_filename: DEFAULT_OUTPUT_FILENAME.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("jpeg_quality", &self.jpeg_quality)
            .field("workers", &self.workers)
            .field("output_filename", &self.output_filename)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn output_filename(mut self, name: impl Into<String>) -> Self {
        self.config.output_filename = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration. Numeric settings are already clamped by the
    /// setters; only the output name can still be rejected.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        if self.config.output_filename.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Output filename must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── HTTP request config ──────────────────────────────────────────────────

/// The `config` JSON object accepted by `POST /convert`.
///
/// Unknown fields are ignored. Out-of-range values are replaced by defaults
/// with a warning instead of failing the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequestConfig {
    pub output_filename: Option<String>,
    pub jpeg_quality: Option<i64>,
    pub num_workers: Option<i64>,
}

impl RequestConfig {
    /// Parse the raw `config` form field.
    pub fn from_json(raw: &str) -> Result<Self, ConvertError> {
        serde_json::from_str(raw)
            .map_err(|e| ConvertError::InvalidInput(format!("invalid 'config' JSON: {e}")))
    }

    /// Fold onto the defaults, resetting invalid values.
    pub fn into_config(self) -> ConversionConfig {
        let mut config = ConversionConfig::default();

        if let Some(q) = self.jpeg_quality {
            if (1..=100).contains(&q) {
                config.jpeg_quality = q as u8;
            } else {
                tracing::warn!(provided = q, default = DEFAULT_JPEG_QUALITY, "invalid JPEG quality in config, using default");
            }
        }
        if let Some(n) = self.num_workers {
            if n > 0 {
                config.workers = n as usize;
            } else {
                tracing::warn!(provided = n, default = config.workers, "invalid num_workers in config, using default");
            }
        }
        if let Some(name) = self.output_filename {
            if !name.trim().is_empty() {
                config.output_filename = name;
            }
        }
        config
    }
}

/// Make a caller-supplied name safe for a `Content-Disposition` header.
///
/// Slashes become underscores, double quotes are removed and a `.pdf`
/// suffix is appended when missing.
pub fn sanitize_output_filename(name: &str) -> String {
    let trimmed = name.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_OUTPUT_FILENAME
    } else {
        trimmed
    };
    let mut cleaned: String = base
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if !cleaned.to_ascii_lowercase().ends_with(".pdf") {
        cleaned.push_str(".pdf");
    }
    cleaned
}

// ── Server config ────────────────────────────────────────────────────────

/// Listener-level settings for the HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8080`.
    pub listen_addr: String,
    /// Per-request deadline in seconds; fires the request's cancel signal. 0 disables it.
    pub request_timeout_secs: u64,
    /// Upper bound on the multipart request body in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 120,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}
