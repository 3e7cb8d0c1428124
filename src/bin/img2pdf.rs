//! CLI binary for img2pdf.
//!
//! A thin shim over the library crate: scans a directory, maps CLI flags to
//! `ConversionConfig`, converts, and reports progress on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use img2pdf::{
    convert_dir, CancelSignal, ConversionConfig, ConversionOutcome, ConversionProgressCallback,
    ConvertError, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per image.
/// Images finish out of order, so lines are keyed by index, not position.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-image wall-clock start times.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` reports the image count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning images…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        // A poisoned map only loses timings.
        let started = match self.start_times.lock() {
            Ok(mut times) => times.remove(&index),
            Err(_) => None,
        };
        started
            .map(|t| t.elapsed().as_millis() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_images} images…"))
        ));
    }

    fn on_image_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_image_complete(&self, index: usize, total: usize, name: &str, bytes: usize) {
        let elapsed = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{:>8} KiB", bytes / 1024)),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let elapsed = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_images: usize, success_count: usize) {
        let failed = total_images.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images normalised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images normalised  ({} failed)",
                if failed == total_images {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every image in the current directory into output.pdf
  img2pdf

  # Pick the directory and the output file
  img2pdf -i scans/ -o book.pdf

  # Lower JPEG quality for WebP inputs, 4 workers
  img2pdf -i photos/ -o album.pdf --jpeg-quality 75 -c 4

INPUT:
  The input directory is scanned non-recursively for .jpg, .jpeg, .png and
  .webp files (case-insensitive). Pages follow the lexicographic order of
  the file names. JPEG and PNG files are embedded as they are; WebP files
  are re-encoded as JPEG.

EXIT STATUS:
  0    PDF written
  1    conversion failed, or no image could be embedded
  130  interrupted (Ctrl-C)

ENVIRONMENT VARIABLES:
  IMG2PDF_INPUT, IMG2PDF_OUTPUT, IMG2PDF_CONCURRENCY, IMG2PDF_JPEG_QUALITY,
  IMG2PDF_VERBOSE, IMG2PDF_QUIET, IMG2PDF_NO_PROGRESS
  RUST_LOG overrides --verbose / --quiet log filtering.
"#;

/// Assemble a directory of images into a single PDF.
#[derive(Parser, Debug)]
#[command(
    name = "img2pdf",
    version,
    about = "Assemble a directory of JPEG/PNG/WebP images into a single PDF",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the images.
    #[arg(short, long, env = "IMG2PDF_INPUT", default_value = ".")]
    input: PathBuf,

    /// PDF file to write.
    #[arg(short, long, env = "IMG2PDF_OUTPUT", default_value = "output.pdf")]
    output: PathBuf,

    /// Number of images normalised concurrently (default: CPU count).
    #[arg(short, long, env = "IMG2PDF_CONCURRENCY",
          value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: Option<u64>,

    /// JPEG quality used when re-encoding (1–100).
    #[arg(long, env = "IMG2PDF_JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2PDF_QUIET", conflicts_with = "verbose")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMG2PDF_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the bar active only errors are logged; the bar covers the rest.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ExitCode> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, progress_cb)?;

    // Ctrl-C cancels the run; the pipeline winds down and nothing is written.
    let cancel = CancelSignal::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; cancelling");
                cancel.cancel();
            }
        })
    };

    let outcome = convert_dir(&cli.input, &cli.output, &config, &cancel).await;
    interrupt.abort();

    report(cli, &outcome);
    Ok(exit_code(&outcome))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder().jpeg_quality(cli.jpeg_quality);
    if let Some(n) = cli.concurrency {
        builder = builder.workers(usize::try_from(n).context("--concurrency is too large")?);
    }
    if let Some(name) = cli.output.file_name().and_then(|n| n.to_str()) {
        builder = builder.output_filename(name);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn exit_code(outcome: &ConversionOutcome) -> ExitCode {
    match &outcome.error {
        None if outcome.has_content => ExitCode::SUCCESS,
        Some(ConvertError::Cancelled) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

fn report(cli: &Cli, outcome: &ConversionOutcome) {
    let stats = &outcome.stats;
    match &outcome.error {
        None if outcome.has_content => {
            if !cli.quiet {
                eprintln!(
                    "{}  {}/{} pages  {}  {}ms  →  {}",
                    if stats.failed_images == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    stats.embedded_images,
                    stats.total_images,
                    dim(&format!("{} KiB", stats.output_bytes / 1024)),
                    stats.total_duration_ms,
                    bold(&cli.output.display().to_string()),
                );
                for failure in outcome.failures() {
                    if let Some(e) = &failure.error {
                        eprintln!("   {} {}", dim("skipped:"), e);
                    }
                }
            }
        }
        Some(ConvertError::Cancelled) => {
            eprintln!("{} conversion cancelled; no PDF written", red("✘"));
        }
        Some(e) => {
            eprintln!("{} {}", red("✘"), e);
            if matches!(e, ConvertError::NoSupportedImages) {
                for failure in outcome.failures() {
                    if let Some(err) = &failure.error {
                        eprintln!("   {err}");
                    }
                }
            }
        }
        None => {
            eprintln!("{} {}", red("✘"), ConvertError::NoSupportedImages);
        }
    }
}
