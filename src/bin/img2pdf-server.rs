//! HTTP server binary for img2pdf.
//!
//! Serves `POST /convert` and `GET /health` until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use img2pdf::server;
use img2pdf::ServerConfig;
use std::io;
use tracing_subscriber::EnvFilter;

/// Run the img2pdf HTTP service.
#[derive(Parser, Debug)]
#[command(
    name = "img2pdf-server",
    version,
    about = "HTTP service that assembles uploaded or linked images into a PDF",
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Socket address to listen on.
    #[arg(short, long, env = "IMG2PDF_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Per-request deadline in seconds; the conversion is cancelled when it fires. 0 disables it.
    #[arg(long, env = "IMG2PDF_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Maximum multipart request body size in MiB.
    #[arg(long, env = "IMG2PDF_MAX_UPLOAD_MB", default_value_t = 64,
          value_parser = clap::value_parser!(u64).range(1..=4096))]
    max_upload_mb: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2PDF_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let max_upload_bytes = usize::try_from(cli.max_upload_mb * 1024 * 1024)
        .context("--max-upload-mb does not fit in memory on this platform")?;
    let config = ServerConfig {
        listen_addr: cli.listen,
        request_timeout_secs: cli.request_timeout,
        max_upload_bytes,
    };

    server::serve(config, server::shutdown_signal())
        .await
        .context("Server failed")
}
