//! HTTP surface: `POST /convert` and `GET /health`.
//!
//! The convert handler parses the multipart body into sources (uploads
//! first, then URLs, indices continuing), runs the facade, and answers with
//! either the PDF or a JSON `{error, details}` body. Each request owns a
//! [`CancelSignal`]: the configured request timeout fires it, and so does a
//! client disconnect, because dropping the handler future drops the guard.

use crate::cancel::CancelSignal;
use crate::config::{sanitize_output_filename, RequestConfig, ServerConfig};
use crate::convert::convert_with_client;
use crate::error::ConvertError;
use crate::output::ConversionOutcome;
use crate::pipeline::fetch;
use crate::source::{resolve_content_type, ImageSource};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

pub const CONVERT_PATH: &str = "/convert";
pub const HEALTH_PATH: &str = "/health";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            client: fetch::default_client(),
            config,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// A JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                details,
            },
        }
    }

    fn bad_request(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error,
            Some(Value::String(details.into())),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route(CONVERT_PATH, post(convert_handler))
        .route(HEALTH_PATH, get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn convert_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart
        .map_err(|rejection| ApiError::bad_request("Failed to parse request data", rejection.body_text()))?;
    let request = parse_request(multipart).await?;
    if request.sources.is_empty() {
        return Err(ApiError::bad_request(
            "No images provided",
            "Please upload files or provide image URLs.",
        ));
    }

    let config = request.config.into_config();
    let filename = sanitize_output_filename(&config.output_filename);
    tracing::info!(
        images = request.sources.len(),
        workers = config.workers,
        jpeg_quality = config.jpeg_quality,
        "convert request"
    );

    let cancel = CancelSignal::new();
    let guard = cancel.drop_guard();
    let deadline = (state.config.request_timeout_secs > 0)
        .then(|| cancel.cancel_after(Duration::from_secs(state.config.request_timeout_secs)));

    let mut pdf = Vec::new();
    let outcome = convert_with_client(&state.client, request.sources, &config, &cancel, &mut pdf).await;

    if let Some(deadline) = deadline {
        deadline.abort();
    }
    guard.disarm();

    if let Some(error) = outcome.error.as_ref() {
        return Err(error_response(error, &outcome));
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .header(header::CONTENT_LENGTH, pdf.len())
        .body(Body::from(pdf))
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build response",
                Some(Value::String(e.to_string())),
            )
        })
}

struct ConvertRequest {
    sources: Vec<ImageSource>,
    config: RequestConfig,
}

async fn parse_request(mut multipart: Multipart) -> Result<ConvertRequest, ApiError> {
    let mut sources = Vec::new();
    let mut urls: Vec<String> = Vec::new();
    let mut config = RequestConfig::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError::bad_request("Failed to parse request data", e.body_text())),
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "images" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = resolve_content_type(field.content_type(), &file_name);
                let data = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read uploaded file: {file_name}"), e.body_text())
                })?;
                tracing::debug!(file = %file_name, %content_type, bytes = data.len(), "received upload");
                sources.push(ImageSource::from_bytes(sources.len(), file_name, content_type, data));
            }
            "image_urls" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request("Invalid 'image_urls' JSON", e.body_text()))?;
                if !text.trim().is_empty() {
                    let parsed: Vec<String> = serde_json::from_str(&text)
                        .map_err(|e| ApiError::bad_request("Invalid 'image_urls' JSON", e.to_string()))?;
                    urls.extend(parsed.into_iter().map(|u| u.trim().to_string()).filter(|u| !u.is_empty()));
                }
            }
            "config" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request("Invalid 'config' JSON", e.body_text()))?;
                if !text.trim().is_empty() {
                    config = RequestConfig::from_json(&text)
                        .map_err(|e| ApiError::bad_request("Invalid 'config' JSON", e.to_string()))?;
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    let first_url_index = sources.len();
    sources.extend(
        urls.into_iter()
            .enumerate()
            .map(|(i, url)| ImageSource::from_url(first_url_index + i, url)),
    );
    Ok(ConvertRequest { sources, config })
}

fn error_response(error: &ConvertError, outcome: &ConversionOutcome) -> ApiError {
    match error {
        ConvertError::Cancelled => ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            "PDF conversion timed out or was canceled by client",
            Some(Value::String(error.to_string())),
        ),
        ConvertError::NoSupportedImages => {
            let failures: Vec<Value> = outcome
                .failures()
                .filter_map(|r| r.error.as_ref().map(|e| Value::String(e.to_string())))
                .collect();
            let details = if failures.is_empty() {
                Value::String(error.to_string())
            } else {
                Value::Array(failures)
            };
            ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "No images could be processed into the PDF",
                Some(details),
            )
        }
        ConvertError::InvalidInput(_) | ConvertError::InvalidConfig(_) => {
            ApiError::bad_request("Invalid request", error.to_string())
        }
        _ => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to convert images to PDF",
            Some(Value::String(error.to_string())),
        ),
    }
}

/// Bind `config.listen_addr` and serve until `shutdown` resolves.
pub async fn serve(
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr: SocketAddr = config
        .listen_addr
        .trim()
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: config.listen_addr.clone(),
            source,
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr().unwrap_or(addr);
    tracing::info!(%local_addr, "img2pdf server listening");

    let app = build_router(AppState::new(config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| ServerError::Serve { source })?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to capture Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received; shutting down"),
        _ = sigterm => tracing::info!("SIGTERM received; shutting down"),
    }
}
