//! Remote fetcher: resolve a URL into a streaming [`ImageSource`].
//!
//! The request is raced against the cancellation signal. On success the
//! returned source owns the live response body; the response is dropped on
//! every error path, which releases the connection.
//!
//! No timeout is configured on the client. Deadlines are expressed as
//! cancellation by whoever owns the signal.

use crate::cancel::CancelSignal;
use crate::error::ImageError;
use crate::source::ImageSource;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Build the HTTP client shared by all fetches of one conversion.
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("img2pdf/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

/// GET `url` and return a source whose body is the response stream.
pub async fn fetch_image(
    client: &reqwest::Client,
    url: &str,
    index: usize,
    cancel: &CancelSignal,
) -> Result<ImageSource, ImageError> {
    if cancel.is_cancelled() {
        return Err(ImageError::Cancelled);
    }

    debug!(url, index, "fetching image");
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ImageError::Cancelled),
        res = client.get(url).send() => res.map_err(|e| ImageError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?,
    };

    if response.status() != StatusCode::OK {
        return Err(ImageError::BadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !media_type.starts_with("image/") {
        return Err(ImageError::UnsupportedContentType {
            url: url.to_string(),
            content_type,
        });
    }

    let body = response
        .bytes_stream()
        .map_err(std::io::Error::other)
        .boxed();
    Ok(ImageSource::from_body(
        index,
        name_from_url(url),
        media_type,
        body,
    ))
}

/// Last non-empty path segment of `url`, or the URL itself.
pub fn name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| url.to_string())
}
