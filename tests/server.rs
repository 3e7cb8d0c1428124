//! Route tests for the HTTP surface, driven through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use img2pdf::server::{build_router, AppState};
use img2pdf::ServerConfig;
use lopdf::Document;
use serde_json::Value;
use std::io::Cursor;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "img2pdf-test-boundary";

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode test image");
    buf
}

fn app() -> Router {
    build_router(AppState::new(ServerConfig::default()))
}

/// Hand-rolled `multipart/form-data` body.
#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    fn into_request(mut self) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .expect("request builder should not fail")
    }
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes()
        .to_vec()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("error body must be JSON")
}

#[tokio::test]
async fn health_returns_ok_json() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn upload_returns_pdf_attachment() {
    let request = Form::default()
        .file("images", "b.png", "image/png", &png(40, 30))
        .file("images", "a.png", "application/octet-stream", &png(20, 10))
        .text("config", r#"{"output_filename": "holiday/album", "jpeg_quality": 80}"#)
        .into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"holiday_album.pdf\""
    );

    let pdf = body_bytes(response).await;
    assert_eq!(
        headers[header::CONTENT_LENGTH].to_str().unwrap(),
        pdf.len().to_string()
    );
    let doc = Document::load_mem(&pdf).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn invalid_config_values_fall_back_to_defaults() {
    let request = Form::default()
        .file("images", "a.png", "image/png", &png(4, 4))
        .text("config", r#"{"jpeg_quality": 500, "num_workers": -3}"#)
        .into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"converted.pdf\""
    );
}

#[tokio::test]
async fn no_images_is_bad_request() {
    let request = Form::default().text("config", "{}").into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No images provided");
}

#[tokio::test]
async fn non_multipart_body_gets_a_json_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"images": []}"#))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"), "{content_type}");

    let body = json_body(response).await;
    assert_eq!(body["error"], "Failed to parse request data");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn missing_content_type_gets_a_json_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Failed to parse request data");
}

#[tokio::test]
async fn malformed_config_is_bad_request() {
    let request = Form::default()
        .file("images", "a.png", "image/png", &png(4, 4))
        .text("config", "{not json")
        .into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid 'config' JSON");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn malformed_image_urls_is_bad_request() {
    let request = Form::default()
        .text("image_urls", r#"{"url": "https://example.com/a.png"}"#)
        .into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid 'image_urls' JSON");
}

#[tokio::test]
async fn nothing_convertible_is_unprocessable() {
    let request = Form::default()
        .file("images", "a.png", "image/png", b"not a png")
        .file("images", "b.txt", "text/plain", b"hello")
        .into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = json_body(response).await;
    assert_eq!(body["error"], "No images could be processed into the PDF");
    let details = body["details"].as_array().expect("details lists each failure");
    assert_eq!(details.len(), 2);
}

#[tokio::test]
async fn urls_are_appended_after_uploads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/remote.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(70, 50)),
        )
        .mount(&server)
        .await;

    let urls = serde_json::json!([format!("{}/remote.png", server.uri())]).to_string();
    let request = Form::default()
        .file("images", "local.png", "image/png", &png(10, 20))
        .text("image_urls", &urls)
        .into_request();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let pdf = body_bytes(response).await;
    let doc = Document::load_mem(&pdf).unwrap();
    let widths: Vec<i64> = doc
        .get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            media_box[2].as_i64().unwrap()
        })
        .collect();
    assert_eq!(widths, vec![10, 70]);
}

#[tokio::test]
async fn request_timeout_cancels_conversion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(5, 5))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let app = build_router(AppState::new(ServerConfig {
        request_timeout_secs: 1,
        ..ServerConfig::default()
    }));
    let urls = serde_json::json!([format!("{}/slow.png", server.uri())]).to_string();
    let request = Form::default().text("image_urls", &urls).into_request();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(json_body(response).await["error"].is_string());
}
