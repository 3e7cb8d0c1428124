//! End-to-end tests for img2pdf through the public API.
//!
//! Images are generated in memory; the resulting PDFs are parsed back with
//! `lopdf` to check page count, order and size.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use image::{DynamicImage, ImageFormat, RgbImage};
use img2pdf::{
    convert, convert_dir, convert_to_file, CancelSignal, ConversionConfig,
    ConversionProgressCallback, ConvertError, ImageBody, ImageError, ImageSource,
};
use lopdf::{Document, Object};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

fn png(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}

/// Counts how many times the wrapped body is dropped.
struct Tracked {
    inner: ImageBody,
    drops: Arc<AtomicUsize>,
}

impl Stream for Tracked {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A tracked body that yields `data` after `delay`.
fn tracked(data: Vec<u8>, delay: Duration) -> (ImageBody, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let inner = stream::once(async move {
        tokio::time::sleep(delay).await;
        Ok(Bytes::from(data))
    })
    .boxed();
    let body = Tracked {
        inner,
        drops: Arc::clone(&drops),
    }
    .boxed();
    (body, drops)
}

fn config(workers: usize) -> ConversionConfig {
    ConversionConfig::builder().workers(workers).build().unwrap()
}

/// `[width, height]` of each page's MediaBox, in page order.
fn page_sizes(pdf: &[u8]) -> Vec<(i64, i64)> {
    let doc = Document::load_mem(pdf).expect("output should parse as PDF");
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            let num = |o: &Object| match o {
                Object::Integer(i) => *i,
                Object::Real(r) => r.round() as i64,
                other => panic!("unexpected MediaBox entry {other:?}"),
            };
            (num(&media_box[2]), num(&media_box[3]))
        })
        .collect()
}

// ── Round trip ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_png_becomes_one_page_of_the_same_size() {
    let sources = vec![ImageSource::from_bytes(0, "tall.png", "image/png", png(100, 200))];
    let mut pdf = Vec::new();
    let outcome = convert(sources, &config(2), &CancelSignal::new(), &mut pdf).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(page_sizes(&pdf), vec![(100, 200)]);
    assert_eq!(outcome.stats.output_bytes, pdf.len());
}

#[tokio::test]
async fn mixed_formats_are_all_embedded() {
    let sources = vec![
        ImageSource::from_bytes(0, "a.jpg", "image/jpeg", image_bytes(30, 40, ImageFormat::Jpeg)),
        ImageSource::from_bytes(1, "b.png", "image/png", png(50, 60)),
        ImageSource::from_bytes(2, "c.webp", "image/webp", image_bytes(70, 80, ImageFormat::WebP)),
        // Declared type missing; sniffed from the bytes.
        ImageSource::from_bytes(3, "d", "", png(90, 10)),
    ];
    let mut pdf = Vec::new();
    let outcome = convert(sources, &config(4), &CancelSignal::new(), &mut pdf).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.stats.embedded_images, 4);
    assert_eq!(page_sizes(&pdf), vec![(30, 40), (50, 60), (70, 80), (90, 10)]);
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn page_order_follows_index_not_completion() {
    // Earlier indices finish last.
    let mut sources = Vec::new();
    let mut counters = Vec::new();
    for i in 0..6u32 {
        let delay = Duration::from_millis(u64::from(60 - i * 10));
        let (body, drops) = tracked(png(10 + i, 10), delay);
        sources.push(ImageSource::from_body(i as usize, format!("{i}.png"), "image/png", body));
        counters.push(drops);
    }
    // Submission order does not matter either.
    sources.reverse();

    let mut pdf = Vec::new();
    let outcome = convert(sources, &config(6), &CancelSignal::new(), &mut pdf).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    let widths: Vec<i64> = page_sizes(&pdf).into_iter().map(|(w, _)| w).collect();
    assert_eq!(widths, vec![10, 11, 12, 13, 14, 15]);
    let indices: Vec<usize> = outcome.images.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    for drops in counters {
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_input_writes_nothing() {
    let mut pdf = Vec::new();
    let outcome = convert(Vec::new(), &config(2), &CancelSignal::new(), &mut pdf).await;

    assert!(!outcome.has_content);
    assert!(matches!(outcome.error, Some(ConvertError::NoSupportedImages)));
    assert!(pdf.is_empty());
    assert_eq!(outcome.stats.output_bytes, 0);
}

#[tokio::test]
async fn all_corrupt_images_leave_no_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("broken.pdf");

    let mut sources = Vec::new();
    let mut counters = Vec::new();
    for i in 0..3 {
        let (body, drops) = tracked(b"definitely not an image".to_vec(), Duration::ZERO);
        sources.push(ImageSource::from_body(i, format!("{i}.png"), "image/png", body));
        counters.push(drops);
    }

    let outcome = convert_to_file(sources, &target, &config(2), &CancelSignal::new()).await;

    assert!(matches!(outcome.error, Some(ConvertError::NoSupportedImages)));
    assert_eq!(outcome.failures().count(), 3);
    assert!(!target.exists());
    for drops in counters {
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn failed_run_removes_stale_output_file() {
    let input = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("a.png"), b"corrupt").unwrap();
    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("out.pdf");
    std::fs::write(&target, b"%PDF-1.5 from an earlier run").unwrap();

    let outcome = convert_dir(input.path(), &target, &config(1), &CancelSignal::new()).await;

    assert!(matches!(outcome.error, Some(ConvertError::NoSupportedImages)));
    assert!(!target.exists(), "stale output must not survive a failed run");
}

#[tokio::test]
async fn cancelled_run_removes_stale_output_file() {
    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("out.pdf");
    std::fs::write(&target, b"%PDF-1.5 from an earlier run").unwrap();

    let cancel = CancelSignal::new();
    cancel.cancel();
    let sources = vec![ImageSource::from_bytes(0, "a.png", "image/png", png(4, 4))];
    let outcome = convert_to_file(sources, &target, &config(1), &cancel).await;

    assert!(matches!(outcome.error, Some(ConvertError::Cancelled)));
    assert!(!target.exists());
}

#[tokio::test]
async fn successful_run_replaces_existing_output_file() {
    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("out.pdf");
    std::fs::write(&target, b"old").unwrap();

    let sources = vec![ImageSource::from_bytes(0, "a.png", "image/png", png(6, 9))];
    let outcome = convert_to_file(sources, &target, &config(1), &CancelSignal::new()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(page_sizes(&std::fs::read(&target).unwrap()), vec![(6, 9)]);
}

#[tokio::test]
async fn one_corrupt_image_does_not_abort_the_batch() {
    let sources = vec![
        ImageSource::from_bytes(0, "a.png", "image/png", png(10, 10)),
        ImageSource::from_bytes(1, "notes.txt", "text/plain", b"hello".to_vec()),
        ImageSource::from_bytes(2, "c.png", "image/png", png(20, 20)),
    ];
    let mut pdf = Vec::new();
    let outcome = convert(sources, &config(3), &CancelSignal::new(), &mut pdf).await;

    assert!(outcome.is_success());
    assert_eq!(page_sizes(&pdf), vec![(10, 10), (20, 20)]);
    let failed: Vec<&str> = outcome.failures().map(|r| r.name.as_str()).collect();
    assert_eq!(failed, vec!["notes.txt"]);
    assert!(matches!(
        outcome.images[1].error,
        Some(ImageError::UnsupportedFormat { .. })
    ));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_before_start_embeds_nothing() {
    let cancel = CancelSignal::new();
    cancel.cancel();

    let mut sources = Vec::new();
    let mut counters = Vec::new();
    for i in 0..4 {
        let (body, drops) = tracked(png(8, 8), Duration::ZERO);
        sources.push(ImageSource::from_body(i, format!("{i}.png"), "image/png", body));
        counters.push(drops);
    }

    let mut pdf = Vec::new();
    let outcome = convert(sources, &config(2), &cancel, &mut pdf).await;

    assert!(!outcome.has_content);
    assert!(matches!(outcome.error, Some(ConvertError::Cancelled)));
    assert!(pdf.is_empty());
    assert_eq!(outcome.stats.cancelled_images, 4);
    for drops in counters {
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

/// Fires the shared signal once `after` images have completed.
struct CancelAfter {
    cancel: CancelSignal,
    after: usize,
    completed: AtomicUsize,
}

impl ConversionProgressCallback for CancelAfter {
    fn on_image_complete(&self, _index: usize, _total: usize, _name: &str, _bytes: usize) {
        if self.completed.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.cancel.cancel();
        }
    }
}

#[tokio::test]
async fn cancel_mid_batch_never_writes_a_partial_pdf() {
    let cancel = CancelSignal::new();
    let callback = Arc::new(CancelAfter {
        cancel: cancel.clone(),
        after: 2,
        completed: AtomicUsize::new(0),
    });
    let config = ConversionConfig::builder()
        .workers(1)
        .progress_callback(callback as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();

    let mut counters = Vec::new();
    let mut sources = Vec::new();
    for i in 0..3 {
        let (body, drops) = tracked(png(12, 12), Duration::from_millis(20));
        sources.push(ImageSource::from_body(i, format!("{i}.png"), "image/png", body));
        counters.push(drops);
    }
    let (body, drops) = tracked(b"corrupt".to_vec(), Duration::from_millis(20));
    sources.push(ImageSource::from_body(3, "3.png", "image/png", body));
    counters.push(drops);

    let mut pdf = Vec::new();
    let outcome = convert(sources, &config, &cancel, &mut pdf).await;

    assert!(matches!(outcome.error, Some(ConvertError::Cancelled)));
    assert!(!outcome.has_content);
    assert!(pdf.is_empty());
    assert_eq!(outcome.images.len(), 4);
    assert!(outcome.stats.cancelled_images >= 1);
    for drops in counters {
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

// ── Directory batch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn directory_batch_orders_pages_by_file_name() {
    let input = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("02.png"), png(20, 5)).unwrap();
    std::fs::write(input.path().join("01.JPG"), image_bytes(10, 5, ImageFormat::Jpeg)).unwrap();
    std::fs::write(input.path().join("03.webp"), image_bytes(30, 5, ImageFormat::WebP)).unwrap();
    std::fs::write(input.path().join("readme.md"), b"# not an image").unwrap();
    std::fs::create_dir(input.path().join("nested.png")).unwrap();

    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("album.pdf");
    let outcome = convert_dir(input.path(), &target, &config(2), &CancelSignal::new()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    let pdf = std::fs::read(&target).unwrap();
    let widths: Vec<i64> = page_sizes(&pdf).into_iter().map(|(w, _)| w).collect();
    assert_eq!(widths, vec![10, 20, 30]);
}

#[tokio::test]
async fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.pdf");
    let outcome = convert_dir(
        dir.path().join("does-not-exist"),
        &target,
        &config(1),
        &CancelSignal::new(),
    )
    .await;

    assert!(matches!(
        outcome.error,
        Some(ConvertError::InputDirUnreadable { .. })
    ));
    assert!(!target.exists());
}

#[tokio::test]
async fn missing_directory_removes_stale_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.pdf");
    std::fs::write(&target, b"old").unwrap();

    let outcome = convert_dir(dir.path().join("nope"), &target, &config(1), &CancelSignal::new()).await;

    assert!(outcome.error.is_some());
    assert!(!target.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_images_are_scanned() {
    let originals = tempfile::tempdir().unwrap();
    let real = originals.path().join("real.png");
    std::fs::write(&real, png(14, 7)).unwrap();

    let input = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(&real, input.path().join("a.png")).unwrap();
    let target = input.path().join("out.pdf");

    let outcome = convert_dir(input.path(), &target, &config(1), &CancelSignal::new()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(page_sizes(&std::fs::read(&target).unwrap()), vec![(14, 7)]);
}
