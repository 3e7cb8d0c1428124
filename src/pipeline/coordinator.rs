//! Bounded-concurrency fan-out / index-ordered fan-in over the normaliser.
//!
//! Every source gets its own task. A task takes a slot from the shared
//! semaphore, fetches the body if the source is URL-only, normalises, and
//! publishes exactly one result on the channel. The channel closes when the
//! last task drops its sender, which is what ends collection.
//!
//! Cancellation is checked before taking a slot, while waiting for one,
//! right after getting one, and before publishing. Once it fires, the
//! collector fills every empty position with a cancellation result and keeps
//! draining until all tasks have exited, so no body outlives the call.
//!
//! Positions are assigned after a stable sort by index; the returned vector
//! has exactly one entry per input, ordered by index.

use crate::cancel::CancelSignal;
use crate::error::ImageError;
use crate::output::NormalizedImage;
use crate::pipeline::{fetch, normalize};
use crate::progress::ProgressCallback;
use crate::source::ImageSource;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Settings for one coordinator run.
#[derive(Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub jpeg_quality: u8,
    pub progress: Option<ProgressCallback>,
}

/// Normalise all `sources` using at most `options.workers` concurrent tasks.
///
/// Always returns `sources.len()` results, sorted by index.
pub async fn run(
    sources: Vec<ImageSource>,
    options: &PoolOptions,
    client: &reqwest::Client,
    cancel: &CancelSignal,
) -> Vec<NormalizedImage> {
    let total = sources.len();
    if total == 0 {
        return Vec::new();
    }

    let mut sources = sources;
    sources.sort_by_key(ImageSource::index);
    let labels: Vec<(usize, String)> = sources
        .iter()
        .map(|s| (s.index(), s.original_name.clone()))
        .collect();

    let workers = options.workers.max(1);
    let progress = options.progress.clone();
    if let Some(cb) = &progress {
        cb.on_conversion_start(total);
    }
    info!(images = total, workers, "normalising images");

    let semaphore = Arc::new(Semaphore::new(workers));
    let (tx, mut rx) = mpsc::channel::<(usize, NormalizedImage)>(total);

    for (position, source) in sources.into_iter().enumerate() {
        let tx = tx.clone();
        let semaphore = Arc::clone(&semaphore);
        let client = client.clone();
        let cancel = cancel.clone();
        let progress = progress.clone();
        let quality = options.jpeg_quality;

        tokio::spawn(async move {
            let mut result =
                process_item(source, &semaphore, &client, quality, &cancel, &progress, total).await;
            if cancel.is_cancelled() && !result.is_cancelled() {
                result = NormalizedImage::cancelled(result.index, result.original_name);
            }
            let _ = tx.send((position, result)).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<NormalizedImage>> = (0..total).map(|_| None).collect();
    let mut filled_on_cancel = false;
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some((position, result)) => {
                    if slots[position].is_some() {
                        // Already synthesised as cancelled; drop the late result.
                        continue;
                    }
                    report(&progress, &result, total);
                    slots[position] = Some(result);
                }
                None => break,
            },
            _ = cancel.cancelled(), if !filled_on_cancel => {
                filled_on_cancel = true;
                let mut synthesised = 0usize;
                for (position, slot) in slots.iter_mut().enumerate() {
                    if slot.is_none() {
                        let (index, name) = &labels[position];
                        let result = NormalizedImage::cancelled(*index, name.clone());
                        report(&progress, &result, total);
                        *slot = Some(result);
                        synthesised += 1;
                    }
                }
                info!(synthesised, "cancelled; waiting for workers to release their inputs");
            }
        }
    }

    let cancelled = cancel.is_cancelled();
    let results: Vec<NormalizedImage> = slots
        .into_iter()
        .zip(labels)
        .map(|(slot, (index, name))| match slot {
            Some(result) => result,
            None if cancelled => NormalizedImage::cancelled(index, name),
            None => {
                warn!(index, name = %name, "worker exited without a result");
                NormalizedImage::failed(index, name.clone(), ImageError::WorkerLost { name })
            }
        })
        .collect();

    let ok = results.iter().filter(|r| r.outcome.is_ok()).count();
    if let Some(cb) = &progress {
        cb.on_conversion_complete(total, ok);
    }
    info!(ok, total, "normalisation finished");
    results
}

/// One worker: slot → optional fetch → normalise. The slot is released on return.
async fn process_item(
    mut source: ImageSource,
    semaphore: &Semaphore,
    client: &reqwest::Client,
    jpeg_quality: u8,
    cancel: &CancelSignal,
    progress: &Option<ProgressCallback>,
    total: usize,
) -> NormalizedImage {
    let index = source.index();
    let name = source.original_name.clone();

    if cancel.is_cancelled() {
        return NormalizedImage::cancelled(index, name);
    }

    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return NormalizedImage::cancelled(index, name),
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return NormalizedImage::cancelled(index, name),
        },
    };

    if cancel.is_cancelled() {
        return NormalizedImage::cancelled(index, name);
    }

    if !source.has_body() {
        let Some(url) = source.url().filter(|u| !u.is_empty()).map(str::to_string) else {
            return NormalizedImage::failed(index, name.clone(), ImageError::MissingSource { name });
        };
        source = match fetch::fetch_image(client, &url, index, cancel).await {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!(index, url = %url, "fetch failed: {e}");
                return NormalizedImage::failed(index, name, e);
            }
        };
    }

    if let Some(cb) = progress {
        cb.on_image_start(index, total, &source.original_name);
    }
    normalize::normalize(source, jpeg_quality, cancel).await
}

fn report(progress: &Option<ProgressCallback>, result: &NormalizedImage, total: usize) {
    match &result.outcome {
        Ok(img) => {
            debug!(index = result.index, name = %result.original_name, bytes = img.data.len(), "image ready");
            if let Some(cb) = progress {
                cb.on_image_complete(result.index, total, &result.original_name, img.data.len());
            }
        }
        Err(e) => {
            if !e.is_cancelled() {
                warn!(index = result.index, name = %result.original_name, "image skipped: {e}");
            }
            if let Some(cb) = progress {
                cb.on_image_error(result.index, total, &result.original_name, &e.to_string());
            }
        }
    }
}
