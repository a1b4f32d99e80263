// Fetcher - streaming archive transfer

use futures_util::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::{DownloadProgress, FetchError, ProgressCallback};

/// How much of the body must arrive, relative to the declared expected
/// size, before the transfer is considered plausible.
const MIN_EXPECTED_FRACTION: u64 = 2;

/// Stream `url` into `dest`, reporting progress against the declared
/// content length when present. Bodies without a declared length are
/// accepted up to `max_unsized_bytes`; beyond that the transfer is aborted.
///
/// Returns the number of bytes written.
pub async fn download_to(
    client: &reqwest::Client,
    model_id: &str,
    url: &str,
    dest: &Path,
    expected_size: u64,
    max_unsized_bytes: u64,
    progress: Option<&ProgressCallback>,
) -> Result<u64, FetchError> {
    log::info!("Starting download for model {}: {}", model_id, url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Network(format!("Failed to start download: {}", e)))?;

    if !response.status().is_success() {
        return Err(FetchError::Network(format!(
            "Download failed with status: {}",
            response.status()
        )));
    }

    let total_size = response.content_length();
    match total_size {
        Some(total) => log::info!(
            "Response successful, content length: {} bytes ({:.1} MB)",
            total,
            total as f64 / (1024.0 * 1024.0)
        ),
        None => log::warn!(
            "No content length declared for model {}; buffering up to {} bytes",
            model_id,
            max_unsized_bytes
        ),
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| FetchError::Disk(format!("Failed to create staging file: {}", e)))?;

    let report = |downloaded: u64| {
        if let Some(callback) = progress {
            callback(DownloadProgress {
                model_id: model_id.to_string(),
                downloaded_bytes: downloaded,
                total_bytes: total_size,
                percent: total_size
                    .filter(|total| *total > 0)
                    .map(|total| (downloaded as f32 / total as f32) * 100.0),
            });
        }
    };

    report(0);

    // Report roughly every 1% or 512 KiB, whichever is more frequent
    let threshold = total_size
        .map(|total| (total / 100).min(512 * 1024).max(1))
        .unwrap_or(512 * 1024);

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_report: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| FetchError::Network(format!("Download interrupted: {}", e)))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::Disk(format!("Failed to write staging file: {}", e)))?;

        downloaded += chunk.len() as u64;

        if total_size.is_none() && downloaded > max_unsized_bytes {
            return Err(FetchError::ResourceExhausted(format!(
                "Download for model {} has no declared length and exceeded the {} byte cap",
                model_id, max_unsized_bytes
            )));
        }

        if downloaded - last_report >= threshold {
            report(downloaded);
            last_report = downloaded;
        }
    }

    file.flush()
        .await
        .map_err(|e| FetchError::Disk(format!("Failed to flush staging file: {}", e)))?;
    drop(file);

    report(downloaded);

    // A transfer far short of the declared archive size is not worth
    // handing to the extractor.
    if expected_size > 0 && downloaded < expected_size / MIN_EXPECTED_FRACTION {
        return Err(FetchError::CorruptArchive(format!(
            "Downloaded archive too small: {} bytes (expected ~{})",
            downloaded, expected_size
        )));
    }

    log::info!(
        "Download complete for model {}: {:.1} MB",
        model_id,
        downloaded as f64 / (1024.0 * 1024.0)
    );

    Ok(downloaded)
}
