// src/downloader.rs
use crate::observer::{Progress, ProgressObserver};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Granularity of progress reports.
pub const BLOCK_SIZE: u64 = 8192;

/// Outcome of a single download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub downloaded: bool,
    pub path: PathBuf,
    /// Why the download failed, when it did.
    pub error: Option<String>,
}

/// Streams `url` into `destination`, reporting progress to `observer`.
///
/// Never returns an error: network, HTTP status and IO failures produce a
/// result with `downloaded == false` and leave any partial file in place.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    observer: &dyn ProgressObserver,
) -> DownloadResult {
    match stream_to_file(client, url, destination, observer).await {
        Ok(bytes) => {
            debug!(url, bytes, path = %destination.display(), "download complete");
            DownloadResult {
                downloaded: true,
                path: destination.to_path_buf(),
                error: None,
            }
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(url, error = %reason, "download failed");
            DownloadResult {
                downloaded: false,
                path: destination.to_path_buf(),
                error: Some(reason),
            }
        }
    }
}

async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    observer: &dyn ProgressObserver,
) -> Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .context("Server refused the request")?;
    let total = response.content_length();

    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }

    let file = fs::File::create(destination)
        .await
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let mut writer = BufWriter::new(file);

    let report = |blocks: u64| {
        observer.update(Progress {
            blocks,
            block_size: BLOCK_SIZE,
            total,
        })
    };

    let mut written: u64 = 0;
    let mut blocks: u64 = 0;
    report(blocks);

    while let Some(chunk_bytes) = response.chunk().await? {
        writer.write_all(&chunk_bytes).await?;
        written += chunk_bytes.len() as u64;

        let full_blocks = written / BLOCK_SIZE;
        if full_blocks > blocks {
            blocks = full_blocks;
            report(blocks);
        }
    }

    // Ensure all bytes are on disk before reporting success
    writer.flush().await?;

    if written % BLOCK_SIZE != 0 {
        blocks += 1;
        report(blocks);
    }
    observer.finish();

    Ok(written)
}
