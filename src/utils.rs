//! Utility helpers used across the crate.
//!
//! Filename extraction from URLs, sibling paths for digest files and
//! hashing local files with a progress bar.
use crate::verify::HashAlgorithm;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use percent_encoding::percent_decode_str;
use sanitize_filename::sanitize;
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

/// Suffix Gentoo appends to media URLs for their digest files.
pub const DIGESTS_SUFFIX: &str = ".DIGESTS";

/// Extracts a clean filename from a URL.
///
/// 1. Parses the URL.
/// 2. Extracts the last segment of the path.
/// 3. URL-decodes it (converts %20 to space, etc.).
/// 4. Sanitizes it to remove characters invalid for the OS.
/// 5. Falls back to "output.bin" if no valid filename is found.
pub fn get_filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|mut s| s.next_back().unwrap_or("").to_string())
        })
        .map(|s| percent_decode_str(&s).decode_utf8_lossy().to_string())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output.bin".to_string())
}

/// `<url>.DIGESTS`
pub fn digest_url(media_url: &str) -> String {
    format!("{media_url}{DIGESTS_SUFFIX}")
}

/// `<path>.DIGESTS`, next to the media file.
pub fn digest_path(media_path: &Path) -> PathBuf {
    let mut name = media_path.as_os_str().to_os_string();
    name.push(DIGESTS_SUFFIX);
    PathBuf::from(name)
}

fn hash_with<D: Digest>(file: &mut std::fs::File, pb: &ProgressBar) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0; 8192];

    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }

        hasher.update(&buffer[..count]);
        pb.inc(count as u64);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Calculates the hex digest of a file, drawing a progress bar when `show_progress` is set.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_digest(path: &Path, algorithm: HashAlgorithm, show_progress: bool) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let file_size = file.metadata()?.len();

    let pb = if show_progress {
        ProgressBar::new(file_size)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.yellow/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Hashing ({algorithm})"));

    let digest = match algorithm {
        HashAlgorithm::Sha512 => hash_with::<Sha512>(&mut file, &pb)?,
        HashAlgorithm::Sha256 => hash_with::<Sha256>(&mut file, &pb)?,
    };

    pb.finish_and_clear();
    Ok(digest)
}
