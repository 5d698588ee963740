//! Integrity checks against Gentoo `.DIGESTS` files.
//!
//! A digest file holds sections like
//!
//! ```text
//! # SHA512 HASH
//! 2f2a...  stage3-amd64-openrc-20240101T170000Z.tar.xz
//! ```
//!
//! possibly inside a PGP clear-signed envelope, with further sections for
//! other algorithms and for the `.CONTENTS.gz` companion file.
use crate::downloader::download_file;
use crate::observer::ProgressObserver;
use crate::utils;
use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha512,
    Sha256,
}

impl HashAlgorithm {
    /// Maps the name in a `# <NAME> HASH` header; unsupported names give `None`.
    pub fn from_header_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA512" => Some(HashAlgorithm::Sha512),
            "SHA256" => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha512 => f.write_str("SHA512"),
            HashAlgorithm::Sha256 => f.write_str("SHA256"),
        }
    }
}

/// One `<hash>  <file>` line under a supported header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub algorithm: HashAlgorithm,
    pub hash: String,
    pub file_name: String,
}

/// Parses every supported checksum line of a digest file.
pub fn parse_digests(text: &str) -> Vec<DigestEntry> {
    let mut entries = Vec::new();
    let mut current = None;

    for line in text.lines().map(str::trim) {
        if let Some(header) = line.strip_prefix('#') {
            let words: Vec<&str> = header.split_whitespace().collect();
            current = match words[..] {
                [name, "HASH"] => HashAlgorithm::from_header_name(name),
                _ => None,
            };
            continue;
        }
        let Some(algorithm) = current else {
            continue;
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [hash, file_name] = fields[..] else {
            continue;
        };
        if hash.len() != algorithm.hex_len() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            continue;
        }
        let file_name = file_name.trim_start_matches('*');
        entries.push(DigestEntry {
            algorithm,
            hash: hash.to_ascii_lowercase(),
            file_name: file_name.rsplit('/').next().unwrap_or(file_name).to_string(),
        });
    }

    entries
}

/// Verifies `download_path` against the entries for it in `digest_path`.
///
/// Every supported checksum listed for the file must match. A digest file
/// without any entry for the file counts as a mismatch.
///
/// # Errors
///
/// Returns an error if either file cannot be read.
pub fn verify_download(download_path: &Path, digest_path: &Path, show_progress: bool) -> Result<bool> {
    let text = std::fs::read_to_string(digest_path)?;
    let file_name = download_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut expected: Vec<DigestEntry> = parse_digests(&text)
        .into_iter()
        .filter(|entry| entry.file_name == file_name)
        .collect();
    expected.dedup_by_key(|entry| entry.algorithm);

    if expected.is_empty() {
        warn!(file = %file_name, "digest file has no usable checksum for the download");
        return Ok(false);
    }

    for entry in &expected {
        let actual = utils::file_digest(download_path, entry.algorithm, show_progress)?;
        debug!(algorithm = %entry.algorithm, expected = %entry.hash, %actual, "comparing");
        if !actual.eq_ignore_ascii_case(&entry.hash) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Result of checking a download against its digest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Mismatch,
    /// The digest file could not be fetched, so nothing was checked.
    Skipped,
}

impl Verification {
    pub fn is_verified(self) -> bool {
        self == Verification::Verified
    }
}

/// Fetches `<media_url>.DIGESTS` next to `media_path`, verifies the media and
/// removes the digest file again whatever the outcome.
pub async fn fetch_and_verify(
    client: &reqwest::Client,
    media_url: &str,
    media_path: &Path,
    observer: &dyn ProgressObserver,
    show_progress: bool,
) -> Verification {
    let digest_path = utils::digest_path(media_path);
    let fetched = download_file(client, &utils::digest_url(media_url), &digest_path, observer).await;

    let outcome = if fetched.downloaded {
        check(media_path.to_path_buf(), digest_path.clone(), show_progress).await
    } else {
        warn!(url = media_url, "digest file unavailable, skipping verification");
        Verification::Skipped
    };

    if let Err(e) = tokio::fs::remove_file(&digest_path).await {
        debug!(path = %digest_path.display(), error = %e, "digest file not removed");
    }
    outcome
}

async fn check(media_path: PathBuf, digest_path: PathBuf, show_progress: bool) -> Verification {
    let result = tokio::task::spawn_blocking(move || {
        verify_download(&media_path, &digest_path, show_progress)
    })
    .await;

    match result {
        Ok(Ok(true)) => Verification::Verified,
        Ok(Ok(false)) => Verification::Mismatch,
        Ok(Err(e)) => {
            warn!(error = %e, "verification failed");
            Verification::Mismatch
        }
        Err(e) => {
            warn!(error = %e, "verification task failed");
            Verification::Mismatch
        }
    }
}
