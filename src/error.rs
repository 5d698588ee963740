//! Error types shared by the library modules.
//!
//! Most failure paths in gensystem degrade instead of aborting (a failed geo
//! lookup falls back to a menu, a missing digest skips verification), so
//! these variants mostly reach the user as a printed message and an exit
//! status rather than as a panic or an unwound stack.
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, GensystemError>;

#[derive(Debug, Error)]
pub enum GensystemError {
    /// A menu answer that is not one of the listed numbers.
    #[error("invalid choice: {0:?}")]
    InvalidUserChoice(String),

    /// The prompt reached end of input before a valid answer was given.
    #[error("input closed before a choice was made")]
    InputClosed,

    /// Public IP or GeoIP lookup failed.
    #[error("lookup via {url} failed: {reason}")]
    LookupFailure { url: String, reason: String },

    /// GeoIP answered with a country the mirror directory does not know.
    #[error("country code {0:?} has no mirrors")]
    UnknownCountry(String),

    #[error("download of {url} failed: {reason}")]
    DownloadFailure { url: String, reason: String },

    #[error("checksum mismatch for {}", .path.display())]
    VerificationMismatch { path: PathBuf },

    /// No file in the autobuild directory matched the image pattern.
    #[error("no {image} media found under {url}")]
    MediaNotFound { image: String, url: String },

    #[error("{arch} does not publish {image} images")]
    UnsupportedImage { arch: String, image: String },

    #[error("{0} is not implemented yet")]
    NotImplemented(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
