//! # gensystem
//!
//! `gensystem` helps pick, download and verify Gentoo Linux installation
//! media. It supports:
//! - Menu driven selection of architecture, country, mirror and image
//! - Direct downloads with an optional explicit mirror
//! - Guessing the country from the public IP address
//! - Verifying downloads against the published `.DIGESTS` files
//!
//! The binary drives everything through [`orchestrator::Session`]; the
//! building blocks are exposed for tests and custom front ends.

pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod geo;
pub mod menu;
pub mod mirrors;
pub mod observer;
pub mod orchestrator;
pub mod utils;
pub mod verify;

pub use config::Settings;
pub use error::GensystemError;
pub use orchestrator::{DirectRequest, MirrorSelection, Outcome, Session};
