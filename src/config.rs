//! User configuration, read from `~/.config/gensystem/config.toml`.
//!
//! Every key is optional; command line flags override what is set here.
//!
//! ```toml
//! download_dir = "/var/tmp/gentoo"
//! timeout_secs = 20
//! refresh_mirrors = true
//!
//! [[mirrors]]
//! country = "USA"
//! name = "Local cache"
//! url = "http://cache.lan/gentoo/"
//! ```
use crate::error::{GensystemError, Result};
use crate::mirrors::GENTOO_MIRRORS_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";
/// `{ip}` is replaced by the address being looked up.
pub const DEFAULT_GEOIP_URL: &str = "https://ipapi.co/{ip}/country/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("gensystem/", env!("CARGO_PKG_VERSION"));

/// A mirror added on top of the built-in directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExtraMirror {
    pub country: String,
    /// Mirror page code, only needed for countries missing from the built-in table.
    pub code: Option<String>,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub download_dir: Option<PathBuf>,
    pub default_arch: Option<String>,
    pub ip_lookup_url: String,
    pub geoip_url: String,
    /// Timeout for lookups and directory listings; downloads only bound the connect phase.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Read the live mirror page before building menus.
    pub refresh_mirrors: bool,
    pub mirrors_url: String,
    pub mirrors: Vec<ExtraMirror>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: None,
            default_arch: None,
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            geoip_url: DEFAULT_GEOIP_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            refresh_mirrors: false,
            mirrors_url: GENTOO_MIRRORS_URL.to_string(),
            mirrors: Vec::new(),
        }
    }
}

impl Settings {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gensystem").join("config.toml"))
    }

    /// Loads settings from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads settings from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GensystemError::Config`] if the file exists but cannot be
    /// read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| GensystemError::Config(format!("reading {}: {e}", path.display())))?;
        let settings = Self::parse(&text)
            .map_err(|e| GensystemError::Config(format!("parsing {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Like [`load_from`](Self::load_from) / [`load`](Self::load) but falls
    /// back to defaults with a warning instead of failing.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let loaded = match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        };
        loaded.unwrap_or_else(|e| {
            warn!(error = %e, "ignoring configuration");
            Self::default()
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// HTTP client used for lookups, listings and downloads.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.timeout())
            .build()?)
    }
}
