//! The two download flows: menu driven and direct.
//!
//! Both end the same way: resolve the media URL on the chosen mirror,
//! download it, fetch its digest file and verify.
use crate::catalog::{self, Architecture, ImageType, MediaSpec};
use crate::config::Settings;
use crate::downloader::download_file;
use crate::error::{GensystemError, Result};
use crate::geo::GeoResolver;
use crate::menu::{ChoiceTable, Prompter};
use crate::mirrors::MirrorDirectory;
use crate::observer::{ConsoleObserver, ProgressObserver};
use crate::utils;
use crate::verify::{Verification, fetch_and_verify};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// How a mirror is picked once the country is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorSelection {
    /// Ask the user.
    Manual,
    /// Any mirror of the country, picked at random.
    Arbitrary,
}

/// Arguments of a direct (non-interactive) download.
#[derive(Debug, Clone)]
pub struct DirectRequest {
    pub image: ImageType,
    /// Mirror base URL; skips country detection and mirror choice when set.
    pub mirror: Option<String>,
    pub arch: String,
    pub selection: MirrorSelection,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Downloaded and verified.
    Verified { path: PathBuf },
    DownloadFailed { url: String, reason: String },
    /// Downloaded, but the digest did not match or could not be fetched.
    Unverified {
        path: PathBuf,
        verification: Verification,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Verified { .. })
    }
}

/// One invocation's worth of state: settings, HTTP client and the prompt.
pub struct Session<R, W> {
    client: reqwest::Client,
    geo: GeoResolver,
    directory: MirrorDirectory,
    prompter: Prompter<R, W>,
    download_dir: PathBuf,
    timeout: Duration,
    show_progress: bool,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(
        settings: &Settings,
        directory: MirrorDirectory,
        prompter: Prompter<R, W>,
        download_dir: PathBuf,
    ) -> Result<Self> {
        let client = settings.http_client()?;
        let geo = GeoResolver::new(
            client.clone(),
            settings.ip_lookup_url.clone(),
            settings.geoip_url.clone(),
            settings.timeout(),
        );
        Ok(Self {
            client,
            geo,
            directory,
            prompter,
            download_dir,
            timeout: settings.timeout(),
            show_progress: true,
        })
    }

    /// Hides progress bars; messages still go to the prompt output.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn into_prompter(self) -> Prompter<R, W> {
        self.prompter
    }

    /// Menu driven flow: architecture, country, mirror, image, then download.
    pub async fn interactive(&mut self) -> Result<Outcome> {
        let arch = self.select_arch()?;
        let country = self.select_country()?;
        let mirror = self.select_mirror(&country)?;
        let image = self.select_image(arch)?;
        let spec = arch.media(image)?;
        self.fetch(&spec, &mirror).await
    }

    /// Direct flow driven by command line arguments.
    pub async fn direct(&mut self, request: &DirectRequest) -> Result<Outcome> {
        let arch = Architecture::find(&request.arch)
            .ok_or_else(|| GensystemError::Config(format!("unknown architecture {}", request.arch)))?;
        let spec = arch.media(request.image)?;

        let mirror = match &request.mirror {
            Some(mirror) => mirror.clone(),
            None => {
                let country = self.detect_country().await?;
                match request.selection {
                    MirrorSelection::Manual => self.select_mirror(&country)?,
                    MirrorSelection::Arbitrary => self.arbitrary_mirror(&country)?,
                }
            }
        };
        self.fetch(&spec, &mirror).await
    }

    fn select_arch(&mut self) -> Result<&'static Architecture> {
        let table = ChoiceTable::new(catalog::ARCH_NAMES);
        let name = self
            .prompter
            .select("ARCHITECTURES", "\nSELECT ARCHITECTURE: ", &table)?;
        Architecture::find(name).ok_or_else(|| GensystemError::InvalidUserChoice(name.to_string()))
    }

    fn select_country(&mut self) -> Result<String> {
        let table = ChoiceTable::new(self.directory.country_names());
        let prompt = match table.rank_of("USA") {
            Some(rank) => format!("\nSELECT COUNTRY (e.g. {rank} for USA): "),
            None => "\nSELECT COUNTRY: ".to_string(),
        };
        let country = self.prompter.select("COUNTRIES", &prompt, &table)?;
        Ok(country.to_string())
    }

    fn select_mirror(&mut self, country: &str) -> Result<String> {
        let country = self
            .directory
            .country(country)
            .ok_or_else(|| GensystemError::UnknownCountry(country.to_string()))?;
        let table = ChoiceTable::new(country.mirror_names());
        let heading = format!("MIRRORS IN {}", country.name.to_uppercase());
        let name = self.prompter.select(&heading, "\nSELECT MIRROR: ", &table)?;
        country
            .mirror(name)
            .map(|m| m.url.clone())
            .ok_or_else(|| GensystemError::InvalidUserChoice(name.to_string()))
    }

    fn arbitrary_mirror(&mut self, country: &str) -> Result<String> {
        let mirror = self
            .directory
            .country(country)
            .and_then(|c| c.arbitrary_mirror())
            .ok_or_else(|| GensystemError::UnknownCountry(country.to_string()))?;
        let message = format!("Using mirror {} ({})", mirror.name, mirror.url);
        let url = mirror.url.clone();
        self.prompter.say(&message)?;
        Ok(url)
    }

    fn select_image(&mut self, arch: &'static Architecture) -> Result<ImageType> {
        let table = ChoiceTable::unsorted(arch.images().iter().map(|i| i.name()));
        let heading = format!("MEDIA FOR {}", arch.name.to_uppercase());
        let name = self.prompter.select(&heading, "\nSELECT MEDIA: ", &table)?;
        name.parse()
    }

    /// Country from the GeoIP lookup, or from the menu when that fails.
    async fn detect_country(&mut self) -> Result<String> {
        match self.geo.resolve_country(&self.directory).await {
            Some(country) => {
                self.prompter.say(&format!("Detected country: {country}"))?;
                Ok(country)
            }
            None => {
                self.prompter
                    .say("Could not determine your country, please pick one.")?;
                self.select_country()
            }
        }
    }

    fn observer(&self, label: &str) -> ConsoleObserver {
        if self.show_progress {
            ConsoleObserver::new(label)
        } else {
            ConsoleObserver::hidden()
        }
    }

    /// Resolves, downloads and verifies the chosen media from `mirror`.
    async fn fetch(&mut self, spec: &MediaSpec, mirror: &str) -> Result<Outcome> {
        let url = catalog::resolve_media_url(&self.client, mirror, spec, self.timeout).await?;
        let url = url.to_string();
        let file_name = utils::get_filename_from_url(&url);
        let destination = self.download_dir.join(&file_name);

        info!(%url, path = %destination.display(), "downloading");
        self.prompter.say(&format!("Downloading {url}"))?;

        let observer = self.observer(&file_name);
        let result = download_file(&self.client, &url, &destination, &observer).await;
        if !result.downloaded {
            let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
            self.prompter
                .say(&format!("Download of {url} failed: {reason}"))?;
            return Ok(Outcome::DownloadFailed { url, reason });
        }

        let digest_observer = self.observer("DIGESTS");
        let verification = fetch_and_verify(
            &self.client,
            &url,
            &result.path,
            &digest_observer as &dyn ProgressObserver,
            self.show_progress,
        )
        .await;
        debug!(?verification, "verification finished");

        let path = result.path;
        let outcome = match verification {
            Verification::Verified => {
                self.prompter
                    .say(&format!("Verified {}", path.display()))?;
                Outcome::Verified { path }
            }
            Verification::Mismatch => {
                self.prompter.say(&format!(
                    "Checksum mismatch, {} may be corrupt and was kept for inspection",
                    path.display()
                ))?;
                Outcome::Unverified { path, verification }
            }
            Verification::Skipped => {
                self.prompter.say(&format!(
                    "Digest file unavailable, verification of {} was skipped",
                    path.display()
                ))?;
                Outcome::Unverified { path, verification }
            }
        };
        Ok(outcome)
    }
}
