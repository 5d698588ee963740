//! Media catalog: supported architectures, image types and where their
//! autobuilds live on a mirror.
//!
//! Autobuild file names carry a build stamp (`stage3-amd64-openrc-20240101T170000Z.tar.xz`),
//! so the final media URL is found by reading the autobuild directory listing
//! and picking the newest file that matches the image's naming rule.
use crate::error::{GensystemError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Mirror-relative path of an autobuild directory.
pub const RELEASES_TEMPLATE: &str = "releases/{arch}/autobuilds/{dir}/";

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*"([^"?#]+)""#).unwrap());

static BUILD_STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}T\d{6}Z$").unwrap());

/// The kinds of installation media the tool knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// Minimal installation CD.
    Minimal,
    /// Plain OpenRC stage3 tarball.
    Stage3,
    Hardened,
    /// Stage3 without 32-bit multilib support.
    Nomultilib,
}

impl ImageType {
    pub const ALL: [ImageType; 4] = [
        ImageType::Minimal,
        ImageType::Stage3,
        ImageType::Hardened,
        ImageType::Nomultilib,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ImageType::Minimal => "minimal",
            ImageType::Stage3 => "stage3",
            ImageType::Hardened => "hardened",
            ImageType::Nomultilib => "nomultilib",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageType {
    type Err = GensystemError;

    fn from_str(s: &str) -> Result<Self> {
        ImageType::ALL
            .into_iter()
            .find(|image| image.name() == s)
            .ok_or_else(|| GensystemError::InvalidUserChoice(s.to_string()))
    }
}

/// An architecture and the rules for naming its media.
#[derive(Debug, PartialEq, Eq)]
pub struct Architecture {
    /// Name used in release paths and install ISOs (`x86`).
    pub name: &'static str,
    /// Name used in stage3 tarballs (`i686` for x86).
    stage_flavour: &'static str,
    images: &'static [ImageType],
}

pub const DEFAULT_ARCH: &str = "amd64";

pub const ARCH_NAMES: [&str; 3] = ["amd64", "arm64", "x86"];

pub static ARCHITECTURES: [Architecture; 3] = [
    Architecture {
        name: "amd64",
        stage_flavour: "amd64",
        images: &ImageType::ALL,
    },
    Architecture {
        name: "arm64",
        stage_flavour: "arm64",
        images: &[ImageType::Minimal, ImageType::Stage3],
    },
    Architecture {
        name: "x86",
        stage_flavour: "i686",
        images: &[ImageType::Minimal, ImageType::Stage3, ImageType::Hardened],
    },
];

impl Architecture {
    pub fn find(name: &str) -> Option<&'static Architecture> {
        ARCHITECTURES.iter().find(|arch| arch.name == name)
    }

    /// Image types published for this architecture, in menu order.
    pub fn images(&self) -> &'static [ImageType] {
        self.images
    }

    pub fn supports(&self, image: ImageType) -> bool {
        self.images.contains(&image)
    }

    /// Naming rules for `image` on this architecture.
    ///
    /// # Errors
    ///
    /// [`GensystemError::UnsupportedImage`] when the architecture does not
    /// publish that image type.
    pub fn media(&'static self, image: ImageType) -> Result<MediaSpec> {
        if !self.supports(image) {
            return Err(GensystemError::UnsupportedImage {
                arch: self.name.to_string(),
                image: image.to_string(),
            });
        }
        let (stem, extension) = match image {
            ImageType::Minimal => (format!("install-{}-minimal", self.name), "iso"),
            ImageType::Stage3 => (format!("stage3-{}-openrc", self.stage_flavour), "tar.xz"),
            ImageType::Hardened => (
                format!("stage3-{}-hardened-openrc", self.stage_flavour),
                "tar.xz",
            ),
            ImageType::Nomultilib => (
                format!("stage3-{}-nomultilib-openrc", self.stage_flavour),
                "tar.xz",
            ),
        };
        Ok(MediaSpec {
            arch: self,
            image,
            stem,
            extension,
        })
    }
}

/// Where one image type of one architecture lives and how its files are named.
#[derive(Debug, Clone)]
pub struct MediaSpec {
    pub arch: &'static Architecture,
    pub image: ImageType,
    stem: String,
    extension: &'static str,
}

impl MediaSpec {
    /// Autobuild directory name, e.g. `current-stage3-amd64-openrc`.
    pub fn directory(&self) -> String {
        format!("current-{}", self.stem)
    }

    /// Mirror-relative release path built from [`RELEASES_TEMPLATE`].
    pub fn release_path(&self) -> String {
        RELEASES_TEMPLATE
            .replace("{arch}", self.arch.name)
            .replace("{dir}", &self.directory())
    }

    /// Whether `file_name` is a build of this media: `<stem>-<stamp>.<ext>`.
    pub fn matches(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.stem.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(self.extension))
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|stamp| BUILD_STAMP.is_match(stamp))
    }

    /// Autobuild directory URL on the given mirror.
    pub fn release_url(&self, mirror: &str) -> Result<Url> {
        let base = if mirror.ends_with('/') {
            mirror.to_string()
        } else {
            format!("{mirror}/")
        };
        Url::parse(&base)
            .and_then(|base| base.join(&self.release_path()))
            .map_err(|e| GensystemError::Config(format!("invalid mirror URL {mirror}: {e}")))
    }
}

/// Picks the newest file in an HTML directory listing that matches `spec`.
pub fn find_media_file(listing: &str, spec: &MediaSpec) -> Option<String> {
    HREF.captures_iter(listing)
        .filter_map(|caps| caps.get(1))
        .filter_map(|href| href.as_str().rsplit('/').next())
        .filter(|name| spec.matches(name))
        .max()
        .map(str::to_string)
}

/// Resolves the full media URL for `spec` on `mirror` by reading the
/// autobuild directory listing.
pub async fn resolve_media_url(
    client: &reqwest::Client,
    mirror: &str,
    spec: &MediaSpec,
    timeout: Duration,
) -> Result<Url> {
    let directory = spec.release_url(mirror)?;
    debug!(url = %directory, "reading autobuild listing");

    let failure = |reason: String| GensystemError::DownloadFailure {
        url: directory.to_string(),
        reason,
    };
    let response = client
        .get(directory.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| failure(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failure(format!("HTTP {}", response.status())));
    }
    let listing = response.text().await.map_err(|e| failure(e.to_string()))?;

    let file = find_media_file(&listing, spec).ok_or_else(|| GensystemError::MediaNotFound {
        image: spec.image.to_string(),
        url: directory.to_string(),
    })?;
    directory
        .join(&file)
        .map_err(|e| GensystemError::Config(format!("invalid media file name {file}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
<html><body><pre>
<a href="../">../</a>
<a href="stage3-amd64-openrc-20240101T170000Z.tar.xz">stage3-amd64-openrc-20240101T170000Z.tar.xz</a>
<a href="stage3-amd64-openrc-20240101T170000Z.tar.xz.DIGESTS">stage3-amd64-openrc-20240101T170000Z.tar.xz.DIGESTS</a>
<a href="stage3-amd64-openrc-20240108T170000Z.tar.xz">stage3-amd64-openrc-20240108T170000Z.tar.xz</a>
<a href="stage3-amd64-openrc-20240108T170000Z.tar.xz.asc">stage3-amd64-openrc-20240108T170000Z.tar.xz.asc</a>
<a href="stage3-amd64-openrc-20240108T170000Z.tar.xz.CONTENTS.gz">contents</a>
</pre></body></html>
"#;

    fn amd64() -> &'static Architecture {
        Architecture::find("amd64").unwrap()
    }

    #[test]
    fn test_arch_names_match_table() {
        let names: Vec<&str> = ARCHITECTURES.iter().map(|a| a.name).collect();
        assert_eq!(names, ARCH_NAMES);
        assert!(Architecture::find(DEFAULT_ARCH).is_some());
        assert!(Architecture::find("sparc").is_none());
    }

    #[test]
    fn test_image_type_parsing() {
        for image in ImageType::ALL {
            assert_eq!(image.name().parse::<ImageType>().unwrap(), image);
        }
        assert!("livecd".parse::<ImageType>().is_err());
    }

    #[test]
    fn test_release_paths() {
        let stage3 = amd64().media(ImageType::Stage3).unwrap();
        assert_eq!(
            stage3.release_path(),
            "releases/amd64/autobuilds/current-stage3-amd64-openrc/"
        );

        let minimal = Architecture::find("x86").unwrap().media(ImageType::Minimal).unwrap();
        assert_eq!(
            minimal.release_path(),
            "releases/x86/autobuilds/current-install-x86-minimal/"
        );

        let hardened = Architecture::find("x86").unwrap().media(ImageType::Hardened).unwrap();
        assert_eq!(hardened.directory(), "current-stage3-i686-hardened-openrc");
    }

    #[test]
    fn test_unsupported_image() {
        let err = Architecture::find("x86")
            .unwrap()
            .media(ImageType::Nomultilib)
            .unwrap_err();
        assert!(matches!(err, GensystemError::UnsupportedImage { .. }));
    }

    #[test]
    fn test_release_url_joins_with_or_without_slash() {
        let spec = amd64().media(ImageType::Stage3).unwrap();
        let expected =
            "http://example.org/gentoo/releases/amd64/autobuilds/current-stage3-amd64-openrc/";
        assert_eq!(spec.release_url("http://example.org/gentoo/").unwrap().as_str(), expected);
        assert_eq!(spec.release_url("http://example.org/gentoo").unwrap().as_str(), expected);
        assert!(spec.release_url("not a url").is_err());
    }

    #[test]
    fn test_matches_only_media_files() {
        let spec = amd64().media(ImageType::Stage3).unwrap();
        assert!(spec.matches("stage3-amd64-openrc-20240101T170000Z.tar.xz"));
        assert!(!spec.matches("stage3-amd64-openrc-20240101T170000Z.tar.xz.DIGESTS"));
        assert!(!spec.matches("stage3-amd64-hardened-openrc-20240101T170000Z.tar.xz"));
        assert!(!spec.matches("stage3-amd64-openrc-latest.tar.xz"));

        let minimal = amd64().media(ImageType::Minimal).unwrap();
        assert!(minimal.matches("install-amd64-minimal-20240107T170309Z.iso"));
    }

    #[test]
    fn test_find_media_file_picks_newest() {
        let spec = amd64().media(ImageType::Stage3).unwrap();
        assert_eq!(
            find_media_file(LISTING, &spec).as_deref(),
            Some("stage3-amd64-openrc-20240108T170000Z.tar.xz")
        );

        let minimal = amd64().media(ImageType::Minimal).unwrap();
        assert_eq!(find_media_file(LISTING, &minimal), None);
    }
}
