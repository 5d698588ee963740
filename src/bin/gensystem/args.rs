//! Command-line argument definitions for the `gensystem` binary.
use clap::builder::PossibleValuesParser;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueEnum};
use gensystem::catalog::{self, ImageType};
use std::path::PathBuf;

/// Pick, download and verify Gentoo installation media.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Directory to save downloads in. Defaults to the configured directory or ".".
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Use this configuration file instead of the default one.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Refresh the mirror list from gentoo.org before choosing a mirror.
    #[arg(long, global = true)]
    pub refresh_mirrors: bool,

    /// Log more (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download installation media
    Download(DownloadArgs),
    /// Install Gentoo (not implemented yet)
    Install,
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    /// Choose everything from menus.
    #[arg(short, long, conflicts_with = "file")]
    pub interactive: bool,

    /// Image type to download directly.
    #[arg(short, long, value_enum)]
    pub file: Option<ImageKind>,

    /// Mirror base URL, e.g. http://distfiles.gentoo.org/
    #[arg(short, long, requires = "file", conflicts_with = "select_mirror")]
    pub mirror: Option<String>,

    /// Architecture. Defaults to the configured one or amd64.
    #[arg(short, long, requires = "file", value_parser = PossibleValuesParser::new(catalog::ARCH_NAMES))]
    pub arch: Option<String>,

    /// Pick the mirror from a menu instead of any mirror in your country.
    #[arg(short, long, requires = "file")]
    pub select_mirror: bool,
}

/// Image type selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ImageKind {
    /// Minimal installation CD
    Minimal,
    /// OpenRC stage3 tarball
    Stage3,
    /// Hardened OpenRC stage3 tarball
    Hardened,
    /// Stage3 without multilib (amd64 only)
    Nomultilib,
}

impl From<ImageKind> for ImageType {
    fn from(kind: ImageKind) -> Self {
        match kind {
            ImageKind::Minimal => ImageType::Minimal,
            ImageKind::Stage3 => ImageType::Stage3,
            ImageKind::Hardened => ImageType::Hardened,
            ImageKind::Nomultilib => ImageType::Nomultilib,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("gensystem").chain(argv.iter().copied()))
    }

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn direct_download_flags() {
        let args = parse(&["download", "-f", "stage3", "-m", "http://example.org/gentoo/", "-a", "amd64"]).unwrap();
        let Commands::Download(download) = args.command else {
            panic!("expected download");
        };
        assert_eq!(download.file, Some(ImageKind::Stage3));
        assert_eq!(download.mirror.as_deref(), Some("http://example.org/gentoo/"));
        assert_eq!(download.arch.as_deref(), Some("amd64"));
        assert!(!download.interactive);
    }

    #[test]
    fn interactive_and_file_conflict() {
        assert!(parse(&["download", "-i", "-f", "minimal"]).is_err());
    }

    #[test]
    fn mirror_requires_file() {
        assert!(parse(&["download", "-m", "http://example.org/"]).is_err());
        assert!(parse(&["download", "-s"]).is_err());
    }

    #[test]
    fn mirror_conflicts_with_select() {
        assert!(parse(&["download", "-f", "stage3", "-m", "http://x/", "-s"]).is_err());
    }

    #[test]
    fn unknown_values_rejected() {
        assert!(parse(&["download", "-f", "livecd"]).is_err());
        assert!(parse(&["download", "-f", "stage3", "-a", "sparc"]).is_err());
    }

    #[test]
    fn refresh_mirrors_is_global() {
        assert!(parse(&["download", "-i", "--refresh-mirrors"]).unwrap().refresh_mirrors);
        assert!(parse(&["--refresh-mirrors", "download", "-i"]).unwrap().refresh_mirrors);
        assert!(!parse(&["download", "-i"]).unwrap().refresh_mirrors);
    }

    #[test]
    fn install_and_bare_download_parse() {
        assert!(matches!(parse(&["install"]).unwrap().command, Commands::Install));
        let args = parse(&["download"]).unwrap();
        let Commands::Download(download) = args.command else {
            panic!("expected download");
        };
        assert!(!download.interactive && download.file.is_none());
    }
}
