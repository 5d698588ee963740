//! Command-line binary entrypoint for `gensystem`.
//!
//! Parses arguments, sets up logging and configuration, and maps the
//! outcome of a download onto the process exit status.
mod args;

use anyhow::Result;
use args::{Args, Commands, DownloadArgs};
use clap::{CommandFactory, Parser};
use gensystem::catalog::DEFAULT_ARCH;
use gensystem::menu::Prompter;
use gensystem::mirrors::MirrorDirectory;
use gensystem::verify::Verification;
use gensystem::{DirectRequest, GensystemError, MirrorSelection, Outcome, Session, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Download failed, could not be verified, or the arguments were incomplete.
const EXIT_FAILURE: u8 = 1;
/// The requested subcommand exists but does nothing yet.
const EXIT_NOT_IMPLEMENTED: u8 = 3;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Built-in mirrors, refreshed from the mirror page when asked to, plus configured extras.
async fn mirror_directory(settings: &Settings, refresh: bool) -> Result<MirrorDirectory> {
    let mut directory = MirrorDirectory::builtin();
    if refresh || settings.refresh_mirrors {
        let client = settings.http_client()?;
        if let Err(e) = directory
            .refresh(&client, &settings.mirrors_url, settings.timeout())
            .await
        {
            warn!(error = %e, "could not refresh mirrors, using the built-in list");
        }
    }
    Ok(directory.with_extra(&settings.mirrors))
}

async fn download(
    download: DownloadArgs,
    dir: Option<PathBuf>,
    refresh_mirrors: bool,
    settings: &Settings,
) -> Result<ExitCode> {
    if !download.interactive && download.file.is_none() {
        if let Some(sub) = Args::command().find_subcommand_mut("download") {
            sub.print_help()?;
        }
        return Ok(ExitCode::from(EXIT_FAILURE));
    }

    let download_dir = dir
        .or_else(|| settings.download_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let directory = mirror_directory(settings, refresh_mirrors).await?;
    let mut session = Session::new(settings, directory, Prompter::stdio(), download_dir)?;

    let outcome = match download.file {
        Some(kind) if !download.interactive => {
            let arch = download
                .arch
                .or_else(|| settings.default_arch.clone())
                .unwrap_or_else(|| DEFAULT_ARCH.to_string());
            let request = DirectRequest {
                image: kind.into(),
                mirror: download.mirror,
                arch,
                selection: if download.select_mirror {
                    MirrorSelection::Manual
                } else {
                    MirrorSelection::Arbitrary
                },
            };
            session.direct(&request).await?
        }
        _ => session.interactive().await?,
    };

    let failure = match outcome {
        Outcome::Verified { path } => {
            println!("✅ Downloaded and verified {}", path.display());
            return Ok(ExitCode::SUCCESS);
        }
        Outcome::DownloadFailed { url, reason } => GensystemError::DownloadFailure { url, reason },
        Outcome::Unverified {
            path,
            verification: Verification::Mismatch,
        } => GensystemError::VerificationMismatch { path },
        Outcome::Unverified { path, .. } => {
            eprintln!("❌ {} was downloaded but could not be verified", path.display());
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };
    eprintln!("❌ {failure}");
    Ok(ExitCode::from(EXIT_FAILURE))
}

async fn run(args: Args) -> Result<ExitCode> {
    let settings = Settings::load_or_default(args.config.as_deref());

    match args.command {
        Commands::Download(download_args) => {
            download(download_args, args.dir, args.refresh_mirrors, &settings).await
        }
        Commands::Install => {
            eprintln!("❌ {}", GensystemError::NotImplemented("install"));
            Ok(ExitCode::from(EXIT_NOT_IMPLEMENTED))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
