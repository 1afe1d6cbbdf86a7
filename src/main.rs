//! picvault — unattended, resumable backup of a web photo gallery.
//!
//! The binary wires the concrete adapters (a Chromium session over the
//! DevTools protocol, exiftool as a subprocess) into the engine from
//! `picvault-archive` and runs one pass. All run-level behaviour lives in
//! the library crates; this file is configuration plumbing.

mod cli;

use crate::cli::{Args, Command, SetupArgs, StartArgs};
use clap::Parser;
use figment::providers::Serialized;
use picvault_archive::{BackupOrchestrator, Context, Layout};
use picvault_config::Settings;
use picvault_metadata::ExiftoolCli;
use picvault_resolve::DateResolver;
use picvault_surface::cdp::{CdpSurface, LaunchOptions};
use picvault_surface::{GallerySurface, Locator};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::uptime;

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();
    let args = Args::parse();
    match args.command {
        Command::Start(start) => run_start(args.config.as_deref(), start).await,
        Command::Setup(setup) => run_setup(args.config.as_deref(), setup).await,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(uptime())
        .with_writer(std::io::stderr)
        .init();
}

/// Boundary conversion: engine errors carry their own user-actionable
/// messages, miette just renders them.
fn diagnose(error: impl std::fmt::Display) -> miette::Report {
    miette::miette!("{error}")
}

async fn run_start(config: Option<&Path>, args: StartArgs) -> miette::Result<()> {
    let settings = start_settings(config, &args).map_err(diagnose)?;

    let resolver = DateResolver::new(&settings.locale, settings.write_back).map_err(diagnose)?;
    let tool = ExiftoolCli::locate(Duration::from_secs(settings.metadata_timeout)).map_err(diagnose)?;
    let surface = CdpSurface::launch(LaunchOptions {
        session_dir: settings.session_dir.clone(),
        headless: settings.headless,
        locale: settings.locale.clone(),
        timezone: settings.timezone.clone(),
        browser_binary: settings.browser_binary.clone(),
        navigation_timeout: Duration::from_secs(settings.navigation_timeout),
        ..LaunchOptions::default()
    })
    .await
    .map_err(diagnose)?;

    let context = Context {
        archive_root: settings.archive_root.clone(),
        gallery_root: settings.gallery_root.clone(),
        start_locator: settings.start_locator.as_deref().map(Locator::new),
        layout: if settings.flat_layout { Layout::Flat } else { Layout::Nested },
        download_timeout: Duration::from_secs(settings.download_timeout),
        navigation_timeout: Duration::from_secs(settings.navigation_timeout),
    };

    let outcome = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.map_err(diagnose)?;
    info!(archived = outcome.archived, latest = %outcome.latest, "backup pass complete");
    Ok(())
}

async fn run_setup(config: Option<&Path>, args: SetupArgs) -> miette::Result<()> {
    let mut figment = Settings::figment(config);
    if let Some(session_dir) = &args.session_dir {
        figment = figment.merge(Serialized::default("session_dir", session_dir));
    }
    if let Some(locale) = &args.locale {
        figment = figment.merge(Serialized::default("locale", locale));
    }
    if let Some(timezone) = &args.timezone {
        figment = figment.merge(Serialized::default("timezone", timezone));
    }
    // Unvalidated: signing in doesn't need an archive configured.
    let settings = Settings::parse(figment).map_err(diagnose)?;

    let surface = CdpSurface::launch(LaunchOptions {
        session_dir: settings.session_dir.clone(),
        headless: false,
        locale: settings.locale.clone(),
        timezone: settings.timezone.clone(),
        browser_binary: settings.browser_binary.clone(),
        ..LaunchOptions::default()
    })
    .await
    .map_err(diagnose)?;

    surface.open(&settings.gallery_root).await.map_err(diagnose)?;
    info!("sign in in the opened browser window, then close it");
    surface.wait_closed().await.map_err(diagnose)?;
    info!(session_dir = %settings.session_dir.display(), "session saved");
    Ok(())
}

fn start_settings(config: Option<&Path>, args: &StartArgs) -> picvault_config::error::Result<Settings> {
    let mut figment = Settings::figment(config);
    if let Some(archive_root) = &args.archive_root {
        figment = figment.merge(Serialized::default("archive_root", archive_root));
    }
    if let Some(session_dir) = &args.session_dir {
        figment = figment.merge(Serialized::default("session_dir", session_dir));
    }
    if let Some(locator) = &args.initial_locator {
        figment = figment.merge(Serialized::default("start_locator", locator));
    }
    if let Some(headless) = args.headless {
        figment = figment.merge(Serialized::default("headless", headless));
    }
    // Plain flags only ever tighten the configuration; their absence must
    // not stomp a value from the file or the environment.
    if args.write_back {
        figment = figment.merge(Serialized::default("write_back", true));
    }
    if args.flat_layout {
        figment = figment.merge(Serialized::default("flat_layout", true));
    }
    if let Some(locale) = &args.locale {
        figment = figment.merge(Serialized::default("locale", locale));
    }
    if let Some(timezone) = &args.timezone {
        figment = figment.merge(Serialized::default("timezone", timezone));
    }
    Settings::extract(figment)
}
