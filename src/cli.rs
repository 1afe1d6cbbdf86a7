use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "picvault", about = "Unattended, resumable backup of a web photo gallery", version)]
pub struct Args {
    /// Path to a TOML configuration file (default: ./picvault.toml if present).
    #[arg(long, global = true, env = "PICVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one backup pass: resume from the checkpoint (or seed a fresh
    /// run), walk the library up to its newest item, and archive every item
    /// on the way.
    Start(StartArgs),
    /// Open a headed browser on the gallery for one-time interactive login.
    ///
    /// The session cookies persist in the session directory; close the
    /// browser window when signed in.
    Setup(SetupArgs),
}

#[derive(clap::Args)]
pub struct StartArgs {
    /// Directory that holds the archived files and the checkpoint.
    #[arg(long)]
    pub archive_root: Option<PathBuf>,

    /// Persistent browser profile directory.
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    /// Item locator to seed the very first run from, when no checkpoint
    /// exists yet. Usually the oldest item in the library.
    #[arg(long)]
    pub initial_locator: Option<String>,

    /// Run the browser headless (true) or visibly (false).
    #[arg(long)]
    pub headless: Option<bool>,

    /// Persist scraped dates back into file metadata.
    #[arg(long)]
    pub write_back: bool,

    /// File everything directly under the archive root, no year/month
    /// subdirectories.
    #[arg(long)]
    pub flat_layout: bool,

    /// Display locale of the gallery account (e.g. en-US, fr-FR).
    #[arg(long)]
    pub locale: Option<String>,

    /// IANA timezone the browser session runs under.
    #[arg(long)]
    pub timezone: Option<String>,
}

#[derive(clap::Args)]
pub struct SetupArgs {
    /// Persistent browser profile directory.
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    /// Display locale the session is created under.
    #[arg(long)]
    pub locale: Option<String>,

    /// IANA timezone the session is created under.
    #[arg(long)]
    pub timezone: Option<String>,
}
