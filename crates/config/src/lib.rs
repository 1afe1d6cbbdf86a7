//! Settings for picvault.
//!
//! One [`Settings`] struct, merged from four layers in increasing
//! precedence: built-in defaults, an optional `picvault.toml`, environment
//! variables prefixed `PICVAULT_`, and whatever the CLI chooses to merge on
//! top. Validation happens once, after the merge, so every consumer can
//! treat a `Settings` value as already-checked.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filename probed in the working directory when no explicit config file is
/// given.
pub const DEFAULT_CONFIG_FILENAME: &str = "picvault.toml";

/// The complete, validated run configuration.
///
/// Timeout fields are in seconds; the defaults come from the bounds the
/// gallery has been observed to need in practice (downloads of large video
/// items are the slow case).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where archived files and the checkpoint live. No default; every
    /// deployment must choose its archive deliberately.
    pub archive_root: PathBuf,
    /// Persistent browser profile directory, holding the authenticated
    /// session cookies between runs.
    pub session_dir: PathBuf,
    /// Landing locator of the gallery, also used as the authentication
    /// probe.
    pub gallery_root: String,
    /// Seed item for the very first run, when no checkpoint exists yet.
    pub start_locator: Option<String>,
    /// Explicit browser binary; when unset, well-known names are probed on
    /// `PATH`.
    pub browser_binary: Option<PathBuf>,
    pub headless: bool,
    /// Persist scraped dates back into file metadata.
    pub write_back: bool,
    /// File everything directly under the archive root instead of
    /// `year/month` subdirectories.
    pub flat_layout: bool,
    /// Display locale of the gallery account; gates the label-scraping
    /// grammar.
    pub locale: String,
    /// IANA timezone the browser session runs under. Scraped dates are
    /// rendered in this zone, so it should match the account's.
    pub timezone: String,
    pub download_timeout: u64,
    pub navigation_timeout: u64,
    pub metadata_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::new(),
            session_dir: default_session_dir(),
            gallery_root: "https://photos.google.com/".to_string(),
            start_locator: None,
            browser_binary: None,
            headless: true,
            write_back: false,
            flat_layout: false,
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            download_timeout: 100,
            navigation_timeout: 30,
            metadata_timeout: 10,
        }
    }
}

impl Settings {
    /// The provider chain, exposed so the CLI can merge its own overrides
    /// on top before extracting.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let base = Figment::from(Serialized::defaults(Settings::default()));
        let with_file = match config_file {
            // An explicitly named file must exist.
            Some(path) => base.merge(Toml::file_exact(path)),
            None => base.merge(Toml::file(DEFAULT_CONFIG_FILENAME)),
        };
        with_file.merge(Env::prefixed("PICVAULT_"))
    }

    /// Load and validate settings from the standard provider chain.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::extract(Self::figment(config_file))
    }

    /// Extract settings without validation. For commands that only touch
    /// the session fields and shouldn't demand a configured archive.
    pub fn parse(figment: Figment) -> Result<Self> {
        Ok(figment.extract().map_err(ErrorKind::Load)?)
    }

    /// Extract and validate settings from an already-assembled figment.
    pub fn extract(figment: Figment) -> Result<Self> {
        let settings = Self::parse(figment)?;
        settings.validate()?;
        debug!(
            archive_root = %settings.archive_root.display(),
            locale = settings.locale,
            headless = settings.headless,
            "configuration loaded"
        );
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.archive_root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid(
                "archive_root is not set — point it at the directory that should hold the backup".to_string()
            ));
        }
        if self.session_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid(
                "session_dir is not set and no platform data directory could be determined".to_string()
            ));
        }
        if picvault_resolve::locale::lookup(&self.locale).is_none() {
            exn::bail!(ErrorKind::Invalid(format!(
                "unsupported locale {:?} (supported: {})",
                self.locale,
                picvault_resolve::locale::supported().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(())
    }
}

/// Platform data directory for the persistent browser profile.
fn default_session_dir() -> PathBuf {
    ProjectDirs::from("", "", "picvault").map(|dirs| dirs.data_dir().join("session")).unwrap_or_default()
}
