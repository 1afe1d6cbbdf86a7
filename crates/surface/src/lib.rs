//! Gallery surface capability for picvault.
//!
//! The backup engine never talks to a browser directly. Everything it needs
//! from the rendered gallery — navigation, keyboard-driven focus and
//! download, raw page markup — is expressed as the [`GallerySurface`] trait,
//! and the engine is written against that trait alone.
//!
//! Two implementations live here: [`CdpSurface`](crate::cdp::CdpSurface),
//! which drives a real Chromium instance over the DevTools protocol, and
//! [`MockSurface`](crate::mock::MockSurface) (behind the `mock` feature) for
//! tests.

pub mod cdp;
pub mod error;
mod locator;
#[cfg(feature = "mock")]
pub mod mock;

pub use crate::locator::Locator;
#[cfg(feature = "mock")]
pub use crate::mock::MockSurface;

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// A completed download handed back by the surface: the file as it landed in
/// the surface's scratch directory, plus the filename the gallery suggested.
#[derive(Debug, Clone)]
pub struct Download {
    /// Where the byte stream was written. Temporary; the caller moves it.
    pub temp_path: PathBuf,
    /// Filename suggested by the gallery for this item.
    pub suggested_filename: String,
}

/// Narrow interface over the interactive web gallery.
///
/// One live session, single consumer, strictly sequential: the engine never
/// overlaps a download with navigation. Methods take `&self`; implementations
/// use interior mutability for their session state.
///
/// Locator equality anywhere in the system is *canonical* equality — see
/// [`Locator`] — so implementations may return locators with or without a
/// multi-account path segment and comparisons still behave.
#[async_trait]
pub trait GallerySurface: Send + Sync {
    /// Navigate the session to the gallery root and wait for it to settle.
    async fn open(&self, root: &str) -> Result<()>;

    /// The locator currently displayed by the session.
    ///
    /// Immediately after [`open`](Self::open) this is how the caller detects
    /// an authentication redirect: a current locator that isn't the gallery
    /// root means the service bounced us elsewhere.
    async fn current_locator(&self) -> Result<Locator>;

    /// Focus the newest item in the library grid and return its locator.
    ///
    /// Keyboard-driven in the real implementation: the first right-arrow
    /// press from the freshly-loaded grid lands on the newest item. Returns
    /// `None` when no item link could be resolved.
    async fn focus_newest(&self) -> Result<Option<Locator>>;

    /// Navigate directly to an item.
    async fn goto(&self, locator: &Locator) -> Result<()>;

    /// Ask the gallery to move to the previous item in display order (the
    /// next-newer item in capture order).
    ///
    /// Fire-and-forget: completion is observed by
    /// [`await_locator_change`](Self::await_locator_change). Which underlying
    /// mechanism achieves the move (key press, injected click) is an
    /// implementation detail callers must not depend on.
    async fn request_previous(&self) -> Result<()>;

    /// Block until the displayed locator differs (canonically) from `old`,
    /// returning the new locator. Bounded by `timeout`.
    async fn await_locator_change(&self, old: &Locator, timeout: Duration) -> Result<Locator>;

    /// Trigger a native-style download of the currently displayed item and
    /// wait for its byte stream to complete. Bounded by `timeout`; a timeout
    /// here is fatal to the run (the caller cannot know whether the item was
    /// even begun).
    async fn trigger_download(&self, timeout: Duration) -> Result<Download>;

    /// Fetch the raw markup of an item's page, using the live session's
    /// credentials.
    async fn fetch_raw_markup(&self, locator: &Locator) -> Result<String>;

    /// Release the session. Safe to call once at the end of a run, on both
    /// success and failure paths.
    async fn close(&self) -> Result<()>;
}
