//! Scripted in-memory gallery surface for testing.

use crate::error::{ErrorKind, Result};
use crate::{Download, GallerySurface, Locator};
use async_trait::async_trait;
use exn::OptionExt;
use std::time::Duration;
use tokio::sync::RwLock;

/// One scripted library item: its locator, the bytes a download produces,
/// and the markup a raw-page fetch returns.
#[derive(Debug, Clone)]
pub struct MockItem {
    pub locator: Locator,
    pub payload: Vec<u8>,
    pub suggested_filename: String,
    pub markup: String,
    /// When set, triggering a download of this item times out instead of
    /// producing bytes.
    pub fail_download: bool,
}

impl MockItem {
    pub fn new(locator: impl Into<Locator>, suggested_filename: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            payload: b"bytes".to_vec(),
            suggested_filename: suggested_filename.into(),
            markup: String::new(),
            fail_download: false,
        }
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }

    /// Script this item's download to never complete.
    pub fn with_failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    /// Index into `items` of the currently-displayed item.
    position: Option<usize>,
    /// Set by `request_previous`, consumed by `await_locator_change`.
    advance_pending: bool,
    /// Where the session actually is; a redirect target makes this differ
    /// from the opened root.
    current: Option<Locator>,
    downloads: u32,
}

/// Scripted gallery surface for testing.
///
/// Items are held oldest-first, matching capture order; "previous in display
/// order" therefore moves the position towards the *end* of the list, the
/// same direction the real gallery walks. State sits behind a [`RwLock`] so
/// all trait methods can operate on `&self` without external
/// synchronisation (the same shape as a real session).
///
/// # Examples
///
/// ```
/// use picvault_surface::{GallerySurface, mock::{MockItem, MockSurface}};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let surface = MockSurface::with_items([
///     MockItem::new("https://gallery.test/photo/a", "a.jpg"),
///     MockItem::new("https://gallery.test/photo/b", "b.jpg"),
/// ]);
/// surface.open("https://gallery.test/").await?;
/// let newest = surface.focus_newest().await?.unwrap();
/// assert_eq!(newest.as_str(), "https://gallery.test/photo/b");
/// # Ok(())
/// # }
/// ```
pub struct MockSurface {
    items: Vec<MockItem>,
    state: RwLock<MockState>,
    /// When set, opening the root "redirects" the session here instead,
    /// simulating an authentication bounce.
    redirect_to: Option<Locator>,
    scratch: tempfile::TempDir,
}

impl MockSurface {
    /// Create a surface scripted with items in capture order, oldest first.
    ///
    /// Panics if the scratch directory cannot be created. If test setup is
    /// wrong, then test should not pass.
    pub fn with_items(items: impl IntoIterator<Item = MockItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
            state: RwLock::new(MockState::default()),
            redirect_to: None,
            scratch: tempfile::tempdir().expect("MockSurface scratch directory"),
        }
    }

    /// Script an authentication redirect: `open` lands on `target` instead
    /// of the requested root.
    pub fn with_redirect(mut self, target: impl Into<Locator>) -> Self {
        self.redirect_to = Some(target.into());
        self
    }

    /// How many downloads have been triggered so far.
    pub async fn download_count(&self) -> u32 {
        self.state.read().await.downloads
    }

    fn index_of(&self, locator: &Locator) -> Option<usize> {
        self.items.iter().position(|item| &item.locator == locator)
    }
}

#[async_trait]
impl GallerySurface for MockSurface {
    async fn open(&self, root: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.current = Some(self.redirect_to.clone().unwrap_or_else(|| Locator::new(root)));
        state.position = None;
        Ok(())
    }

    async fn current_locator(&self) -> Result<Locator> {
        let state = self.state.read().await;
        if let Some(position) = state.position {
            return Ok(self.items[position].locator.clone());
        }
        state.current.clone().ok_or_raise(|| ErrorKind::Protocol("surface not opened".to_string()))
    }

    async fn focus_newest(&self) -> Result<Option<Locator>> {
        Ok(self.items.last().map(|item| item.locator.clone()))
    }

    async fn goto(&self, locator: &Locator) -> Result<()> {
        let mut state = self.state.write().await;
        state.position = self.index_of(locator);
        state.current = Some(locator.clone());
        if state.position.is_none() {
            exn::bail!(ErrorKind::Protocol(format!("no scripted item at {locator}")));
        }
        Ok(())
    }

    async fn request_previous(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.advance_pending = true;
        Ok(())
    }

    async fn await_locator_change(&self, old: &Locator, _timeout: Duration) -> Result<Locator> {
        let mut state = self.state.write().await;
        if !state.advance_pending {
            exn::bail!(ErrorKind::Timeout("locator change"));
        }
        state.advance_pending = false;
        let position = state.position.ok_or_raise(|| ErrorKind::Protocol("no current item".to_string()))?;
        let next = position + 1;
        if next >= self.items.len() {
            exn::bail!(ErrorKind::Timeout("locator change"));
        }
        state.position = Some(next);
        let locator = self.items[next].locator.clone();
        if &locator == old {
            exn::bail!(ErrorKind::Timeout("locator change"));
        }
        state.current = Some(locator.clone());
        Ok(locator)
    }

    async fn trigger_download(&self, _timeout: Duration) -> Result<Download> {
        let mut state = self.state.write().await;
        let position = state.position.ok_or_raise(|| ErrorKind::Protocol("no current item".to_string()))?;
        let item = &self.items[position];
        if item.fail_download {
            exn::bail!(ErrorKind::Timeout("download completion"));
        }
        state.downloads += 1;
        let temp_path = self.scratch.path().join(format!("download-{}", state.downloads));
        tokio::fs::write(&temp_path, &item.payload).await.map_err(ErrorKind::Io)?;
        Ok(Download { temp_path, suggested_filename: item.suggested_filename.clone() })
    }

    async fn fetch_raw_markup(&self, locator: &Locator) -> Result<String> {
        let position =
            self.index_of(locator).ok_or_raise(|| ErrorKind::Protocol(format!("no scripted item at {locator}")))?;
        Ok(self.items[position].markup.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
