//! Walk direction and termination.
//!
//! The walk runs oldest-to-newest in a single forward pass: each step asks
//! the gallery for the *previous* item in display order, which is the
//! next-newer item in capture order. The newest item — established once,
//! up front — is the stopping condition; there is no re-visitation.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use picvault_surface::{GallerySurface, Locator};
use std::time::Duration;
use tracing::{instrument, trace};

/// Decides the walk direction and detects loop termination.
pub struct TraversalController {
    navigation_timeout: Duration,
}

impl TraversalController {
    pub fn new(navigation_timeout: Duration) -> Self {
        Self { navigation_timeout }
    }

    /// Establish the walk's upper bound: the item the library currently
    /// considers newest.
    ///
    /// # Errors
    /// [`ErrorKind::LatestUnknown`] when the surface cannot resolve one.
    /// Fatal — without a known upper bound there is no safe resumable
    /// state.
    #[instrument(skip_all)]
    pub async fn latest(&self, surface: &dyn GallerySurface) -> Result<Locator> {
        surface.focus_newest().await.or_raise(|| ErrorKind::LatestUnknown)?.ok_or_raise(|| ErrorKind::LatestUnknown)
    }

    /// Move to the previous item in display order and block until the
    /// surface reports a locator different from `current`.
    pub async fn advance(&self, surface: &dyn GallerySurface, current: &Locator) -> Result<Locator> {
        surface.request_previous().await.or_raise(|| ErrorKind::Surface)?;
        let next =
            surface.await_locator_change(current, self.navigation_timeout).await.or_raise(|| ErrorKind::Surface)?;
        trace!(from = %current, to = %next, "advanced");
        Ok(next)
    }

    /// True when the walk has caught up to the newest item. Canonical
    /// comparison, like every locator comparison in the system.
    pub fn caught_up(current: &Locator, latest: &Locator) -> bool {
        current == latest
    }
}
