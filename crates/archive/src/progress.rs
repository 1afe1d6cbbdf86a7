//! Durable run progress: the checkpoint file.
//!
//! The sole piece of state that survives between runs is one text file in
//! the archive root holding the locator of the last successfully archived
//! item. It is read once at startup and overwritten whole after each item
//! lands, so at any moment it points at a file that is confirmed on disk —
//! never ahead of progress.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use picvault_surface::Locator;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Name of the checkpoint file inside the archive root.
pub const CHECKPOINT_FILENAME: &str = ".lastdone";

/// Owns the checkpoint's durable representation.
pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.root.join(CHECKPOINT_FILENAME)
    }

    /// Read the checkpointed locator.
    ///
    /// # Errors
    /// [`ErrorKind::NoCheckpoint`] when the file is missing *or blank* (the
    /// two are deliberately indistinguishable); [`ErrorKind::Checkpoint`]
    /// for anything else.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Locator> {
        let path = self.checkpoint_path();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == IoErrorKind::NotFound => {
                exn::bail!(ErrorKind::NoCheckpoint);
            },
            Err(error) => return Err(error).or_raise(|| ErrorKind::Checkpoint),
        };
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            exn::bail!(ErrorKind::NoCheckpoint);
        }
        debug!(checkpoint = trimmed, "checkpoint loaded");
        Ok(Locator::new(trimmed))
    }

    /// Overwrite the checkpoint with `locator`, creating the archive root
    /// first if it doesn't exist yet. A failure here is fatal to the run:
    /// continuing without durable progress would force a full re-walk.
    #[instrument(skip(self), fields(checkpoint = %locator))]
    pub async fn save(&self, locator: &Locator) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.or_raise(|| ErrorKind::Checkpoint)?;
        tokio::fs::write(self.checkpoint_path(), locator.as_str()).await.or_raise(|| ErrorKind::Checkpoint)?;
        Ok(())
    }
}
