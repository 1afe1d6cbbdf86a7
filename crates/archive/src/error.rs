//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every variant here is run-fatal. Conditions the engine absorbs locally —
//! unrecoverable dates, failed metadata back-writes, sidecar moves, the
//! single placement-collision retry — never surface as errors at all; they
//! are logged where they happen and the run continues.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No checkpoint on disk and no explicit start locator supplied.
    #[display(
        "no checkpoint found and no start locator supplied — pass an initial item locator \
         or populate the checkpoint file in the archive root"
    )]
    ResumeUnavailable,
    /// The gallery bounced the session away from its root.
    #[display("gallery redirected to {_0} — authenticate first using the `setup` command")]
    AuthenticationRequired(#[error(not(source))] String),
    /// The newest library item could not be established. Without that upper
    /// bound there is no safe resumable state, so the run cannot start.
    #[display("could not determine the newest library item")]
    LatestUnknown,
    /// The download never completed within its bound. Fatal per item: there
    /// is no way to know whether the byte stream was even begun.
    #[display("download did not complete in time")]
    DownloadTimeout,
    /// A downloaded file could not be moved into the archive. Fatal: the
    /// checkpoint must never advance past an item that is not on disk.
    #[display("could not place downloaded file in the archive")]
    Placement,
    /// The destination is already occupied. Internal signal for the
    /// collision-disambiguation retry; only escapes if the retry fails too.
    #[display("destination already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// The checkpoint file could not be read or written.
    #[display("checkpoint error")]
    Checkpoint,
    /// No checkpoint file, or a blank one. Not fatal by itself — the
    /// orchestrator may seed from an explicit start locator.
    #[display("no checkpoint recorded")]
    NoCheckpoint,
    /// A gallery surface operation failed.
    #[display("gallery surface error")]
    Surface,
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Only a collision is worth a second attempt, and the engine already
        // performs exactly one (with a disambiguated name).
        matches!(self, Self::AlreadyExists(_))
    }
}
