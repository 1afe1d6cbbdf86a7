//! Surface Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A surface error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for surface operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The browser process could not be located or spawned.
    #[display("failed to launch browser: {_0}")]
    Launch(#[error(not(source))] String),
    /// The DevTools WebSocket connection failed or dropped.
    #[display("devtools transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// The browser answered, but not with what the protocol promised.
    #[display("devtools protocol error: {_0}")]
    Protocol(#[error(not(source))] String),
    /// A bounded wait elapsed before the surface reached the expected state.
    #[display("timed out waiting for {_0}")]
    Timeout(#[error(not(source))] &'static str),
    /// The download began but never completed, or was cancelled by the browser.
    #[display("download did not complete")]
    DownloadFailed,
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
        // A timed-out wait may succeed on a retry; everything else means the
        // session is in an unknown state and must be re-established.
        matches!(self, Self::Timeout(_))
    }
}
