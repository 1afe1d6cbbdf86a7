//! Metadata Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The external tool binary could not be located.
    #[display("metadata tool not found: {_0}")]
    ToolMissing(#[error(not(source))] String),
    /// The tool ran but exited non-zero or produced unusable output.
    #[display("metadata tool failed: {_0}")]
    ToolFailed(#[error(not(source))] String),
    /// The tool did not answer within the configured bound.
    #[display("metadata operation timed out")]
    Timeout,
    /// Underlying I/O error spawning or talking to the tool.
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
        matches!(self, Self::Timeout)
    }
}
