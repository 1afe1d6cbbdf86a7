//! Metadata tool capability for picvault.
//!
//! Reading and writing embedded capture-date tags is delegated to an
//! external tool; the engine consumes it through the [`MetadataTool`] trait.
//! The shipped adapter shells out to [exiftool](https://exiftool.org/)
//! ([`ExiftoolCli`]); tests use [`MockTool`] behind the `mock` feature.

pub mod error;
mod exif;
pub mod exiftool;
#[cfg(feature = "mock")]
pub mod mock;

pub use crate::exif::{format_exif_datetime, parse_exif_datetime};
pub use crate::exiftool::ExiftoolCli;
#[cfg(feature = "mock")]
pub use crate::mock::MockTool;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use time::PrimitiveDateTime;

/// Which embedded tag a date candidate came from.
///
/// `Original` is the photographic capture tag; `Creation` is the container
/// creation tag that QuickTime-style video files carry instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTag {
    Original,
    Creation,
}

/// A capture-date candidate read from a file's embedded metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCandidate {
    pub datetime: PrimitiveDateTime,
    pub tag: DateTag,
}

/// Where a metadata write actually landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The tag was written into the file itself.
    Embedded,
    /// The file format rejected the write; the tag went into a sidecar
    /// descriptor next to the file instead.
    Sidecar(std::path::PathBuf),
}

/// Narrow interface over the external metadata tool.
///
/// Reads prefer the original-capture tag and fall back to the creation tag.
/// Every operation is bounded by the adapter's configured timeout; callers
/// treat timeouts as soft failures (degrade to the next date source), never
/// as run-fatal.
#[async_trait]
pub trait MetadataTool: Send + Sync {
    /// Read the best available capture-date tag from `path`. `Ok(None)`
    /// means the file genuinely carries no usable date tag.
    async fn read_date(&self, path: &Path) -> Result<Option<DateCandidate>>;

    /// Write `datetime` as the original-capture tag on `path`, falling back
    /// to a sidecar descriptor if the format rejects embedded writes.
    async fn write_date(&self, path: &Path, datetime: PrimitiveDateTime) -> Result<WriteOutcome>;

    /// Process-wide teardown. Adapters that keep a long-lived helper process
    /// release it here; one-shot adapters have nothing to do.
    async fn end(&self) -> Result<()>;
}
