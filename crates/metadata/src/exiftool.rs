//! One-shot `exiftool` subprocess adapter.
//!
//! Each operation spawns the binary fresh; no long-lived helper process to
//! babysit. Reads ask for JSON output (`-j`) restricted to the two tags the
//! resolver cares about. Writes target the original-capture tag directly
//! and fall back to generating an `.xmp` sidecar when the container refuses
//! embedded writes (some video formats do).

use crate::error::{ErrorKind, Result};
use crate::exif::{format_exif_datetime, parse_exif_datetime};
use crate::{DateCandidate, DateTag, MetadataTool, WriteOutcome};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use time::PrimitiveDateTime;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

/// Adapter invoking the `exiftool` binary per operation.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use picvault_metadata::ExiftoolCli;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tool = ExiftoolCli::locate(Duration::from_secs(10))?;
/// # Ok(())
/// # }
/// ```
pub struct ExiftoolCli {
    binary: PathBuf,
    limit: Duration,
}

impl ExiftoolCli {
    /// Find `exiftool` on the `PATH`.
    pub fn locate(limit: Duration) -> Result<Self> {
        let binary = which::which("exiftool")
            .or_raise(|| ErrorKind::ToolMissing("`exiftool` is not on the PATH".to_string()))?;
        debug!(binary = %binary.display(), "exiftool located");
        Ok(Self { binary, limit })
    }

    /// Use an explicit binary path (useful for bundled installs).
    pub fn with_binary(binary: impl Into<PathBuf>, limit: Duration) -> Self {
        Self { binary: binary.into(), limit }
    }

    /// Run the tool with the given arguments under the configured time
    /// bound. Non-zero exit is *not* an error here; callers that care
    /// inspect the status, because exiftool exits non-zero for conditions
    /// (like unwritable formats) that have a defined fallback.
    async fn run(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<Output> {
        let invocation = Command::new(&self.binary).args(args).output();
        let output = timeout(self.limit, invocation).await.or_raise(|| ErrorKind::Timeout)?.map_err(ErrorKind::Io)?;
        Ok(output)
    }
}

#[async_trait]
impl MetadataTool for ExiftoolCli {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read_date(&self, path: &Path) -> Result<Option<DateCandidate>> {
        let output = self.run(["-j", "-DateTimeOriginal", "-CreateDate", &path.display().to_string()]).await?;
        if !output.status.success() {
            exn::bail!(ErrorKind::ToolFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        // `-j` emits an array with one object per input file.
        let parsed: Value = serde_json::from_slice(&output.stdout)
            .or_raise(|| ErrorKind::ToolFailed("unparseable exiftool JSON output".to_string()))?;
        let tags = parsed
            .get(0)
            .ok_or_raise(|| ErrorKind::ToolFailed("exiftool JSON output was empty".to_string()))?;

        // The original-capture tag is authoritative; the creation tag only
        // exists to cover container formats that never carry the former.
        for (name, tag) in [("DateTimeOriginal", DateTag::Original), ("CreateDate", DateTag::Creation)] {
            if let Some(raw) = tags.get(name).and_then(Value::as_str)
                && let Some(datetime) = parse_exif_datetime(raw)
            {
                trace!(tag = name, %datetime, "embedded date found");
                return Ok(Some(DateCandidate { datetime, tag }));
            }
        }
        Ok(None)
    }

    #[instrument(skip(self), fields(path = %path.display(), %datetime))]
    async fn write_date(&self, path: &Path, datetime: PrimitiveDateTime) -> Result<WriteOutcome> {
        let tag_argument = format!("-DateTimeOriginal={}", format_exif_datetime(datetime));
        let embedded = self
            .run(["-overwrite_original", &tag_argument, &path.display().to_string()])
            .await?;
        if embedded.status.success() {
            return Ok(WriteOutcome::Embedded);
        }
        debug!(
            stderr = %String::from_utf8_lossy(&embedded.stderr).trim(),
            "embedded write rejected, falling back to sidecar"
        );

        let mut sidecar = path.as_os_str().to_os_string();
        sidecar.push(".xmp");
        let sidecar = PathBuf::from(sidecar);
        let fallback = self
            .run([
                OsStr::new(&tag_argument),
                OsStr::new("-o"),
                sidecar.as_os_str(),
                path.as_os_str(),
            ])
            .await?;
        if !fallback.status.success() {
            exn::bail!(ErrorKind::ToolFailed(String::from_utf8_lossy(&fallback.stderr).trim().to_string()));
        }
        Ok(WriteOutcome::Sidecar(sidecar))
    }

    async fn end(&self) -> Result<()> {
        // One process per invocation; nothing held open.
        Ok(())
    }
}
