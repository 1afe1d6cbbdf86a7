//! In-memory metadata tool for testing.

use crate::error::{ErrorKind, Result};
use crate::{DateCandidate, MetadataTool, WriteOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;
use tokio::sync::RwLock;

/// In-memory metadata tool for testing.
///
/// Date candidates are keyed by *filename* rather than full path, since the
/// temp paths a scripted surface produces aren't known at test-setup time.
/// Writes are recorded for later assertion instead of touching any file.
pub struct MockTool {
    dates: HashMap<PathBuf, DateCandidate>,
    writes: RwLock<Vec<(PathBuf, PrimitiveDateTime)>>,
    reject_embedded_writes: bool,
    fail_reads: bool,
}

impl MockTool {
    /// A tool that reports no embedded dates at all.
    pub fn empty() -> Self {
        Self {
            dates: HashMap::new(),
            writes: RwLock::new(Vec::new()),
            reject_embedded_writes: false,
            fail_reads: false,
        }
    }

    /// Pre-populate date candidates, keyed by filename.
    pub fn with_dates(dates: impl IntoIterator<Item = (impl Into<PathBuf>, DateCandidate)>) -> Self {
        Self {
            dates: dates.into_iter().map(|(path, candidate)| (path.into(), candidate)).collect(),
            writes: RwLock::new(Vec::new()),
            reject_embedded_writes: false,
            fail_reads: false,
        }
    }

    /// Make every embedded write land in a sidecar instead.
    pub fn rejecting_embedded_writes(mut self) -> Self {
        self.reject_embedded_writes = true;
        self
    }

    /// Make every read fail, simulating a tool timeout.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// All `(path, datetime)` pairs written so far.
    pub async fn recorded_writes(&self) -> Vec<(PathBuf, PrimitiveDateTime)> {
        self.writes.read().await.clone()
    }

    fn key(path: &Path) -> PathBuf {
        path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf())
    }
}

#[async_trait]
impl MetadataTool for MockTool {
    async fn read_date(&self, path: &Path) -> Result<Option<DateCandidate>> {
        if self.fail_reads {
            exn::bail!(ErrorKind::Timeout);
        }
        Ok(self.dates.get(&Self::key(path)).copied())
    }

    async fn write_date(&self, path: &Path, datetime: PrimitiveDateTime) -> Result<WriteOutcome> {
        self.writes.write().await.push((path.to_path_buf(), datetime));
        if self.reject_embedded_writes {
            let mut sidecar = path.as_os_str().to_os_string();
            sidecar.push(".xmp");
            return Ok(WriteOutcome::Sidecar(PathBuf::from(sidecar)));
        }
        Ok(WriteOutcome::Embedded)
    }

    async fn end(&self) -> Result<()> {
        Ok(())
    }
}
