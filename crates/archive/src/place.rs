//! File placement: from downloaded temp file to its place in the archive.
//!
//! The destination is a pure function of the resolved date, the configured
//! layout, and the suggested filename. The move itself carries an explicit
//! overwrite flag; when the destination is occupied and overwriting is off,
//! the move is retried exactly once under a disambiguated name rather than
//! dropped — silently skipping a successfully-downloaded item would break
//! the checkpoint's invariant.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use picvault_resolve::ResolvedDate;
use picvault_surface::Download;
use std::io::ErrorKind as IoErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

/// How the archive partitions files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `root/<year>/<month>/<file>`, year and month as unpadded integers.
    Nested,
    /// Everything directly under the root.
    Flat,
}

/// The result of a successful placement.
#[derive(Debug)]
pub struct Placement {
    /// Where the file actually landed (disambiguated name included).
    pub destination: PathBuf,
    /// Whether the collision retry renamed it.
    pub disambiguated: bool,
    /// Where the sidecar landed, when one existed and its move succeeded.
    pub sidecar: Option<PathBuf>,
}

/// Turns (resolved date, suggested filename, downloaded bytes) into a file
/// at rest under the archive root.
pub struct FilePlacer {
    root: PathBuf,
    layout: Layout,
}

impl FilePlacer {
    pub fn new(root: impl Into<PathBuf>, layout: Layout) -> Self {
        Self { root: root.into(), layout }
    }

    /// Compute the destination path for an item. The filename gets a
    /// sortable capture-timestamp prefix.
    pub fn destination(&self, resolved: &ResolvedDate, suggested_filename: &str) -> PathBuf {
        let filename = format!("{}_{}", resolved.filename_prefix(), suggested_filename);
        match self.layout {
            Layout::Flat => self.root.join(filename),
            Layout::Nested => {
                self.root.join(resolved.year().to_string()).join(resolved.month().to_string()).join(filename)
            },
        }
    }

    /// Move a downloaded file (and its sidecar, if stage 3 produced one)
    /// into the archive.
    ///
    /// # Errors
    /// [`ErrorKind::Placement`] when the move fails for any reason other
    /// than a collision, or when the single disambiguation retry fails too.
    #[instrument(skip_all, fields(from = %download.temp_path.display(), overwrite))]
    pub async fn place(&self, download: &Download, resolved: &ResolvedDate, overwrite: bool) -> Result<Placement> {
        let intended = self.destination(resolved, &download.suggested_filename);
        let (destination, disambiguated) = match move_file(&download.temp_path, &intended, overwrite).await {
            Ok(()) => (intended, false),
            Err(error) if matches!(error.deref(), ErrorKind::AlreadyExists(_)) => {
                let alternate = disambiguate(&intended);
                debug!(
                    occupied = %intended.display(),
                    alternate = %alternate.display(),
                    "destination occupied, retrying under a disambiguated name"
                );
                move_file(&download.temp_path, &alternate, false).await.or_raise(|| ErrorKind::Placement)?;
                (alternate, true)
            },
            Err(error) => return Err(error).or_raise(|| ErrorKind::Placement),
        };

        // Best-effort: a sidecar descriptor shares the primary file's fate
        // when it can, and is merely logged when it can't.
        let sidecar_source = sidecar_path(&download.temp_path);
        let sidecar = if tokio::fs::try_exists(&sidecar_source).await.unwrap_or(false) {
            let sidecar_destination = sidecar_path(&destination);
            match move_file(&sidecar_source, &sidecar_destination, overwrite).await {
                Ok(()) => Some(sidecar_destination),
                Err(error) => {
                    trace!(%error, "sidecar move failed, leaving it behind");
                    None
                },
            }
        } else {
            None
        };

        Ok(Placement { destination, disambiguated, sidecar })
    }
}

/// `<path>.xmp`, appended to the full filename (extension included).
fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".xmp");
    PathBuf::from(name)
}

/// Insert a random numeric token before the extension:
/// `20210512_140530_a.jpg` → `20210512_140530_a_2846170493.jpg`.
fn disambiguate(path: &Path) -> PathBuf {
    let token: u32 = rand::random();
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let filename = match path.extension() {
        Some(extension) => format!("{stem}_{token}.{}", extension.to_string_lossy()),
        None => format!("{stem}_{token}"),
    };
    path.with_file_name(filename)
}

/// Move with an explicit overwrite flag. Rename first; fall back to
/// copy-and-delete when source and destination sit on different
/// filesystems.
async fn move_file(source: &Path, destination: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && tokio::fs::try_exists(destination).await.map_err(ErrorKind::Io)? {
        exn::bail!(ErrorKind::AlreadyExists(destination.to_path_buf()));
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
    }
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == IoErrorKind::CrossesDevices => {
            tokio::fs::copy(source, destination).await.map_err(ErrorKind::Io)?;
            tokio::fs::remove_file(source).await.map_err(ErrorKind::Io)?;
            Ok(())
        },
        Err(error) => Err(ErrorKind::Io(error).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picvault_resolve::{DateSource, ResolvedDate};
    use rstest::rstest;
    use time::macros::datetime;

    fn resolved() -> ResolvedDate {
        ResolvedDate { datetime: datetime!(2021-05-12 14:05:30), source: DateSource::Original }
    }

    async fn download_with_bytes(dir: &Path, bytes: &[u8]) -> Download {
        let temp_path = dir.join(format!("temp-{}", rand::random::<u32>()));
        tokio::fs::write(&temp_path, bytes).await.unwrap();
        Download { temp_path, suggested_filename: "IMG_0001.jpg".to_string() }
    }

    #[rstest]
    #[case(Layout::Nested, "2021/5/20210512_140530_IMG_0001.jpg")]
    #[case(Layout::Flat, "20210512_140530_IMG_0001.jpg")]
    fn destination_follows_layout(#[case] layout: Layout, #[case] expected: &str) {
        let placer = FilePlacer::new("/archive", layout);
        assert_eq!(placer.destination(&resolved(), "IMG_0001.jpg"), Path::new("/archive").join(expected));
    }

    #[test]
    fn sentinel_dates_file_under_epoch_bucket() {
        let placer = FilePlacer::new("/archive", Layout::Nested);
        let destination = placer.destination(&ResolvedDate::sentinel(), "IMG_0001.jpg");
        assert_eq!(destination, Path::new("/archive/1970/1/19700101_000000_IMG_0001.jpg"));
    }

    #[tokio::test]
    async fn places_a_file() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let placer = FilePlacer::new(archive.path(), Layout::Nested);

        let download = download_with_bytes(scratch.path(), b"first").await;
        let placement = placer.place(&download, &resolved(), false).await.unwrap();
        assert!(!placement.disambiguated);
        assert_eq!(tokio::fs::read(&placement.destination).await.unwrap(), b"first");
        assert!(!download.temp_path.exists());
    }

    #[tokio::test]
    async fn collision_keeps_both_files() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let placer = FilePlacer::new(archive.path(), Layout::Nested);

        let first = download_with_bytes(scratch.path(), b"first").await;
        let second = download_with_bytes(scratch.path(), b"second").await;
        let original = placer.place(&first, &resolved(), false).await.unwrap();
        let retried = placer.place(&second, &resolved(), false).await.unwrap();

        assert!(retried.disambiguated);
        assert_ne!(original.destination, retried.destination);
        // Neither overwrote the other.
        assert_eq!(tokio::fs::read(&original.destination).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&retried.destination).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_file() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let placer = FilePlacer::new(archive.path(), Layout::Nested);

        let first = download_with_bytes(scratch.path(), b"first").await;
        let second = download_with_bytes(scratch.path(), b"second").await;
        let original = placer.place(&first, &resolved(), false).await.unwrap();
        let replaced = placer.place(&second, &resolved(), true).await.unwrap();

        assert!(!replaced.disambiguated);
        assert_eq!(original.destination, replaced.destination);
        assert_eq!(tokio::fs::read(&replaced.destination).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn sidecar_travels_with_the_file() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let placer = FilePlacer::new(archive.path(), Layout::Nested);

        let download = download_with_bytes(scratch.path(), b"media").await;
        tokio::fs::write(sidecar_path(&download.temp_path), b"<xmp/>").await.unwrap();

        let placement = placer.place(&download, &resolved(), false).await.unwrap();
        let sidecar = placement.sidecar.unwrap();
        assert_eq!(sidecar, sidecar_path(&placement.destination));
        assert_eq!(tokio::fs::read(&sidecar).await.unwrap(), b"<xmp/>");
    }

    #[test]
    fn disambiguation_preserves_extension() {
        let alternate = disambiguate(Path::new("/archive/2021/5/a.jpg"));
        let name = alternate.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("a_"));
        assert!(name.ends_with(".jpg"));
        assert_ne!(alternate, Path::new("/archive/2021/5/a.jpg"));
    }
}
