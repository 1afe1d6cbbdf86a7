//! The run state machine.
//!
//! One run is a single forward walk: establish where to start (checkpoint,
//! or an explicit seed on the very first run), establish the newest item as
//! the upper bound, then download–resolve–place–checkpoint each item until
//! the walk catches up. Every item is confirmed on disk before the
//! checkpoint moves past it, so a run killed at any point resumes from the
//! last item that actually landed.

use crate::error::{ErrorKind, Result};
use crate::place::{FilePlacer, Layout, Placement};
use crate::progress::ProgressStore;
use crate::traverse::TraversalController;
use exn::{OptionExt, ResultExt};
use picvault_metadata::MetadataTool;
use picvault_resolve::DateResolver;
use picvault_surface::error::ErrorKind as SurfaceErrorKind;
use picvault_surface::{GallerySurface, Locator};
use std::ops::Deref;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Everything a run needs to know that isn't a capability.
#[derive(Debug, Clone)]
pub struct Context {
    /// Where archived files and the checkpoint live.
    pub archive_root: PathBuf,
    /// The gallery's landing locator; also the authentication probe.
    pub gallery_root: String,
    /// Seed for the very first run, when no checkpoint exists yet.
    pub start_locator: Option<Locator>,
    pub layout: Layout,
    pub download_timeout: Duration,
    pub navigation_timeout: Duration,
}

/// What a completed run accomplished.
#[derive(Debug)]
pub struct Outcome {
    /// Items archived during this run.
    pub archived: u32,
    /// The newest library item at the time the run started; also where the
    /// checkpoint now points.
    pub latest: Locator,
}

/// Drives one backup run end to end over the supplied capabilities.
pub struct BackupOrchestrator<'run> {
    context: Context,
    surface: &'run dyn GallerySurface,
    tool: &'run dyn MetadataTool,
    resolver: &'run DateResolver,
    placer: FilePlacer,
    progress: ProgressStore,
    traversal: TraversalController,
}

impl<'run> BackupOrchestrator<'run> {
    pub fn new(
        context: Context,
        surface: &'run dyn GallerySurface,
        tool: &'run dyn MetadataTool,
        resolver: &'run DateResolver,
    ) -> Self {
        let placer = FilePlacer::new(&context.archive_root, context.layout);
        let progress = ProgressStore::new(&context.archive_root);
        let traversal = TraversalController::new(context.navigation_timeout);
        Self { context, surface, tool, resolver, placer, progress, traversal }
    }

    /// Run to completion. The browser session and the metadata tool are
    /// released on every exit path, success and failure alike.
    pub async fn run(&self) -> Result<Outcome> {
        let outcome = self.run_inner().await;
        if let Err(error) = self.surface.close().await {
            warn!(%error, "failed to release the gallery session");
        }
        if let Err(error) = self.tool.end().await {
            warn!(%error, "failed to shut down the metadata tool");
        }
        outcome
    }

    #[instrument(skip(self), fields(gallery = %self.context.gallery_root))]
    async fn run_inner(&self) -> Result<Outcome> {
        // A fresh run is seeded from the explicit start locator; the seed is
        // checkpointed *before* the walk so an interruption between here and
        // the first placement still resumes correctly.
        let (start, fresh) = match self.progress.load().await {
            Ok(checkpoint) => (checkpoint, false),
            Err(error) if matches!(error.deref(), ErrorKind::NoCheckpoint) => {
                let seed = self.context.start_locator.clone().ok_or_raise(|| ErrorKind::ResumeUnavailable)?;
                info!(seed = %seed, "no checkpoint, seeding a fresh run");
                self.progress.save(&seed).await?;
                (seed, true)
            },
            Err(error) => return Err(error),
        };

        self.surface.open(&self.context.gallery_root).await.or_raise(|| ErrorKind::Surface)?;
        let landed = self.surface.current_locator().await.or_raise(|| ErrorKind::Surface)?;
        if landed != Locator::new(&self.context.gallery_root) {
            exn::bail!(ErrorKind::AuthenticationRequired(landed.to_string()));
        }

        let latest = self.traversal.latest(self.surface).await?;
        info!(latest = %latest, start = %start, "walk bounds established");

        let mut current = start;
        let mut archived = 0u32;
        // A resumed run whose checkpoint already is the newest item has
        // nothing to do. Otherwise the checkpointed item itself is archived
        // again (at-least-once delivery; a collision disambiguates rather
        // than overwrites), then the walk advances until it catches up.
        if fresh || !TraversalController::caught_up(&current, &latest) {
            self.surface.goto(&current).await.or_raise(|| ErrorKind::Surface)?;
            loop {
                // Only the seeded item of a fresh run may replace an
                // existing file; everything after it disambiguates.
                let overwrite = fresh && archived == 0;
                self.archive_item(&current, overwrite).await?;
                archived += 1;
                self.progress.save(&current).await?;
                if TraversalController::caught_up(&current, &latest) {
                    break;
                }
                current = self.traversal.advance(self.surface, &current).await?;
            }
        }

        info!(archived, "run complete");
        Ok(Outcome { archived, latest })
    }

    /// Download the currently displayed item, resolve its capture date, and
    /// move it into the archive.
    #[instrument(skip(self, overwrite), fields(item = %locator))]
    async fn archive_item(&self, locator: &Locator, overwrite: bool) -> Result<Placement> {
        let download = match self.surface.trigger_download(self.context.download_timeout).await {
            Ok(download) => download,
            Err(error) if matches!(error.deref(), SurfaceErrorKind::Timeout(_)) => {
                exn::bail!(ErrorKind::DownloadTimeout);
            },
            Err(error) => return Err(error).or_raise(|| ErrorKind::Surface),
        };
        let resolved = self.resolver.resolve(self.tool, self.surface, locator, &download.temp_path).await;
        let placement = self.placer.place(&download, &resolved, overwrite).await?;
        info!(
            destination = %placement.destination.display(),
            source = ?resolved.source,
            disambiguated = placement.disambiguated,
            "archived"
        );
        Ok(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CHECKPOINT_FILENAME;
    use picvault_metadata::MockTool;
    use picvault_surface::mock::{MockItem, MockSurface};
    use std::path::Path;

    const ROOT: &str = "https://gallery.test/";

    fn item(slug: &str) -> MockItem {
        MockItem::new(format!("https://gallery.test/photo/{slug}"), format!("{slug}.jpg"))
    }

    fn context(archive_root: &Path, start: Option<&str>) -> Context {
        Context {
            archive_root: archive_root.to_path_buf(),
            gallery_root: ROOT.to_string(),
            start_locator: start.map(Locator::new),
            layout: Layout::Nested,
            download_timeout: Duration::from_secs(1),
            navigation_timeout: Duration::from_secs(1),
        }
    }

    fn resolver() -> DateResolver {
        DateResolver::new("en-US", false).unwrap()
    }

    async fn checkpoint(archive_root: &Path) -> String {
        tokio::fs::read_to_string(archive_root.join(CHECKPOINT_FILENAME)).await.unwrap()
    }

    #[tokio::test]
    async fn fresh_run_archives_the_whole_library() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a"), item("b"), item("c")]);
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        let outcome = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap();

        assert_eq!(outcome.archived, 3);
        assert_eq!(surface.download_count().await, 3);
        // No recoverable dates anywhere, so everything files under the
        // epoch bucket.
        for slug in ["a", "b", "c"] {
            assert!(archive.path().join(format!("1970/1/19700101_000000_{slug}.jpg")).is_file());
        }
        assert_eq!(checkpoint(archive.path()).await, "https://gallery.test/photo/c");
    }

    #[tokio::test]
    async fn caught_up_run_downloads_nothing() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a"), item("b")]);
        let tool = MockTool::empty();
        let resolver = resolver();
        tokio::fs::write(archive.path().join(CHECKPOINT_FILENAME), "https://gallery.test/photo/b").await.unwrap();

        let outcome =
            BackupOrchestrator::new(context(archive.path(), None), &surface, &tool, &resolver).run().await.unwrap();

        assert_eq!(outcome.archived, 0);
        assert_eq!(surface.download_count().await, 0);
        assert_eq!(checkpoint(archive.path()).await, "https://gallery.test/photo/b");
    }

    #[tokio::test]
    async fn resumed_run_never_overwrites_archived_files() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a"), item("b"), item("c")]);
        let tool = MockTool::empty();
        let resolver = resolver();
        // A previous run archived up to "b"; its file is already on disk.
        let existing = archive.path().join("1970/1/19700101_000000_b.jpg");
        tokio::fs::create_dir_all(existing.parent().unwrap()).await.unwrap();
        tokio::fs::write(&existing, b"from the previous run").await.unwrap();
        tokio::fs::write(archive.path().join(CHECKPOINT_FILENAME), "https://gallery.test/photo/b").await.unwrap();

        let outcome =
            BackupOrchestrator::new(context(archive.path(), None), &surface, &tool, &resolver).run().await.unwrap();

        // "b" again (at-least-once) plus "c".
        assert_eq!(outcome.archived, 2);
        assert_eq!(tokio::fs::read(&existing).await.unwrap(), b"from the previous run");
        assert!(archive.path().join("1970/1/19700101_000000_c.jpg").is_file());
        assert_eq!(checkpoint(archive.path()).await, "https://gallery.test/photo/c");
    }

    #[tokio::test]
    async fn fresh_seeded_item_replaces_a_leftover_file() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a")]);
        let tool = MockTool::empty();
        let resolver = resolver();
        let leftover = archive.path().join("1970/1/19700101_000000_a.jpg");
        tokio::fs::create_dir_all(leftover.parent().unwrap()).await.unwrap();
        tokio::fs::write(&leftover, b"stale partial").await.unwrap();

        let context = context(archive.path(), Some("https://gallery.test/photo/a"));
        let outcome = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap();

        assert_eq!(outcome.archived, 1);
        assert_eq!(tokio::fs::read(&leftover).await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn colliding_filenames_keep_every_item() {
        let archive = tempfile::tempdir().unwrap();
        // Two distinct items the gallery names identically; with no
        // recoverable dates they aim at the same destination.
        let surface = MockSurface::with_items([
            MockItem::new("https://gallery.test/photo/first", "IMG.jpg"),
            MockItem::new("https://gallery.test/photo/second", "IMG.jpg"),
        ]);
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/first"));

        let outcome = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap();

        assert_eq!(outcome.archived, 2);
        let mut entries = tokio::fs::read_dir(archive.path().join("1970/1")).await.unwrap();
        let mut archived = 0;
        while entries.next_entry().await.unwrap().is_some() {
            archived += 1;
        }
        assert_eq!(archived, 2);
    }

    #[tokio::test]
    async fn download_timeout_aborts_without_advancing_checkpoint() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a"), item("b").with_failing_download()]);
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        let error = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap_err();

        assert!(matches!(error.deref(), ErrorKind::DownloadTimeout));
        // "a" landed and was checkpointed before "b" timed out.
        assert!(archive.path().join("1970/1/19700101_000000_a.jpg").is_file());
        assert_eq!(checkpoint(archive.path()).await, "https://gallery.test/photo/a");
    }

    #[tokio::test]
    async fn placement_failure_aborts_without_advancing_checkpoint() {
        let archive = tempfile::tempdir().unwrap();
        // "a" carries a scrapeable date and files under its own partition;
        // "b" has no recoverable date and aims at the epoch bucket, which a
        // plain file blocks.
        let surface = MockSurface::with_items([
            item("a").with_markup(r#"<div aria-label="Photo – 12 mai 2021, 14:05:30"></div>"#),
            item("b"),
        ]);
        tokio::fs::write(archive.path().join("1970"), b"in the way").await.unwrap();
        let tool = MockTool::empty();
        let resolver = DateResolver::new("fr-FR", false).unwrap();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        let error = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap_err();

        assert!(matches!(error.deref(), ErrorKind::Placement));
        assert!(archive.path().join("2021/5/20210512_140530_a.jpg").is_file());
        assert_eq!(checkpoint(archive.path()).await, "https://gallery.test/photo/a");
    }

    #[tokio::test]
    async fn redirect_away_from_root_is_authentication_required() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a")])
            .with_redirect("https://accounts.gallery.test/signin");
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        let error = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap_err();
        assert!(matches!(error.deref(), ErrorKind::AuthenticationRequired(_)));
        assert_eq!(surface.download_count().await, 0);
    }

    #[tokio::test]
    async fn account_segment_in_current_locator_still_counts_as_root() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a")])
            .with_redirect("https://gallery.test/u/2/");
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        let outcome = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap();
        assert_eq!(outcome.archived, 1);
    }

    #[tokio::test]
    async fn no_checkpoint_and_no_seed_is_resume_unavailable() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([item("a")]);
        let tool = MockTool::empty();
        let resolver = resolver();

        let error =
            BackupOrchestrator::new(context(archive.path(), None), &surface, &tool, &resolver).run().await.unwrap_err();
        assert!(matches!(error.deref(), ErrorKind::ResumeUnavailable));
        assert!(!archive.path().join(CHECKPOINT_FILENAME).exists());
    }

    #[tokio::test]
    async fn empty_library_is_latest_unknown() {
        let archive = tempfile::tempdir().unwrap();
        let surface = MockSurface::with_items([]);
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        let error = BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap_err();
        assert!(matches!(error.deref(), ErrorKind::LatestUnknown));
    }

    #[tokio::test]
    async fn seed_is_checkpointed_before_the_walk() {
        let archive = tempfile::tempdir().unwrap();
        // Redirect makes the run fail *after* seeding but before any item.
        let surface = MockSurface::with_items([item("a")])
            .with_redirect("https://accounts.gallery.test/signin");
        let tool = MockTool::empty();
        let resolver = resolver();
        let context = context(archive.path(), Some("https://gallery.test/photo/a"));

        BackupOrchestrator::new(context, &surface, &tool, &resolver).run().await.unwrap_err();
        assert_eq!(checkpoint(archive.path()).await, "https://gallery.test/photo/a");
    }
}
