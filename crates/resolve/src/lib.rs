//! Capture-date resolution for picvault.
//!
//! Produces a [`ResolvedDate`] for each downloaded item through an ordered
//! fallback chain, stopping at the first stage that yields a real date:
//!
//! 1. **Embedded metadata** — the original-capture tag, then the container
//!    creation tag ([`MetadataTool::read_date`]).
//! 2. **Markup scrape** — a locale-gated pattern over the page's
//!    accessibility labels ([`scrape`]).
//! 3. **Back-write** (optional) — a stage-2 date is written back into the
//!    file's metadata so future tooling sees a proper embedded date.
//!
//! Stage 1 is authoritative and format-native; stage 2 exists because the
//! source service strips metadata from some items, and the only recoverable
//! trace is locale-rendered text. Resolution never fails: anything
//! unrecoverable degrades to the [sentinel](ResolvedDate::sentinel) and the
//! item is filed under the epoch bucket rather than dropped.

pub mod error;
pub mod locale;
pub mod scrape;

pub use crate::locale::LocaleSpec;

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use picvault_metadata::{DateTag, MetadataTool, WriteOutcome};
use picvault_surface::{GallerySurface, Locator};
use std::path::Path;
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::{debug, instrument, warn};

/// Which stage of the fallback chain produced a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// Embedded original-capture tag.
    Original,
    /// Embedded container-creation tag (QuickTime-style formats).
    Creation,
    /// Recovered from the page's accessibility label.
    Scraped,
    /// Nothing recoverable; epoch bucket.
    Sentinel,
}

/// An item's canonical capture timestamp, with provenance.
///
/// Derived, never directly observed. The sentinel value (epoch year 1970,
/// month 1) doubles as the "no real date found" marker and is itself what
/// triggers the next fallback stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub datetime: PrimitiveDateTime,
    pub source: DateSource,
}

impl ResolvedDate {
    /// The "no real date found" value: epoch year 1970, month 1.
    pub fn sentinel() -> Self {
        // Infallible: the epoch is a valid calendar date.
        let date = Date::from_calendar_date(1970, Month::January, 1).unwrap();
        Self { datetime: PrimitiveDateTime::new(date, Time::MIDNIGHT), source: DateSource::Sentinel }
    }

    pub fn scraped(datetime: PrimitiveDateTime) -> Self {
        Self { datetime, source: DateSource::Scraped }
    }

    /// True when this is the epoch-bucket marker.
    pub fn is_sentinel(&self) -> bool {
        self.datetime.year() == 1970 && self.datetime.month() == Month::January
    }

    /// Partition year, unpadded.
    pub fn year(&self) -> i32 {
        self.datetime.year()
    }

    /// Partition month, 1–12 unpadded.
    pub fn month(&self) -> u8 {
        u8::from(self.datetime.month())
    }

    /// `YYYYMMDD_HHMMSS` prefix for archived filenames, so files sort by
    /// capture time regardless of what the gallery called them.
    pub fn filename_prefix(&self) -> String {
        format!(
            "{:04}{:02}{:02}_{:02}{:02}{:02}",
            self.datetime.year(),
            u8::from(self.datetime.month()),
            self.datetime.day(),
            self.datetime.hour(),
            self.datetime.minute(),
            self.datetime.second()
        )
    }
}

impl From<picvault_metadata::DateCandidate> for ResolvedDate {
    fn from(candidate: picvault_metadata::DateCandidate) -> Self {
        let source = match candidate.tag {
            DateTag::Original => DateSource::Original,
            DateTag::Creation => DateSource::Creation,
        };
        Self { datetime: candidate.datetime, source }
    }
}

/// Runs the fallback chain for one item at a time.
pub struct DateResolver {
    locale: &'static LocaleSpec,
    write_back: bool,
}

impl DateResolver {
    /// Build a resolver for the given display locale. `write_back` enables
    /// stage 3 (persisting scraped dates into the file's metadata).
    ///
    /// # Errors
    /// [`ErrorKind::UnknownLocale`] when no label grammar is registered for
    /// `locale_id`.
    pub fn new(locale_id: &str, write_back: bool) -> Result<Self> {
        let locale = locale::lookup(locale_id).ok_or_raise(|| {
            ErrorKind::UnknownLocale(locale_id.to_string(), locale::supported().collect::<Vec<_>>().join(", "))
        })?;
        Ok(Self { locale, write_back })
    }

    /// The locale this resolver scrapes under.
    pub fn locale_id(&self) -> &'static str {
        self.locale.id()
    }

    /// Resolve the capture date for the item at `locator`, whose downloaded
    /// bytes sit at `file`.
    ///
    /// Infallible by design: every failure inside the chain is absorbed
    /// with a diagnostic and resolution continues to the next stage, ending
    /// at the sentinel. The run must never abort because a date couldn't be
    /// recovered.
    #[instrument(skip_all, fields(locator = %locator))]
    pub async fn resolve(
        &self,
        tool: &dyn MetadataTool,
        surface: &dyn GallerySurface,
        locator: &Locator,
        file: &Path,
    ) -> ResolvedDate {
        match tool.read_date(file).await {
            Ok(Some(candidate)) => {
                let resolved = ResolvedDate::from(candidate);
                if !resolved.is_sentinel() {
                    return resolved;
                }
                // A tag sitting in the epoch bucket (reset device clocks
                // write these) carries no more information than no tag at
                // all; the next stage may still recover the real date.
                debug!("embedded tag holds the epoch marker, trying page markup");
            },
            Ok(None) => debug!("no embedded date tag, trying page markup"),
            Err(error) => warn!(%error, "metadata read failed, trying page markup"),
        }

        let markup = match surface.fetch_raw_markup(locator).await {
            Ok(markup) => markup,
            Err(error) => {
                warn!(%error, "could not fetch page markup, filing under epoch bucket");
                return ResolvedDate::sentinel();
            },
        };
        let Some(datetime) = scrape::scrape_label_date(&markup, self.locale) else {
            warn!(locale = self.locale.id(), "no parseable date label in markup — is the locale set correctly?");
            return ResolvedDate::sentinel();
        };
        debug!(%datetime, "date recovered from accessibility label");

        if self.write_back {
            match tool.write_date(file, datetime).await {
                Ok(WriteOutcome::Embedded) => debug!("scraped date written to embedded metadata"),
                Ok(WriteOutcome::Sidecar(sidecar)) => {
                    debug!(sidecar = %sidecar.display(), "format rejects embedded writes, scraped date in sidecar");
                },
                // Non-fatal: the archive still gets the right partition,
                // only future tooling misses out.
                Err(error) => warn!(%error, "failed to persist scraped date"),
            }
        }

        ResolvedDate::scraped(datetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picvault_metadata::{DateCandidate, MockTool};
    use picvault_surface::mock::{MockItem, MockSurface};
    use std::path::PathBuf;
    use time::macros::datetime;

    const ITEM: &str = "https://gallery.test/photo/abc";
    const FRENCH_LABEL_MARKUP: &str = r#"<div aria-label="Photo – 12 mai 2021, 14:05:30"></div>"#;

    fn surface_with_markup(markup: &str) -> MockSurface {
        MockSurface::with_items([MockItem::new(ITEM, "abc.jpg").with_markup(markup)])
    }

    fn original_candidate() -> DateCandidate {
        DateCandidate { datetime: datetime!(2018-03-04 05:06:07), tag: DateTag::Original }
    }

    #[tokio::test]
    async fn embedded_tag_wins_over_parseable_label() {
        let tool = MockTool::with_dates([("abc.jpg", original_candidate())]);
        let surface = surface_with_markup(FRENCH_LABEL_MARKUP);
        let resolver = DateResolver::new("fr-FR", false).unwrap();

        let resolved = resolver.resolve(&tool, &surface, &Locator::new(ITEM), &PathBuf::from("abc.jpg")).await;
        assert_eq!(resolved.source, DateSource::Original);
        assert_eq!((resolved.year(), resolved.month()), (2018, 3));
    }

    #[tokio::test]
    async fn scrape_recovers_when_no_tags() {
        let tool = MockTool::empty();
        let surface = surface_with_markup(FRENCH_LABEL_MARKUP);
        let resolver = DateResolver::new("fr-FR", false).unwrap();

        let resolved = resolver.resolve(&tool, &surface, &Locator::new(ITEM), &PathBuf::from("abc.jpg")).await;
        assert_eq!(resolved.source, DateSource::Scraped);
        assert_eq!((resolved.year(), resolved.month()), (2021, 5));
    }

    #[tokio::test]
    async fn epoch_valued_tag_falls_through_to_scrape() {
        let tool = MockTool::with_dates([(
            "abc.jpg",
            DateCandidate { datetime: datetime!(1970-01-15 00:00:00), tag: DateTag::Original },
        )]);
        let surface = surface_with_markup(FRENCH_LABEL_MARKUP);
        let resolver = DateResolver::new("fr-FR", false).unwrap();

        let resolved = resolver.resolve(&tool, &surface, &Locator::new(ITEM), &PathBuf::from("abc.jpg")).await;
        assert_eq!(resolved.source, DateSource::Scraped);
        assert_eq!((resolved.year(), resolved.month()), (2021, 5));
    }

    #[tokio::test]
    async fn sentinel_when_nothing_recoverable() {
        let tool = MockTool::empty();
        let surface = surface_with_markup("<html><body>nothing here</body></html>");
        let resolver = DateResolver::new("en-US", false).unwrap();

        let resolved = resolver.resolve(&tool, &surface, &Locator::new(ITEM), &PathBuf::from("abc.jpg")).await;
        assert!(resolved.is_sentinel());
        assert_eq!((resolved.year(), resolved.month()), (1970, 1));
    }

    #[tokio::test]
    async fn metadata_failure_degrades_to_scrape() {
        let tool = MockTool::empty().failing_reads();
        let surface = surface_with_markup(FRENCH_LABEL_MARKUP);
        let resolver = DateResolver::new("fr-FR", false).unwrap();

        let resolved = resolver.resolve(&tool, &surface, &Locator::new(ITEM), &PathBuf::from("abc.jpg")).await;
        assert_eq!(resolved.source, DateSource::Scraped);
    }

    #[tokio::test]
    async fn write_back_records_scraped_date() {
        let tool = MockTool::empty();
        let surface = surface_with_markup(FRENCH_LABEL_MARKUP);
        let resolver = DateResolver::new("fr-FR", true).unwrap();

        let file = PathBuf::from("abc.jpg");
        resolver.resolve(&tool, &surface, &Locator::new(ITEM), &file).await;
        let writes = tool.recorded_writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, file);
        assert_eq!(writes[0].1, datetime!(2021-05-12 14:05:30));
    }

    #[tokio::test]
    async fn write_back_failure_still_resolves() {
        let tool = MockTool::empty().rejecting_embedded_writes();
        let surface = surface_with_markup(FRENCH_LABEL_MARKUP);
        let resolver = DateResolver::new("fr-FR", true).unwrap();

        let resolved = resolver.resolve(&tool, &surface, &Locator::new(ITEM), &PathBuf::from("abc.jpg")).await;
        assert_eq!(resolved.source, DateSource::Scraped);
    }

    #[test]
    fn unknown_locale_is_rejected() {
        assert!(DateResolver::new("xx-XX", false).is_err());
    }

    #[test]
    fn filename_prefix_is_sortable() {
        let resolved = ResolvedDate::scraped(datetime!(2021-05-12 14:05:30));
        assert_eq!(resolved.filename_prefix(), "20210512_140530");
    }
}
