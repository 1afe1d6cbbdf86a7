//! EXIF datetime string handling.
//!
//! EXIF stores datetimes as `YYYY:MM:DD HH:MM:SS`, optionally followed by
//! sub-seconds and a zone offset depending on which tool produced the tag.
//! Parsing keeps only the leading fixed-width portion; the archive
//! partitions by local capture time and never needs the offset.

use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const EXIF_DATETIME: &[BorrowedFormatItem<'_>] =
    format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

/// Parse an EXIF-style datetime, tolerating trailing sub-seconds or zone
/// suffixes. Returns `None` for absent, malformed, or zeroed-out values
/// (`0000:00:00 00:00:00` is a common way of saying "no date").
///
/// # Examples
///
/// ```
/// use picvault_metadata::parse_exif_datetime;
///
/// let parsed = parse_exif_datetime("2021:05:12 14:05:30.123+02:00").unwrap();
/// assert_eq!(parsed.year(), 2021);
/// assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
/// ```
pub fn parse_exif_datetime(raw: &str) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    let head = raw.get(..19)?;
    PrimitiveDateTime::parse(head, EXIF_DATETIME).ok()
}

/// Render a datetime in the canonical EXIF form.
pub fn format_exif_datetime(datetime: PrimitiveDateTime) -> String {
    format!(
        "{:04}:{:02}:{:02} {:02}:{:02}:{:02}",
        datetime.year(),
        u8::from(datetime.month()),
        datetime.day(),
        datetime.hour(),
        datetime.minute(),
        datetime.second()
    )
}
