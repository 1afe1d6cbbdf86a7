//! Locale registry for accessibility-label date grammars.
//!
//! The recoverable text in the gallery's markup is locale-*rendered*, not
//! locale-neutral data: both the label prefix ("Photo"/"Vidéo") and the
//! date vocabulary change with the configured display locale. Each
//! [`LocaleSpec`] bundles the label pattern with a parser for that locale's
//! rendered dates, and the registry is keyed by locale identifier so new
//! locales are additive — registering one entry is the entire job.

use regex::Regex;
use std::sync::LazyLock;
use time::{Date, Month, PrimitiveDateTime, Time};

/// Label grammar and date parser for one display locale.
pub struct LocaleSpec {
    id: &'static str,
    /// Matches an item label and captures the trailing date text. Labels
    /// look like `Photo – 12 mai 2021, 14:05:30`, possibly with extra
    /// dash-separated segments before the date.
    label: Regex,
    parse: fn(&str) -> Option<PrimitiveDateTime>,
}

impl LocaleSpec {
    /// The locale identifier this grammar serves.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Pull the date text out of an accessibility label, if the label is an
    /// item label at all.
    pub fn extract_label<'a>(&self, label: &'a str) -> Option<&'a str> {
        self.label.captures(label).and_then(|captures| captures.get(1)).map(|matched| matched.as_str().trim())
    }

    /// Parse this locale's rendered date text.
    pub fn parse_date(&self, text: &str) -> Option<PrimitiveDateTime> {
        (self.parse)(&normalize_spaces(text))
    }
}

static REGISTRY: LazyLock<Vec<LocaleSpec>> = LazyLock::new(|| {
    vec![
        LocaleSpec {
            id: "en-US",
            // The date is the last dash-separated segment of the label.
            label: Regex::new(r"^(?:Photo|Video)\s+[–-]\s+(?:.+\s+[–-]\s+)?([^–-]+)$").unwrap(),
            parse: parse_english,
        },
        LocaleSpec {
            id: "fr-FR",
            label: Regex::new(r"^(?:Animation|Photo|Vidéo)\s+[–-]\s+(?:.+\s+[–-]\s+)?([^–-]+)$").unwrap(),
            parse: parse_french,
        },
    ]
});

/// Look up the grammar for a locale identifier.
pub fn lookup(id: &str) -> Option<&'static LocaleSpec> {
    REGISTRY.iter().find(|spec| spec.id.eq_ignore_ascii_case(id))
}

/// Identifiers with a registered grammar.
pub fn supported() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|spec| spec.id)
}

/// The gallery renders narrow/no-break spaces into its labels; fold every
/// space-like character down to ASCII so the grammars stay readable.
fn normalize_spaces(text: &str) -> String {
    text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }).collect::<String>().trim().to_string()
}

/// `Jun 12, 2021, 2:05:30 PM` (also full month names, with or without the
/// 12-hour marker).
fn parse_english(text: &str) -> Option<PrimitiveDateTime> {
    static ENGLISH_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([A-Za-z]+)\s+(\d{1,2}),\s+(\d{4}),\s+(\d{1,2}):(\d{2}):(\d{2})(?:\s*([AP]M))?$").unwrap()
    });
    let captures = ENGLISH_DATE_REGEX.captures(text)?;
    let month = english_month(captures.get(1)?.as_str())?;
    let day: u8 = captures.get(2)?.as_str().parse().ok()?;
    let year: i32 = captures.get(3)?.as_str().parse().ok()?;
    let mut hour: u8 = captures.get(4)?.as_str().parse().ok()?;
    let minute: u8 = captures.get(5)?.as_str().parse().ok()?;
    let second: u8 = captures.get(6)?.as_str().parse().ok()?;
    match captures.get(7).map(|marker| marker.as_str()) {
        Some("PM") if hour < 12 => hour += 12,
        Some("AM") if hour == 12 => hour = 0,
        _ => {},
    }
    build(year, month, day, hour, minute, second)
}

fn english_month(name: &str) -> Option<Month> {
    const PREFIXES: [(&str, Month); 12] = [
        ("jan", Month::January),
        ("feb", Month::February),
        ("mar", Month::March),
        ("apr", Month::April),
        ("may", Month::May),
        ("jun", Month::June),
        ("jul", Month::July),
        ("aug", Month::August),
        ("sep", Month::September),
        ("oct", Month::October),
        ("nov", Month::November),
        ("dec", Month::December),
    ];
    let name = name.to_ascii_lowercase();
    PREFIXES.iter().find(|(prefix, _)| name.starts_with(prefix)).map(|(_, month)| *month)
}

/// `12 mai 2021, 14:05:30`. French abbreviated month names aren't parseable
/// by any generic date grammar, hence the explicit name table.
fn parse_french(text: &str) -> Option<PrimitiveDateTime> {
    const MONTHS: [(&str, Month); 13] = [
        ("janv.", Month::January),
        ("févr.", Month::February),
        ("mars", Month::March),
        ("avr.", Month::April),
        ("avril", Month::April),
        ("mai", Month::May),
        ("juin", Month::June),
        ("juil.", Month::July),
        ("août", Month::August),
        ("sept.", Month::September),
        ("oct.", Month::October),
        ("nov.", Month::November),
        ("déc.", Month::December),
    ];

    // Day, month name, year, hour, minute, second — exactly six pieces.
    let pieces: Vec<&str> = text.split([' ', ',', ':']).filter(|piece| !piece.is_empty()).collect();
    let [day, month_name, year, hour, minute, second] = pieces.as_slice() else {
        return None;
    };
    let month_name = month_name.to_lowercase();
    let month = MONTHS.iter().find(|(name, _)| *name == month_name).map(|(_, month)| *month)?;
    build(
        year.parse().ok()?,
        month,
        day.parse().ok()?,
        hour.parse().ok()?,
        minute.parse().ok()?,
        second.parse().ok()?,
    )
}

fn build(year: i32, month: Month, day: u8, hour: u8, minute: u8, second: u8) -> Option<PrimitiveDateTime> {
    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn registry_knows_both_required_locales() {
        assert!(lookup("en-US").is_some());
        assert!(lookup("fr-FR").is_some());
        assert!(lookup("de-DE").is_none());
        assert!(supported().count() >= 2);
    }

    #[rstest]
    #[case("Photo – 12 mai 2021, 14:05:30", Some("12 mai 2021, 14:05:30"))]
    #[case("Vidéo – 1 janv. 2019, 00:00:01", Some("1 janv. 2019, 00:00:01"))]
    #[case("Animation – 3 août 2020, 10:11:12", Some("3 août 2020, 10:11:12"))]
    #[case("Photo – Portrait – 12 mai 2021, 14:05:30", Some("12 mai 2021, 14:05:30"))]
    #[case("Ouvrir le menu", None)]
    fn french_label_extraction(#[case] label: &str, #[case] expected: Option<&str>) {
        let spec = lookup("fr-FR").unwrap();
        assert_eq!(spec.extract_label(label), expected);
    }

    #[rstest]
    #[case("Photo - Jun 12, 2021, 2:05:30 PM", Some("Jun 12, 2021, 2:05:30 PM"))]
    #[case("Video – Landscape – Dec 1, 2019, 11:59:59 AM", Some("Dec 1, 2019, 11:59:59 AM"))]
    #[case("Back to photo grid", None)]
    fn english_label_extraction(#[case] label: &str, #[case] expected: Option<&str>) {
        let spec = lookup("en-US").unwrap();
        assert_eq!(spec.extract_label(label), expected);
    }

    #[test]
    fn french_date_parses() {
        let spec = lookup("fr-FR").unwrap();
        let parsed = spec.parse_date("12 mai 2021, 14:05:30").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2021, Month::May, 12));
        assert_eq!((parsed.hour(), parsed.minute(), parsed.second()), (14, 5, 30));
    }

    #[rstest]
    #[case("1 janv. 2019, 00:00:01", Month::January)]
    #[case("28 févr. 2018, 08:30:00", Month::February)]
    #[case("15 avril 2022, 12:00:00", Month::April)]
    #[case("15 avr. 2022, 12:00:00", Month::April)]
    #[case("9 déc. 2023, 23:59:59", Month::December)]
    fn french_month_table(#[case] text: &str, #[case] expected: Month) {
        let spec = lookup("fr-FR").unwrap();
        assert_eq!(spec.parse_date(text).unwrap().month(), expected);
    }

    #[rstest]
    #[case("Jun 12, 2021, 2:05:30 PM", 14)]
    #[case("June 12, 2021, 2:05:30 AM", 2)]
    #[case("Jun 12, 2021, 12:05:30 AM", 0)]
    #[case("Jun 12, 2021, 12:05:30 PM", 12)]
    #[case("Jun 12, 2021, 14:05:30", 14)]
    fn english_hour_conversion(#[case] text: &str, #[case] expected_hour: u8) {
        let spec = lookup("en-US").unwrap();
        assert_eq!(spec.parse_date(text).unwrap().hour(), expected_hour);
    }

    #[test]
    fn narrow_spaces_are_normalized() {
        // The gallery renders U+202F before the 12-hour marker.
        let spec = lookup("en-US").unwrap();
        assert!(spec.parse_date("Jun 12, 2021, 2:05:30\u{202f}PM").is_some());
    }

    #[rstest]
    #[case("32 mai 2021, 14:05:30")]
    #[case("12 brumaire 2021, 14:05:30")]
    #[case("12 mai 2021")]
    #[case("")]
    fn french_rejects_garbage(#[case] text: &str) {
        let spec = lookup("fr-FR").unwrap();
        assert!(spec.parse_date(text).is_none());
    }
}
