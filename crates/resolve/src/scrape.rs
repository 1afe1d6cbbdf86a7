//! Date recovery from raw page markup.
//!
//! Best-effort last resort for items the source service stripped of
//! embedded metadata: the rendered page still carries the capture date as
//! human-readable text inside the item's accessibility label.

use crate::locale::LocaleSpec;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use time::PrimitiveDateTime;
use tracing::{instrument, trace};

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

selector!(LABELLED_SELECTOR, "[aria-label]");
// Markup for items not yet materialized in the DOM keeps the label inside
// serialized fragments; a raw attribute scan catches what the DOM pass
// can't see.
regex!(ARIA_LABEL_ATTR_REGEX, r#"aria-label="([^"]+)""#);

/// Scan the markup for an accessibility label matching the locale's item
/// grammar and parse its date text. First parseable label wins; `None`
/// means this markup holds no recoverable date for that locale.
#[instrument(skip_all, fields(locale = locale.id(), markup_size = markup.len()))]
pub fn scrape_label_date(markup: &str, locale: &LocaleSpec) -> Option<PrimitiveDateTime> {
    let document = Html::parse_document(markup);
    let dom_labels = document
        .select(&LABELLED_SELECTOR)
        .filter_map(|element| element.value().attr("aria-label"));
    let raw_labels = ARIA_LABEL_ATTR_REGEX
        .captures_iter(markup)
        .filter_map(|captures| captures.get(1))
        .map(|matched| matched.as_str());

    for label in dom_labels.chain(raw_labels) {
        let Some(text) = locale.extract_label(label) else {
            continue;
        };
        if let Some(datetime) = locale.parse_date(text) {
            trace!(label, "date label matched");
            return Some(datetime);
        }
        trace!(label, "label matched but its date text did not parse");
    }
    None
}
