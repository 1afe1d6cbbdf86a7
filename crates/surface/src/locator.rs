//! Item locators and canonicalization.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Gallery URLs may carry a multi-account path segment (`/u/<n>/`) that
/// varies with which account slot the session happens to be signed into.
/// Two locators differing only in that segment denote the same item.
static ACCOUNT_SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/u/\d+/").unwrap());

/// Canonical identifier for one library item.
///
/// Wraps the URL as the gallery reported it, but *all* equality and hashing
/// goes through [`canonical`](Self::canonical) form, so a locator recorded
/// under one account slot still matches the same item seen under another.
/// This is load-bearing for both the traversal's termination check and the
/// checkpoint comparison, which is why it lives in `Eq`/`Hash` rather than
/// being a convention callers have to remember.
///
/// # Examples
///
/// ```
/// use picvault_surface::Locator;
///
/// let a = Locator::new("https://photos.google.com/u/2/photo/AF1Qip");
/// let b = Locator::new("https://photos.google.com/photo/AF1Qip");
/// assert_eq!(a, b);
/// assert_eq!(a.canonical(), "https://photos.google.com/photo/AF1Qip");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wrap a raw locator string as reported by the gallery.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The locator exactly as the gallery reported it.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locator with any multi-account path segment stripped.
    pub fn canonical(&self) -> String {
        ACCOUNT_SEGMENT_REGEX.replace(&self.0, "/").into_owned()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for Locator {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}
impl Eq for Locator {}

impl std::hash::Hash for Locator {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://photos.google.com/u/0/photo/abc", "https://photos.google.com/photo/abc")]
    #[case("https://photos.google.com/u/12/photo/abc", "https://photos.google.com/photo/abc")]
    #[case("https://photos.google.com/photo/abc", "https://photos.google.com/photo/abc")]
    fn canonical_strips_account_segment(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Locator::new(raw).canonical(), expected);
    }

    #[test]
    fn equality_is_canonical() {
        let a = Locator::new("https://photos.google.com/u/0/photo/abc");
        let b = Locator::new("https://photos.google.com/photo/abc");
        let c = Locator::new("https://photos.google.com/photo/def");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn account_like_item_segments_survive() {
        // Only the exact `/u/<digits>/` shape is a multi-account segment.
        let a = Locator::new("https://photos.google.com/photo/u2b");
        assert_eq!(a.canonical(), "https://photos.google.com/photo/u2b");
    }

    #[test]
    fn display_preserves_raw_form() {
        let raw = "https://photos.google.com/u/1/photo/abc";
        assert_eq!(Locator::new(raw).to_string(), raw);
    }
}
