//! Bedroom count classifier.

use std::sync::LazyLock;

use regex::Regex;

/// Matches a digit run followed by the word "bedroom" ("2 bedrooms").
static BEDROOM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+bedroom").expect("Invalid regex"));

/// Derive a bedroom count from ordered room descriptions.
///
/// Descriptions are scanned in order. The first one containing `"<n> bedroom"`
/// yields `n`; a description containing `"studio"` seen before that yields 0.
/// Anything else falls through to 0. Ranges like `"2-3 bedrooms"` match on
/// their upper bound; spelled-out numbers do not match at all.
#[must_use]
pub fn bedroom_count<S: AsRef<str>>(rooms: &[S]) -> u32 {
    for room in rooms {
        let room = room.as_ref();
        if let Some(caps) = BEDROOM_RE.captures(room) {
            // Digit runs that overflow saturate rather than fall back to 0.
            return caps
                .get(1)
                .map_or(0, |m| m.as_str().parse().unwrap_or(u32::MAX));
        }
        if room.contains("studio") {
            return 0;
        }
    }
    0
}
