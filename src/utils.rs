//! Utility functions for identifiers, URL comparison and time

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of generated row identifiers
pub const ID_LENGTH: usize = 14;

/// Generate a fresh random alphanumeric identifier
///
/// # Examples
///
/// ```
/// use podcast_sync::utils::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 14);
/// assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Strip the URL scheme (`http://`, `https://`, ...) from a URL
///
/// Only the scheme prefix is removed. Case, trailing slashes and query
/// strings are left untouched, so comparisons stay verbatim otherwise.
/// Strings without a valid scheme prefix are returned unchanged.
///
/// # Examples
///
/// ```
/// use podcast_sync::utils::strip_scheme;
///
/// assert_eq!(strip_scheme("https://a.com/feed"), "a.com/feed");
/// assert_eq!(strip_scheme("a.com/feed"), "a.com/feed");
/// assert_eq!(strip_scheme("http://A.com/feed/"), "A.com/feed/");
/// ```
pub fn strip_scheme(url: &str) -> &str {
    let Some(idx) = url.find("://") else {
        return url;
    };

    let scheme = &url[..idx];
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if valid { &url[idx + 3..] } else { url }
}

/// Whether two URLs are equal once their schemes are stripped
pub fn same_feed_location(a: &str, b: &str) -> bool {
    strip_scheme(a) == strip_scheme(b)
}

/// Convert Unix seconds to a UTC timestamp, falling back to now for out-of-range values
pub fn from_unix_seconds(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}
