//! Request signing for the directory API
//!
//! Every request carries `X-Auth-Date` (Unix seconds) and an `Authorization`
//! header holding `sha1_hex(auth_key + secret_key + X-Auth-Date)`. The
//! directory rejects dates too far from its own clock, so a signature is
//! computed for each request from the time it is sent and never reused.

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use std::fmt::Write;

/// Header values authenticating one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSignature {
    /// Unix seconds sent as `X-Auth-Date`
    pub timestamp: i64,
    /// Lowercase hex SHA-1 sent as `Authorization`
    pub authorization: String,
}

/// Sign a request sent at `now`
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use podcast_sync::directory::sign;
///
/// let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let signature = sign("key", "secret", now);
/// assert_eq!(signature.timestamp, 1_700_000_000);
/// assert_eq!(
///     signature.authorization,
///     "abaf71c02050c31e4d4e6b08c1625173af0445ba"
/// );
/// ```
pub fn sign(auth_key: &str, secret_key: &str, now: DateTime<Utc>) -> RequestSignature {
    let timestamp = now.timestamp();

    let mut hasher = Sha1::new();
    hasher.update(auth_key.as_bytes());
    hasher.update(secret_key.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());

    RequestSignature {
        timestamp,
        authorization: to_hex(&hasher.finalize()),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn signs_concatenation_of_keys_and_time() {
        let now = Utc.timestamp_opt(1_613_394_000, 0).unwrap();
        let signature = sign("UXKCGDSYGUUEVQJSYDZH", "YMGCRDSPGHRVPLTDHPKVSPFBCS", now);
        assert_eq!(
            signature.authorization,
            "2c9f3801fafb64bcbca5fd261fa5403d71436bc8"
        );
    }

    #[test]
    fn different_times_give_different_signatures() {
        let a = sign("key", "secret", Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let b = sign("key", "secret", Utc.timestamp_opt(1_700_000_001, 0).unwrap());
        assert_ne!(a.authorization, b.authorization);
        assert_eq!(b.timestamp - a.timestamp, 1);
    }

    #[test]
    fn sub_second_precision_is_dropped() {
        let now = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        let signature = sign("key", "secret", now);
        assert_eq!(signature.timestamp, 1_700_000_000);
        assert_eq!(
            signature.authorization,
            "abaf71c02050c31e4d4e6b08c1625173af0445ba"
        );
    }
}
