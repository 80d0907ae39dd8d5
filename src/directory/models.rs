//! Response shapes of the directory API, validated at the boundary

use crate::types::RecentlyUpdatedFeed;
use crate::utils::from_unix_seconds;
use serde::Deserialize;
use serde_json::Value;

/// Body of `GET /podcasts/updated`
///
/// Entries stay untyped here so one malformed entry is dropped on its own
/// instead of failing the whole body.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdatedFeedsResponse {
    pub(crate) feeds: Vec<Value>,
}

impl UpdatedFeedsResponse {
    /// Entries that pass validation, in response order
    pub(crate) fn into_valid_feeds(self) -> impl Iterator<Item = RecentlyUpdatedFeed> {
        self.feeds.into_iter().filter_map(RawUpdatedFeed::from_entry)
    }
}

/// One entry as sent by the directory
///
/// Fields are loosely typed: the directory has sent `itunesId` both as a
/// number and as a string, uses `null` or `0` for "none", and sends
/// `lastUpdateTime` as an integer, a float or a string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawUpdatedFeed {
    #[serde(default)]
    pub(crate) itunes_id: Value,
    #[serde(default)]
    pub(crate) language: Value,
    #[serde(default)]
    pub(crate) last_update_time: Value,
}

impl RawUpdatedFeed {
    /// Validate one raw entry; anything that is not an object is dropped
    pub(crate) fn from_entry(entry: Value) -> Option<RecentlyUpdatedFeed> {
        if !entry.is_object() {
            return None;
        }
        serde_json::from_value::<RawUpdatedFeed>(entry)
            .ok()
            .and_then(RawUpdatedFeed::validate)
    }

    /// Keep entries with both an external id and a language
    pub(crate) fn validate(self) -> Option<RecentlyUpdatedFeed> {
        let external_id = truthy_id(&self.itunes_id)?;
        let language = truthy_string(&self.language)?;
        Some(RecentlyUpdatedFeed {
            external_id,
            language,
            last_updated: unix_seconds(&self.last_update_time).map(from_unix_seconds),
        })
    }
}

fn truthy_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                (i != 0).then(|| i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                // whole floats (`1234.0`) must match the integer ids in dumps
                n.as_f64()
                    .filter(|f| *f != 0.0 && f.is_finite())
                    .map(|f| if f.fract() == 0.0 { format!("{:.0}", f) } else { f.to_string() })
            }
        }
        Value::String(_) => truthy_string(value),
        _ => None,
    }
}

fn unix_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
