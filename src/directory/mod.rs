//! Client for the external podcast directory
//!
//! The directory reports which feeds changed recently. [`DirectoryClient`]
//! signs every request with a fresh timestamp, validates each entry at the
//! boundary, and returns a deduplicated list capped at
//! [`MAX_RECENTLY_UPDATED`] ids. Any failure yields an error and no partial
//! result.

mod models;
mod signing;

pub use signing::{RequestSignature, sign};

use crate::config::DirectoryConfig;
use crate::error::DirectoryFetchError;
use crate::types::RecentlyUpdatedFeed;
use chrono::Utc;
use models::UpdatedFeedsResponse;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Most ids returned by one "recently updated" fetch
pub const MAX_RECENTLY_UPDATED: usize = 1000;

/// Authenticated client for the directory API
#[derive(Clone)]
pub struct DirectoryClient {
    http_client: reqwest::Client,
    endpoint: Url,
    auth_key: String,
    secret_key: String,
}

impl DirectoryClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryFetchError::InvalidBaseUrl`] if the base URL cannot be
    /// parsed, or [`DirectoryFetchError::Request`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryFetchError> {
        let endpoint = updated_endpoint(&config.base_url)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DirectoryFetchError::Request {
                url: endpoint.to_string(),
                source: e,
            })?;

        Ok(Self {
            http_client,
            endpoint,
            auth_key: config.auth_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Fetch feeds the directory reports changed within `window`
    ///
    /// Entries without an external id or language are dropped. The result is
    /// deduplicated by external id, keeps first-seen order, and holds at most
    /// [`MAX_RECENTLY_UPDATED`] entries.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryFetchError`] on network failure, timeout, non-2xx
    /// status, or an unreadable body.
    pub async fn fetch_recently_updated(
        &self,
        window: Duration,
    ) -> Result<Vec<RecentlyUpdatedFeed>, DirectoryFetchError> {
        let now = Utc::now();
        let window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        let since = now.timestamp().saturating_sub(window_secs).max(0);

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("since", &since.to_string())
            .append_pair("max", &MAX_RECENTLY_UPDATED.to_string());

        debug!(url = %url, "fetching recently updated feeds");

        // signed right before sending; never reuse a signature
        let signature = sign(&self.auth_key, &self.secret_key, Utc::now());
        let response = self
            .http_client
            .get(url.clone())
            .header("X-Auth-Key", &self.auth_key)
            .header("X-Auth-Date", signature.timestamp.to_string())
            .header("Authorization", &signature.authorization)
            .send()
            .await
            .map_err(|e| DirectoryFetchError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryFetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DirectoryFetchError::from_reqwest(url.as_str(), e))?;
        let parsed: UpdatedFeedsResponse = serde_json::from_slice(&body)
            .map_err(|e| DirectoryFetchError::Decode(e.to_string()))?;

        let total = parsed.feeds.len();
        let feeds = select_eligible(parsed.into_valid_feeds());

        info!(
            total,
            eligible = feeds.len(),
            since,
            "fetched recently updated feeds"
        );
        Ok(feeds)
    }
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

fn updated_endpoint(base_url: &str) -> Result<Url, DirectoryFetchError> {
    let joined = format!("{}/podcasts/updated", base_url.trim_end_matches('/'));
    let url = Url::parse(&joined)
        .map_err(|e| DirectoryFetchError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DirectoryFetchError::InvalidBaseUrl(format!(
            "{}: unsupported scheme {}",
            base_url,
            url.scheme()
        )));
    }
    Ok(url)
}

/// Deduplicate by external id in first-seen order and apply the cap
fn select_eligible(
    feeds: impl Iterator<Item = RecentlyUpdatedFeed>,
) -> Vec<RecentlyUpdatedFeed> {
    let mut seen = HashSet::new();
    feeds
        .filter(|feed| seen.insert(feed.external_id.clone()))
        .take(MAX_RECENTLY_UPDATED)
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
