//! Configuration types for podcast-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

/// Directory service connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// API base URL (default: "https://api.podcastindex.org/api/1.0")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Public API key, sent in the `X-Auth-Key` header
    #[serde(default)]
    pub auth_key: String,

    /// Secret key, only ever used to derive the request signature
    #[serde(default)]
    pub secret_key: String,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for a single directory request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// How far back a "recently updated" poll looks (default: 10 minutes)
    #[serde(default = "default_recently_updated_window", with = "duration_serde")]
    pub recently_updated_window: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_key: String::new(),
            secret_key: String::new(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            recently_updated_window: default_recently_updated_window(),
        }
    }
}

// Keys stay out of logs
impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("base_url", &self.base_url)
            .field("auth_key", &redact(&self.auth_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("recently_updated_window", &self.recently_updated_window)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<unset>" } else { "<redacted>" }
}

/// Bulk ingestion settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Records handed to the reconciler per second (default: 0.5)
    #[serde(default = "default_records_per_second")]
    pub records_per_second: f64,

    /// Records that may be processed back-to-back before pacing kicks in (default: 1)
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enqueue records whose reconciliation changed state as bulk work (default: true)
    #[serde(default = "default_true")]
    pub dispatch_changed: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            records_per_second: default_records_per_second(),
            burst: default_burst(),
            dispatch_changed: true,
        }
    }
}

/// Which work queue implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process queue; pending work is lost on restart
    Memory,
    /// Queue table in the catalog database
    #[default]
    Database,
}

/// Work queue settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue implementation (default: database)
    #[serde(default)]
    pub backend: QueueBackend,

    /// Maximum pending items (default: 50000)
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Only dispatch recently updated ids that already have a podcast (default: false)
    #[serde(default)]
    pub only_known_podcasts: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            capacity: default_queue_capacity(),
            only_known_podcasts: false,
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./podcast-sync.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Periodic job settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Interval between "recently updated" cycles (default: 5 minutes)
    #[serde(default = "default_recently_updated_interval", with = "duration_serde")]
    pub recently_updated_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            recently_updated_interval: default_recently_updated_interval(),
        }
    }
}

/// Main configuration for PodcastSync
///
/// Fields are organized into sub-configs:
/// - [`directory`](DirectoryConfig) - directory API location, credentials, timeouts
/// - [`ingest`](IngestConfig) - bulk pacing and dispatch
/// - [`queue`](QueueConfig) - work queue backend and bounds
/// - [`persistence`](PersistenceConfig) - catalog database
/// - [`schedule`](ScheduleConfig) - periodic cycle timing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory API settings
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Bulk ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Work queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Periodic job timing
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Build a configuration from process environment variables over defaults
    ///
    /// See [`Config::from_lookup`] for the recognized variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup over defaults
    ///
    /// Recognized variables:
    /// - `PODCAST_INDEX_BASE_URL`
    /// - `PODCAST_INDEX_AUTH_KEY`
    /// - `PODCAST_INDEX_SECRET_KEY`
    /// - `PODCAST_INDEX_RECENTLY_UPDATED_SINCE_TIME` - lookback window in milliseconds
    /// - `USER_AGENT`
    /// - `DATABASE_PATH`
    /// - `INGEST_RECORDS_PER_SECOND`
    /// - `QUEUE_BACKEND` - `memory` or `database`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = lookup("PODCAST_INDEX_BASE_URL") {
            config.directory.base_url = v;
        }
        if let Some(v) = lookup("PODCAST_INDEX_AUTH_KEY") {
            config.directory.auth_key = v;
        }
        if let Some(v) = lookup("PODCAST_INDEX_SECRET_KEY") {
            config.directory.secret_key = v;
        }
        if let Some(v) = lookup("PODCAST_INDEX_RECENTLY_UPDATED_SINCE_TIME") {
            let millis: u64 = parse_var("PODCAST_INDEX_RECENTLY_UPDATED_SINCE_TIME", &v)?;
            config.directory.recently_updated_window = Duration::from_millis(millis);
        }
        if let Some(v) = lookup("USER_AGENT") {
            config.directory.user_agent = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            config.persistence.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("INGEST_RECORDS_PER_SECOND") {
            config.ingest.records_per_second = parse_var("INGEST_RECORDS_PER_SECOND", &v)?;
        }
        if let Some(v) = lookup("QUEUE_BACKEND") {
            config.queue.backend = match v.trim().to_ascii_lowercase().as_str() {
                "memory" => QueueBackend::Memory,
                "database" => QueueBackend::Database,
                other => {
                    return Err(Error::Config {
                        message: format!("unknown queue backend '{}'", other),
                        key: Some("QUEUE_BACKEND".to_string()),
                    });
                }
            };
        }

        Ok(config)
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.directory.auth_key.trim().is_empty() {
            return Err(config_error("auth key is required", "directory.auth_key"));
        }
        if self.directory.secret_key.trim().is_empty() {
            return Err(config_error(
                "secret key is required",
                "directory.secret_key",
            ));
        }
        if let Err(e) = url::Url::parse(&self.directory.base_url) {
            return Err(config_error(
                &format!("invalid base URL '{}': {}", self.directory.base_url, e),
                "directory.base_url",
            ));
        }
        if self.directory.request_timeout.is_zero() {
            return Err(config_error(
                "request timeout must be positive",
                "directory.request_timeout",
            ));
        }
        // A cycle that starts later than the previous window reaches back would skip updates
        if self.schedule.recently_updated_interval > self.directory.recently_updated_window {
            return Err(config_error(
                "recently updated interval is longer than the lookback window",
                "schedule.recently_updated_interval",
            ));
        }
        self.validate_for_backfill()
    }

    /// Check only what a dump backfill needs
    ///
    /// Directory credentials and the polling schedule are not looked at, so
    /// a dump can be reconciled without a directory account.
    pub fn validate_for_backfill(&self) -> Result<()> {
        if !(self.ingest.records_per_second.is_finite() && self.ingest.records_per_second > 0.0) {
            return Err(config_error(
                "records per second must be a positive number",
                "ingest.records_per_second",
            ));
        }
        if self.ingest.burst == 0 {
            return Err(config_error("burst must be at least 1", "ingest.burst"));
        }
        if self.queue.capacity == 0 {
            return Err(config_error(
                "queue capacity must be at least 1",
                "queue.capacity",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::Config {
        message: format!("invalid value '{}': {}", value, e),
        key: Some(key.to_string()),
    })
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.podcastindex.org/api/1.0".to_string()
}

fn default_user_agent() -> String {
    concat!("podcast-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_recently_updated_window() -> Duration {
    Duration::from_secs(600)
}

fn default_records_per_second() -> f64 {
    0.5
}

fn default_burst() -> u32 {
    1
}

fn default_queue_capacity() -> usize {
    50_000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./podcast-sync.db")
}

fn default_recently_updated_interval() -> Duration {
    Duration::from_secs(300)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
