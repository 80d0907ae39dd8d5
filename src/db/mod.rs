//! Database layer for podcast-sync
//!
//! SQLite persistence for the podcast catalog and the durable work queue.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`catalog`] - [`CatalogStore`](crate::store::CatalogStore) implementation
//!   (podcasts and feed URLs, one sqlx transaction per reconciliation)
//! - [`work_queue`] - [`WorkQueue`](crate::queue::WorkQueue) implementation

use crate::types::{FeedUrl, Podcast, PriorityClass, WorkItem};
use crate::utils::from_unix_seconds;
use sqlx::{FromRow, sqlite::SqlitePool};

mod catalog;
mod migrations;
mod work_queue;

/// Podcast record from database
#[derive(Debug, Clone, FromRow)]
pub struct PodcastRow {
    /// Internal identity
    pub id: String,
    /// External correlation key
    pub authority_id: String,
    /// Directory-native id
    pub podcast_index_id: Option<String>,
    /// Display title
    pub title: Option<String>,
    /// Visibility flag (0 = hidden, 1 = public)
    pub is_public: i64,
}

impl From<PodcastRow> for Podcast {
    fn from(row: PodcastRow) -> Self {
        Podcast {
            id: row.id,
            authority_id: row.authority_id,
            podcast_index_id: row.podcast_index_id,
            title: row.title,
            is_public: row.is_public != 0,
        }
    }
}

/// Feed URL record from database
#[derive(Debug, Clone, FromRow)]
pub struct FeedUrlRow {
    /// Internal identity
    pub id: String,
    /// Owning podcast
    pub podcast_id: String,
    /// URL as received
    pub url: String,
    /// Authority flag (0 = retired, 1 = current)
    pub is_authority: i64,
}

impl From<FeedUrlRow> for FeedUrl {
    fn from(row: FeedUrlRow) -> Self {
        FeedUrl {
            id: row.id,
            podcast_id: row.podcast_id,
            url: row.url,
            is_authority: row.is_authority != 0,
        }
    }
}

/// Pending work item record from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkItemRow {
    /// External id to re-parse
    pub external_id: String,
    /// Priority code (see [`PriorityClass::to_i32`])
    pub priority: i32,
    /// Unix timestamp when the item first became pending
    pub enqueued_at: i64,
}

impl From<WorkItemRow> for WorkItem {
    fn from(row: WorkItemRow) -> Self {
        WorkItem {
            external_id: row.external_id,
            priority: PriorityClass::from_i32(row.priority),
            enqueued_at: from_unix_seconds(row.enqueued_at),
        }
    }
}

/// Database handle for podcast-sync
pub struct Database {
    pool: SqlitePool,
    queue_capacity: usize,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
