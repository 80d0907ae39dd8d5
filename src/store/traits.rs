//! Traits for catalog persistence

use crate::error::DatabaseError;
use crate::types::{FeedUrl, NewPodcast, Podcast};
use async_trait::async_trait;
use std::collections::HashSet;

/// Source of catalog transactions
///
/// Implementations must give each transaction isolation strong enough that
/// two concurrent reconciliations of the same podcast can never both commit
/// an authority row (SQLite's serializable transactions, or an exclusive lock
/// for in-memory stores).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a transaction
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be acquired or the transaction
    /// cannot be started.
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, DatabaseError>;

    /// Which of `authority_ids` already have a podcast
    ///
    /// This is a plain read outside any reconciliation transaction.
    async fn known_authority_ids(
        &self,
        authority_ids: &[String],
    ) -> Result<HashSet<String>, DatabaseError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// One atomic unit of catalog work
///
/// Nothing written through a transaction is visible to other transactions
/// until [`commit`](CatalogTransaction::commit) succeeds. Dropping a
/// transaction without committing discards its writes. After `commit` or
/// `rollback`, every method returns [`DatabaseError::TransactionClosed`].
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Look up the podcast correlated with an external id
    async fn find_podcast_by_authority_id(
        &mut self,
        authority_id: &str,
    ) -> Result<Option<Podcast>, DatabaseError>;

    /// Create a podcast with a freshly generated identity
    async fn create_podcast(&mut self, podcast: NewPodcast<'_>) -> Result<Podcast, DatabaseError>;

    /// All feed URL rows owned by a podcast, oldest first
    async fn list_feed_urls(&mut self, podcast_id: &str) -> Result<Vec<FeedUrl>, DatabaseError>;

    /// Set the authority flag of one feed URL row
    async fn set_feed_url_authority(
        &mut self,
        feed_url_id: &str,
        is_authority: bool,
    ) -> Result<(), DatabaseError>;

    /// Insert a feed URL row for a podcast
    async fn insert_feed_url(
        &mut self,
        podcast_id: &str,
        url: &str,
        is_authority: bool,
    ) -> Result<FeedUrl, DatabaseError>;

    /// Make every write of this transaction visible
    async fn commit(&mut self) -> Result<(), DatabaseError>;

    /// Discard every write of this transaction
    async fn rollback(&mut self) -> Result<(), DatabaseError>;
}
