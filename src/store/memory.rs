//! In-memory catalog store

use super::traits::{CatalogStore, CatalogTransaction};
use crate::error::DatabaseError;
use crate::types::{FeedUrl, NewPodcast, Podcast};
use crate::utils::generate_id;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    podcasts: Vec<Podcast>,
    feed_urls: Vec<FeedUrl>,
    failing_urls: HashSet<String>,
}

/// In-memory catalog with the same contract as the SQLite store
///
/// A transaction holds an exclusive lock on the whole catalog and works on a
/// private copy, which replaces the shared state on commit. The same
/// constraints as the SQLite schema are enforced: one podcast per authority
/// id, unique URLs per podcast, and at most one authority row per podcast.
///
/// # Examples
///
/// ```
/// use podcast_sync::store::{CatalogStore, MemoryCatalog};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryCatalog::new();
/// let mut tx = store.begin().await?;
/// assert!(tx.find_podcast_by_authority_id("123").await?.is_none());
/// tx.rollback().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all podcasts, in creation order
    pub async fn podcasts(&self) -> Vec<Podcast> {
        self.state.lock().await.podcasts.clone()
    }

    /// Snapshot of all feed URL rows, in creation order
    pub async fn feed_urls(&self) -> Vec<FeedUrl> {
        self.state.lock().await.feed_urls.clone()
    }

    /// Feed URL rows of one podcast that are currently authority
    pub async fn authorities(&self, podcast_id: &str) -> Vec<FeedUrl> {
        self.state
            .lock()
            .await
            .feed_urls
            .iter()
            .filter(|f| f.podcast_id == podcast_id && f.is_authority)
            .cloned()
            .collect()
    }

    /// Insert rows directly, bypassing constraints
    ///
    /// Used to reproduce catalogs written by older tooling, e.g. a podcast
    /// with several authority rows.
    pub async fn seed(&self, podcast: Podcast, feed_urls: Vec<FeedUrl>) {
        let mut state = self.state.lock().await;
        state.podcasts.push(podcast);
        state.feed_urls.extend(feed_urls);
    }

    /// Make every later insert of `url` fail with a query error
    pub async fn fail_inserts_for(&self, url: impl Into<String>) {
        self.state.lock().await.failing_urls.insert(url.into());
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, DatabaseError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
        }))
    }

    async fn known_authority_ids(
        &self,
        authority_ids: &[String],
    ) -> Result<HashSet<String>, DatabaseError> {
        let wanted: HashSet<&str> = authority_ids.iter().map(String::as_str).collect();
        let state = self.state.lock().await;
        Ok(state
            .podcasts
            .iter()
            .filter(|p| wanted.contains(p.authority_id.as_str()))
            .map(|p| p.authority_id.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

impl MemoryTransaction {
    fn open(&mut self) -> Result<&mut MemoryState, DatabaseError> {
        if self.guard.is_some() {
            Ok(&mut self.working)
        } else {
            Err(DatabaseError::TransactionClosed)
        }
    }
}

fn check_single_authority(
    state: &MemoryState,
    podcast_id: &str,
    except_id: Option<&str>,
) -> Result<(), DatabaseError> {
    let clash = state.feed_urls.iter().any(|f| {
        f.podcast_id == podcast_id && f.is_authority && Some(f.id.as_str()) != except_id
    });
    if clash {
        return Err(DatabaseError::ConstraintViolation(format!(
            "podcast {} already has an authority feed URL",
            podcast_id
        )));
    }
    Ok(())
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn find_podcast_by_authority_id(
        &mut self,
        authority_id: &str,
    ) -> Result<Option<Podcast>, DatabaseError> {
        let state = self.open()?;
        Ok(state
            .podcasts
            .iter()
            .find(|p| p.authority_id == authority_id)
            .cloned())
    }

    async fn create_podcast(&mut self, podcast: NewPodcast<'_>) -> Result<Podcast, DatabaseError> {
        let state = self.open()?;
        if state
            .podcasts
            .iter()
            .any(|p| p.authority_id == podcast.authority_id)
        {
            return Err(DatabaseError::ConstraintViolation(format!(
                "podcast with authority id {} already exists",
                podcast.authority_id
            )));
        }

        let created = Podcast {
            id: generate_id(),
            authority_id: podcast.authority_id.to_string(),
            podcast_index_id: podcast.podcast_index_id.map(str::to_string),
            title: podcast.title.map(str::to_string),
            is_public: podcast.is_public,
        };
        state.podcasts.push(created.clone());
        Ok(created)
    }

    async fn list_feed_urls(&mut self, podcast_id: &str) -> Result<Vec<FeedUrl>, DatabaseError> {
        let state = self.open()?;
        Ok(state
            .feed_urls
            .iter()
            .filter(|f| f.podcast_id == podcast_id)
            .cloned()
            .collect())
    }

    async fn set_feed_url_authority(
        &mut self,
        feed_url_id: &str,
        is_authority: bool,
    ) -> Result<(), DatabaseError> {
        let state = self.open()?;
        let podcast_id = state
            .feed_urls
            .iter()
            .find(|f| f.id == feed_url_id)
            .map(|f| f.podcast_id.clone())
            .ok_or_else(|| DatabaseError::NotFound(format!("feed URL {}", feed_url_id)))?;

        if is_authority {
            check_single_authority(state, &podcast_id, Some(feed_url_id))?;
        }

        if let Some(row) = state.feed_urls.iter_mut().find(|f| f.id == feed_url_id) {
            row.is_authority = is_authority;
        }
        Ok(())
    }

    async fn insert_feed_url(
        &mut self,
        podcast_id: &str,
        url: &str,
        is_authority: bool,
    ) -> Result<FeedUrl, DatabaseError> {
        let state = self.open()?;
        if state.failing_urls.contains(url) {
            return Err(DatabaseError::QueryFailed(format!(
                "injected failure inserting {}",
                url
            )));
        }
        if !state.podcasts.iter().any(|p| p.id == podcast_id) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "podcast {} does not exist",
                podcast_id
            )));
        }
        if state
            .feed_urls
            .iter()
            .any(|f| f.podcast_id == podcast_id && f.url == url)
        {
            return Err(DatabaseError::ConstraintViolation(format!(
                "podcast {} already has feed URL {}",
                podcast_id, url
            )));
        }
        if is_authority {
            check_single_authority(state, podcast_id, None)?;
        }

        let row = FeedUrl {
            id: generate_id(),
            podcast_id: podcast_id.to_string(),
            url: url.to_string(),
            is_authority,
        };
        state.feed_urls.push(row.clone());
        Ok(row)
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        let mut guard = self.guard.take().ok_or(DatabaseError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.guard.take().ok_or(DatabaseError::TransactionClosed)?;
        self.working = MemoryState::default();
        Ok(())
    }
}
