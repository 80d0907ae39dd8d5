//! Catalog store backed by SQLite transactions.

use crate::error::DatabaseError;
use crate::store::{CatalogStore, CatalogTransaction};
use crate::types::{FeedUrl, NewPodcast, Podcast};
use crate::utils::generate_id;
use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::HashSet;

use super::{Database, FeedUrlRow, PodcastRow};

/// Ids looked up per `IN (...)` query, well under SQLite's variable limit
const LOOKUP_CHUNK: usize = 500;

#[async_trait]
impl CatalogStore for Database {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, DatabaseError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::query("Failed to begin transaction", e))?;
        Ok(Box::new(SqliteCatalogTx { tx: Some(tx) }))
    }

    async fn known_authority_ids(
        &self,
        authority_ids: &[String],
    ) -> Result<HashSet<String>, DatabaseError> {
        let mut known = HashSet::new();

        for chunk in authority_ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT authority_id FROM podcasts WHERE authority_id IN ({})",
                placeholders
            );

            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for id in chunk {
                query = query.bind(id);
            }

            let found = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| DatabaseError::query("Failed to look up authority ids", e))?;
            known.extend(found);
        }

        Ok(known)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// One reconciliation's sqlx transaction
///
/// Dropping it without committing rolls the transaction back.
struct SqliteCatalogTx {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteCatalogTx {
    fn conn(&mut self) -> Result<&mut SqliteConnection, DatabaseError> {
        self.tx
            .as_deref_mut()
            .ok_or(DatabaseError::TransactionClosed)
    }
}

#[async_trait]
impl CatalogTransaction for SqliteCatalogTx {
    async fn find_podcast_by_authority_id(
        &mut self,
        authority_id: &str,
    ) -> Result<Option<Podcast>, DatabaseError> {
        let row = sqlx::query_as::<_, PodcastRow>(
            r#"
            SELECT id, authority_id, podcast_index_id, title, is_public
            FROM podcasts
            WHERE authority_id = ?
            "#,
        )
        .bind(authority_id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| DatabaseError::query("Failed to find podcast", e))?;

        Ok(row.map(Podcast::from))
    }

    async fn create_podcast(&mut self, podcast: NewPodcast<'_>) -> Result<Podcast, DatabaseError> {
        let id = generate_id();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO podcasts (id, authority_id, podcast_index_id, title, is_public, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(podcast.authority_id)
        .bind(podcast.podcast_index_id)
        .bind(podcast.title)
        .bind(i32::from(podcast.is_public))
        .bind(now)
        .bind(now)
        .execute(self.conn()?)
        .await
        .map_err(|e| DatabaseError::query("Failed to insert podcast", e))?;

        Ok(Podcast {
            id,
            authority_id: podcast.authority_id.to_string(),
            podcast_index_id: podcast.podcast_index_id.map(str::to_string),
            title: podcast.title.map(str::to_string),
            is_public: podcast.is_public,
        })
    }

    async fn list_feed_urls(&mut self, podcast_id: &str) -> Result<Vec<FeedUrl>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedUrlRow>(
            r#"
            SELECT id, podcast_id, url, is_authority
            FROM feed_urls
            WHERE podcast_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(podcast_id)
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| DatabaseError::query("Failed to list feed URLs", e))?;

        Ok(rows.into_iter().map(FeedUrl::from).collect())
    }

    async fn set_feed_url_authority(
        &mut self,
        feed_url_id: &str,
        is_authority: bool,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feed_urls SET is_authority = ?, updated_at = ? WHERE id = ?")
            .bind(i32::from(is_authority))
            .bind(chrono::Utc::now().timestamp())
            .bind(feed_url_id)
            .execute(self.conn()?)
            .await
            .map_err(|e| DatabaseError::query("Failed to update feed URL authority", e))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed URL {}", feed_url_id)));
        }
        Ok(())
    }

    async fn insert_feed_url(
        &mut self,
        podcast_id: &str,
        url: &str,
        is_authority: bool,
    ) -> Result<FeedUrl, DatabaseError> {
        let id = generate_id();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO feed_urls (id, podcast_id, url, is_authority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(podcast_id)
        .bind(url)
        .bind(i32::from(is_authority))
        .bind(now)
        .bind(now)
        .execute(self.conn()?)
        .await
        .map_err(|e| DatabaseError::query("Failed to insert feed URL", e))?;

        Ok(FeedUrl {
            id,
            podcast_id: podcast_id.to_string(),
            url: url.to_string(),
            is_authority,
        })
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        let tx = self.tx.take().ok_or(DatabaseError::TransactionClosed)?;
        tx.commit()
            .await
            .map_err(|e| DatabaseError::query("Failed to commit transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        let tx = self.tx.take().ok_or(DatabaseError::TransactionClosed)?;
        tx.rollback()
            .await
            .map_err(|e| DatabaseError::query("Failed to roll back transaction", e))
    }
}
