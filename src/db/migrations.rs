//! Opening the catalog database and bringing its schema up to date

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::Database;

/// How long a connection waits for a competing writer before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema versions in application order
const MIGRATIONS: &[(i64, &[(&str, &str)])] = &[(1, MIGRATION_V1), (2, MIGRATION_V2)];

fn connection_failed(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::ConnectionFailed(format!("{}: {}", context, e)))
}

fn migration_failed(context: String) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::MigrationFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// Open (or create) the catalog at `path` and apply pending migrations
    ///
    /// Missing parent directories are created. The pool runs in WAL mode with
    /// foreign keys on, and waits up to five seconds on a locked database.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(connection_failed("invalid database path"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(connection_failed("cannot open database"))?;

        let db = Self {
            pool,
            queue_capacity: usize::MAX,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Limit the number of pending work items
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(connection_failed("cannot acquire connection"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL)",
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("schema_version table".to_string()))?;

        let applied = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_version")
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "reading schema version: {}",
                    e
                )))
            })?
            .flatten()
            .unwrap_or(0);

        for &(version, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
            tracing::info!(version, "applying catalog migration");

            // Dropping the transaction on an early return rolls the migration back
            let mut tx = conn
                .begin()
                .await
                .map_err(migration_failed(format!("v{} begin", version)))?;

            for (what, sql) in statements {
                sqlx::query(*sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(migration_failed(format!("v{} {}", version, what)))?;
            }

            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *tx)
                .await
                .map_err(migration_failed(format!("v{} record", version)))?;

            tx.commit()
                .await
                .map_err(migration_failed(format!("v{} commit", version)))?;
        }

        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Migration v1: podcast catalog
///
/// The partial unique index makes a second authority row per podcast a
/// constraint violation, so the engine enforces the single-authority rule too.
const MIGRATION_V1: &[(&str, &str)] = &[
    (
        "podcasts table",
        r#"
        CREATE TABLE podcasts (
            id TEXT PRIMARY KEY NOT NULL,
            authority_id TEXT NOT NULL UNIQUE,
            podcast_index_id TEXT,
            title TEXT,
            is_public INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "feed_urls table",
        r#"
        CREATE TABLE feed_urls (
            id TEXT PRIMARY KEY NOT NULL,
            podcast_id TEXT NOT NULL REFERENCES podcasts(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            is_authority INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (podcast_id, url)
        )
        "#,
    ),
    (
        "feed_urls authority index",
        r#"
        CREATE UNIQUE INDEX idx_feed_urls_single_authority
            ON feed_urls(podcast_id) WHERE is_authority = 1
        "#,
    ),
    (
        "feed_urls url index",
        "CREATE INDEX idx_feed_urls_url ON feed_urls(url)",
    ),
];

/// Migration v2: durable work queue
const MIGRATION_V2: &[(&str, &str)] = &[
    (
        "work_items table",
        r#"
        CREATE TABLE work_items (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            priority INTEGER NOT NULL DEFAULT 0,
            enqueued_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "work_items order index",
        "CREATE INDEX idx_work_items_order ON work_items(priority DESC, seq)",
    ),
];
