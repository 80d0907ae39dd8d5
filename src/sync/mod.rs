//! Top-level wiring of both synchronization paths
//!
//! [`PodcastSync`] owns one instance of every component and exposes the two
//! cycles:
//!
//! - [`sync_recently_updated`](PodcastSync::sync_recently_updated): directory
//!   poll → (optional known-podcast filter) → urgent dispatch
//! - [`sync_from_dump`](PodcastSync::sync_from_dump): bulk dump →
//!   reconciliation → bulk dispatch of changed podcasts
//!
//! The two cycles share the catalog and the queue but are not serialized
//! against each other. Callers must not start two overlapping dump runs.

use crate::config::{Config, QueueBackend};
use crate::db::Database;
use crate::directory::DirectoryClient;
use crate::error::Result;
use crate::ingest::{RecordIngestor, open_dump};
use crate::queue::{MemoryWorkQueue, QueueDispatcher, WorkQueue};
use crate::rate_limiter::RateLimiter;
use crate::reconciler::AuthorityReconciler;
use crate::store::CatalogStore;
use crate::types::{CycleReport, IngestReport, PriorityClass};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Catalog synchronization service
#[derive(Clone)]
pub struct PodcastSync {
    config: Arc<Config>,
    directory: DirectoryClient,
    catalog: Arc<dyn CatalogStore>,
    dispatcher: QueueDispatcher,
    reconciler: AuthorityReconciler,
    ingestor: RecordIngestor,
}

impl PodcastSync {
    /// Build the service from configuration
    ///
    /// Validates the configuration, opens (and migrates) the SQLite catalog,
    /// and selects the queue backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened, or the directory client cannot be built.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Self::open(config).await
    }

    /// Build a service that only runs dump backfills
    ///
    /// Same as [`new`](Self::new) but without directory credentials or a
    /// polling schedule. Calling
    /// [`sync_recently_updated`](Self::sync_recently_updated) on the result
    /// fails with the directory's authentication error.
    ///
    /// # Errors
    ///
    /// Returns an error if the ingest or queue settings are invalid, the
    /// database cannot be opened, or the directory base URL is unusable.
    pub async fn for_backfill(config: Config) -> Result<Self> {
        config.validate_for_backfill()?;
        Self::open(config).await
    }

    async fn open(config: Config) -> Result<Self> {
        let db = Arc::new(
            Database::new(&config.persistence.database_path)
                .await?
                .with_queue_capacity(config.queue.capacity),
        );

        let queue: Arc<dyn WorkQueue> = match config.queue.backend {
            QueueBackend::Memory => Arc::new(MemoryWorkQueue::new(config.queue.capacity)),
            QueueBackend::Database => db.clone(),
        };

        Self::with_components(config, db, queue)
    }

    /// Build the service around existing store and queue implementations
    ///
    /// The configuration is not validated here, so tests can point the
    /// directory at a local mock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory client cannot be built.
    pub fn with_components(
        config: Config,
        catalog: Arc<dyn CatalogStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Result<Self> {
        let directory = DirectoryClient::new(&config.directory)?;
        let dispatcher = QueueDispatcher::new(queue);
        let reconciler = AuthorityReconciler::new(catalog.clone());

        let limiter = RateLimiter::new(config.ingest.records_per_second, config.ingest.burst);
        let mut ingestor = RecordIngestor::new(reconciler.clone(), limiter);
        if config.ingest.dispatch_changed {
            ingestor = ingestor.with_dispatcher(dispatcher.clone());
        }

        info!(
            catalog = catalog.name(),
            queue = dispatcher.queue().name(),
            only_known_podcasts = config.queue.only_known_podcasts,
            "podcast sync ready"
        );

        Ok(Self {
            config: Arc::new(config),
            directory,
            catalog,
            dispatcher,
            reconciler,
            ingestor,
        })
    }

    /// Run one "recently updated" cycle
    ///
    /// Fetches the feeds the directory reports changed within the configured
    /// window and enqueues them as urgent work. A dispatch failure drops the
    /// batch and is reported in [`CycleReport::dropped`]; the next cycle
    /// picks the feeds up again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryFetch`](crate::Error::DirectoryFetch) if the
    /// directory call fails, and [`Error::Database`](crate::Error::Database)
    /// if the known-podcast filter cannot read the catalog. Nothing is
    /// enqueued in either case.
    pub async fn sync_recently_updated(&self) -> Result<CycleReport> {
        let feeds = self
            .directory
            .fetch_recently_updated(self.config.directory.recently_updated_window)
            .await?;

        let mut ids: Vec<String> = feeds.into_iter().map(|f| f.external_id).collect();
        let fetched = ids.len();

        if self.config.queue.only_known_podcasts && !ids.is_empty() {
            let known = self.catalog.known_authority_ids(&ids).await?;
            ids.retain(|id| known.contains(id));
        }

        let mut report = CycleReport {
            fetched,
            eligible: ids.len(),
            ..Default::default()
        };

        if !ids.is_empty() {
            match self
                .dispatcher
                .enqueue_by_external_ids(&ids, PriorityClass::Urgent)
                .await
            {
                Ok(dispatch) => report.dispatch = Some(dispatch),
                Err(e) => {
                    warn!(count = ids.len(), error = %e, "dropping recently updated batch");
                    report.dropped = ids.len();
                }
            }
        }

        info!(
            fetched = report.fetched,
            eligible = report.eligible,
            dropped = report.dropped,
            "recently updated cycle finished"
        );
        Ok(report)
    }

    /// Run one bulk reconciliation over a dump file
    ///
    /// Per-record failures are counted in the returned report, never raised.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSource`](crate::Error::InvalidSource) if the
    /// dump cannot be opened or lacks required columns.
    pub async fn sync_from_dump(&self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let source = open_dump(path.as_ref()).await?;
        info!(path = %source.path().display(), "starting bulk reconciliation");
        Ok(self.ingestor.ingest(source).await)
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Catalog store shared by both paths
    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    /// Work queue consumed by downstream parsers
    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        self.dispatcher.queue()
    }

    /// Dispatcher used by both paths
    pub fn dispatcher(&self) -> &QueueDispatcher {
        &self.dispatcher
    }

    /// Reconciler used by the bulk path
    pub fn reconciler(&self) -> &AuthorityReconciler {
        &self.reconciler
    }

    /// Bulk ingestor, e.g. to feed records from another source
    pub fn ingestor(&self) -> &RecordIngestor {
        &self.ingestor
    }
}
