//! # podcast-sync
//!
//! Keeps an internal podcast catalog aligned with an external podcast
//! directory and feeds a prioritized work queue for downstream feed parsers.
//!
//! ## Two paths
//!
//! - **Recently updated** - poll the directory for feeds that changed in the
//!   last few minutes and enqueue them as [`PriorityClass::Urgent`] work.
//! - **Bulk reconciliation** - stream a full directory dump, make each
//!   podcast's current feed URL the single authority row in the catalog, and
//!   enqueue changed podcasts as [`PriorityClass::Bulk`] work.
//!
//! Pending work is keyed by external id, so a podcast is never queued twice,
//! and urgent work always drains before bulk work.
//!
//! ## Quick Start
//!
//! ```no_run
//! use podcast_sync::{Config, PodcastSync, run_until_signal};
//! use podcast_sync::sync_scheduler::RecentlyUpdatedScheduler;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let sync = Arc::new(PodcastSync::new(config).await?);
//!
//!     // One-off backfill from a dump
//!     let report = sync.sync_from_dump("podcasts.csv").await?;
//!     println!("changed {} podcasts", report.changed);
//!
//!     // Poll until SIGTERM / Ctrl+C
//!     run_until_signal(RecentlyUpdatedScheduler::from_config(sync)).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// External directory client
pub mod directory;
/// Error types
pub mod error;
/// Bulk dump ingestion
pub mod ingest;
/// Prioritized work queue
pub mod queue;
/// Record pacing with token bucket
pub mod rate_limiter;
/// Feed URL authority reconciliation
pub mod reconciler;
/// Catalog store contract
pub mod store;
/// Synchronization service
pub mod sync;
/// Periodic "recently updated" polling
pub mod sync_scheduler;
/// Core domain types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, QueueBackend};
pub use db::Database;
pub use directory::{DirectoryClient, MAX_RECENTLY_UPDATED};
pub use error::{
    DatabaseError, DirectoryFetchError, Error, QueueDispatchError, ReconciliationError,
    RecordParseError, Result,
};
pub use ingest::{DumpSource, RecordIngestor, open_dump};
pub use queue::{MemoryWorkQueue, QueueDispatcher, WorkQueue};
pub use rate_limiter::RateLimiter;
pub use reconciler::AuthorityReconciler;
pub use store::{CatalogStore, CatalogTransaction, MemoryCatalog};
pub use sync::PodcastSync;
pub use sync_scheduler::RecentlyUpdatedScheduler;
pub use types::{
    CycleReport, DispatchReport, FeedRecord, FeedUrl, IngestReport, Podcast, PriorityClass,
    RecentlyUpdatedFeed, ReconcileOutcome, WorkItem,
};

use tokio_util::sync::CancellationToken;

/// Run the scheduler until the process receives a termination signal.
///
/// The scheduler's in-flight cycle is abandoned when the signal arrives;
/// queued work and committed catalog changes are unaffected.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_until_signal(scheduler: RecentlyUpdatedScheduler) {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(cancel.clone()));

    wait_for_signal().await;
    cancel.cancel();

    if let Err(e) = handle.await {
        tracing::error!(error = %e, "scheduler task ended abnormally");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
