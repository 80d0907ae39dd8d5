//! Bulk ingestion of feed records
//!
//! [`RecordIngestor`] drains a record stream (usually a [`DumpSource`]) one
//! record at a time: it waits for the rate limiter, reconciles the record,
//! and optionally hands changed podcasts to the work queue as bulk work.
//! Malformed rows, failed reconciliations and failed dispatches are logged,
//! counted and skipped; the run always continues to the end of the stream.
//!
//! There is no checkpointing. An interrupted run is restarted from the top,
//! which is safe because reconciliation is idempotent.

mod source;

pub use source::{DumpSource, REQUIRED_COLUMNS, open_dump};

use crate::error::RecordParseError;
use crate::queue::QueueDispatcher;
use crate::rate_limiter::RateLimiter;
use crate::reconciler::AuthorityReconciler;
use crate::types::{FeedRecord, IngestReport, PriorityClass, ReconcileOutcome};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

/// Paced, fault-isolating driver for the bulk reconciliation path
#[derive(Clone)]
pub struct RecordIngestor {
    reconciler: AuthorityReconciler,
    limiter: RateLimiter,
    dispatcher: Option<QueueDispatcher>,
}

impl RecordIngestor {
    /// Create an ingestor that only reconciles
    pub fn new(reconciler: AuthorityReconciler, limiter: RateLimiter) -> Self {
        Self {
            reconciler,
            limiter,
            dispatcher: None,
        }
    }

    /// Also enqueue every podcast whose reconciliation changed state
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: QueueDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// The pacing limiter, e.g. to retune a running backfill
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Process every record of `records` in order
    ///
    /// Each item, including malformed ones, takes one token from the rate
    /// limiter before it is handled.
    pub async fn ingest<S>(&self, records: S) -> IngestReport
    where
        S: Stream<Item = Result<FeedRecord, RecordParseError>> + Send,
    {
        let mut records = std::pin::pin!(records);
        let mut report = IngestReport::default();

        while let Some(item) = records.next().await {
            self.limiter.acquire().await;
            report.processed += 1;

            match item {
                Ok(record) => self.process(&record, &mut report).await,
                Err(e) => {
                    warn!(line = ?e.line, error = %e.reason, "skipping malformed record");
                    report.parse_failures += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            changed = report.changed,
            unchanged = report.unchanged,
            skipped = report.skipped,
            parse_failures = report.parse_failures,
            reconcile_failures = report.reconcile_failures,
            dispatched = report.dispatched,
            dispatch_failures = report.dispatch_failures,
            "bulk ingestion finished"
        );
        report
    }

    /// Reconcile one record and count the result
    ///
    /// Never fails: errors are logged and recorded in `report`.
    pub async fn process(&self, record: &FeedRecord, report: &mut IngestReport) {
        let outcome = match self.reconciler.reconcile(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(external_id = %e.external_id, url = %record.url, error = %e, "reconciliation failed");
                report.reconcile_failures += 1;
                return;
            }
        };

        if !outcome.changed() {
            match outcome {
                ReconcileOutcome::Skipped => report.skipped += 1,
                ReconcileOutcome::Applied(_) => report.unchanged += 1,
            }
            return;
        }
        report.changed += 1;

        let (Some(dispatcher), Some(external_id)) =
            (&self.dispatcher, record.eligible_external_id())
        else {
            return;
        };

        match dispatcher
            .enqueue_by_external_ids(&[external_id], PriorityClass::Bulk)
            .await
        {
            Ok(_) => report.dispatched += 1,
            Err(e) => {
                warn!(external_id, error = %e, "dropping bulk work item");
                report.dispatch_failures += 1;
            }
        }
    }
}
