//! Work queue contract and dispatch
//!
//! Downstream parsers consume [`WorkItem`]s from a shared [`WorkQueue`]. The
//! queue holds at most one pending item per external id; offering an id that
//! is already pending never creates a second entry, and offering it at a
//! higher class promotes the pending item instead. Consumers always receive
//! `urgent` work before `bulk` work, oldest first inside a class.
//!
//! [`QueueDispatcher`] is the only writer used by the sync paths. It cleans up
//! a batch of ids and hands it to the queue in one call, so a failure drops
//! the whole batch and nothing else.

mod memory;

pub use memory::MemoryWorkQueue;

use crate::error::QueueDispatchError;
use crate::types::{DispatchReport, PriorityClass, WorkItem};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Deduplicating priority queue of parsing work
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Offer a batch of ids at one priority class
    ///
    /// The batch is applied atomically: either every id is accepted (as a new
    /// item, an already-pending item, or a promotion) or none is.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDispatchError::Full`] if the new items would exceed the
    /// queue's capacity, or [`QueueDispatchError::Backend`] on storage failure.
    async fn enqueue_batch(
        &self,
        external_ids: &[String],
        priority: PriorityClass,
    ) -> Result<DispatchReport, QueueDispatchError>;

    /// Offer a single id
    async fn enqueue(
        &self,
        external_id: &str,
        priority: PriorityClass,
    ) -> Result<DispatchReport, QueueDispatchError> {
        self.enqueue_batch(&[external_id.to_string()], priority)
            .await
    }

    /// Take the next item: highest class first, oldest first within a class
    async fn dequeue(&self) -> Result<Option<WorkItem>, QueueDispatchError>;

    /// Number of pending items
    async fn pending_len(&self) -> Result<usize, QueueDispatchError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Trim ids, drop blanks, and remove repeats keeping first-occurrence order
pub fn normalize_batch<S: AsRef<str>>(external_ids: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    external_ids
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Hands batches of external ids to the work queue
#[derive(Clone)]
pub struct QueueDispatcher {
    queue: Arc<dyn WorkQueue>,
}

impl QueueDispatcher {
    /// Create a dispatcher over a queue
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self { queue }
    }

    /// The underlying queue, for consumers
    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    /// Enqueue one work item per distinct id
    ///
    /// An empty batch (after cleanup) succeeds without touching the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDispatchError`] if the queue rejects the batch. The
    /// batch is then dropped; callers retry on their next cycle.
    pub async fn enqueue_by_external_ids<S: AsRef<str> + Sync>(
        &self,
        external_ids: &[S],
        priority: PriorityClass,
    ) -> Result<DispatchReport, QueueDispatchError> {
        let batch = normalize_batch(external_ids);
        if batch.is_empty() {
            debug!(priority = priority.as_str(), "nothing to dispatch");
            return Ok(DispatchReport::default());
        }

        let report = self.queue.enqueue_batch(&batch, priority).await?;
        info!(
            queue = self.queue.name(),
            priority = priority.as_str(),
            offered = report.offered,
            enqueued = report.enqueued,
            already_pending = report.already_pending,
            promoted = report.promoted,
            "dispatched work batch"
        );
        Ok(report)
    }
}
