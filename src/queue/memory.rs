//! In-process work queue

use super::WorkQueue;
use crate::error::QueueDispatchError;
use crate::types::{DispatchReport, PriorityClass, WorkItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Heap entry; may be stale after a promotion
#[derive(Debug, Clone, Eq, PartialEq)]
struct QueuedItem {
    external_id: String,
    priority: PriorityClass,
    seq: u64,
}

// Max-heap: higher class first, then lower sequence (FIFO)
impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct Pending {
    priority: PriorityClass,
    seq: u64,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedItem>,
    pending: HashMap<String, Pending>,
    next_seq: u64,
}

impl QueueState {
    fn is_live(&self, item: &QueuedItem) -> bool {
        self.pending
            .get(&item.external_id)
            .is_some_and(|p| p.seq == item.seq && p.priority == item.priority)
    }
}

/// Bounded in-process queue backed by a [`BinaryHeap`]
///
/// Promotions push a second heap entry for the same id; the superseded entry
/// is recognised as stale and skipped when it reaches the top.
#[derive(Clone)]
pub struct MemoryWorkQueue {
    state: Arc<Mutex<QueueState>>,
    capacity: usize,
}

impl MemoryWorkQueue {
    /// Create a queue holding at most `capacity` pending items
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            capacity,
        }
    }

    /// Maximum number of pending items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending items in dequeue order, without removing them
    pub async fn snapshot(&self) -> Vec<WorkItem> {
        let state = self.state.lock().await;
        let mut items: Vec<&QueuedItem> = state
            .heap
            .iter()
            .filter(|item| state.is_live(item))
            .collect();
        items.sort_by(|a, b| b.cmp(a));
        items
            .into_iter()
            .filter_map(|item| {
                state.pending.get(&item.external_id).map(|p| WorkItem {
                    external_id: item.external_id.clone(),
                    priority: p.priority,
                    enqueued_at: p.enqueued_at,
                })
            })
            .collect()
    }
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue_batch(
        &self,
        external_ids: &[String],
        priority: PriorityClass,
    ) -> Result<DispatchReport, QueueDispatchError> {
        let mut state = self.state.lock().await;

        let mut seen = HashSet::with_capacity(external_ids.len());
        let batch: Vec<&str> = external_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let new_items = batch
            .iter()
            .filter(|id| !state.pending.contains_key(**id))
            .count();
        let pending = state.pending.len();
        if pending.saturating_add(new_items) > self.capacity {
            return Err(QueueDispatchError::Full {
                capacity: self.capacity,
                pending,
                requested: new_items,
            });
        }

        let now = Utc::now();
        let mut report = DispatchReport {
            offered: batch.len(),
            ..Default::default()
        };

        for id in batch {
            let existing = state.pending.get(id).cloned();
            match existing {
                Some(current) if current.priority >= priority => {
                    report.already_pending += 1;
                }
                Some(current) => {
                    state.pending.insert(
                        id.to_string(),
                        Pending {
                            priority,
                            ..current.clone()
                        },
                    );
                    state.heap.push(QueuedItem {
                        external_id: id.to_string(),
                        priority,
                        seq: current.seq,
                    });
                    report.promoted += 1;
                }
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.pending.insert(
                        id.to_string(),
                        Pending {
                            priority,
                            seq,
                            enqueued_at: now,
                        },
                    );
                    state.heap.push(QueuedItem {
                        external_id: id.to_string(),
                        priority,
                        seq,
                    });
                    report.enqueued += 1;
                }
            }
        }

        Ok(report)
    }

    async fn dequeue(&self) -> Result<Option<WorkItem>, QueueDispatchError> {
        let mut state = self.state.lock().await;
        while let Some(item) = state.heap.pop() {
            if !state.is_live(&item) {
                continue;
            }
            if let Some(pending) = state.pending.remove(&item.external_id) {
                return Ok(Some(WorkItem {
                    external_id: item.external_id,
                    priority: pending.priority,
                    enqueued_at: pending.enqueued_at,
                }));
            }
        }
        Ok(None)
    }

    async fn pending_len(&self) -> Result<usize, QueueDispatchError> {
        Ok(self.state.lock().await.pending.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
