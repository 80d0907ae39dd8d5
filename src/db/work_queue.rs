//! Durable work queue.
//!
//! Pending items live in `work_items`, one row per external id. The
//! autoincrement `seq` column fixes FIFO order within a priority class and
//! survives promotions, so a promoted item keeps its place among urgent work.

use crate::error::QueueDispatchError;
use crate::queue::WorkQueue;
use crate::types::{DispatchReport, PriorityClass, WorkItem};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::{Database, WorkItemRow};

fn backend(context: &str, error: sqlx::Error) -> QueueDispatchError {
    QueueDispatchError::Backend(format!("{}: {}", context, error))
}

#[async_trait]
impl WorkQueue for Database {
    async fn enqueue_batch(
        &self,
        external_ids: &[String],
        priority: PriorityClass,
    ) -> Result<DispatchReport, QueueDispatchError> {
        let mut seen = HashSet::new();
        let batch: Vec<&str> = external_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        // Current class of every id that is already pending
        let mut current: HashMap<&str, PriorityClass> = HashMap::new();
        for id in &batch {
            let existing: Option<i32> =
                sqlx::query_scalar("SELECT priority FROM work_items WHERE external_id = ?")
                    .bind(*id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| backend("Failed to look up work item", e))?;
            if let Some(code) = existing {
                current.insert(*id, PriorityClass::from_i32(code));
            }
        }

        let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_items")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| backend("Failed to count work items", e))?;
        let pending = usize::try_from(pending).unwrap_or(usize::MAX);
        let requested = batch.len() - current.len();

        if pending.saturating_add(requested) > self.queue_capacity {
            // dropping the transaction rolls it back
            return Err(QueueDispatchError::Full {
                capacity: self.queue_capacity,
                pending,
                requested,
            });
        }

        let now = chrono::Utc::now().timestamp();
        let mut report = DispatchReport {
            offered: batch.len(),
            ..Default::default()
        };

        for id in &batch {
            match current.get(id) {
                Some(existing) if *existing >= priority => report.already_pending += 1,
                Some(_) => {
                    sqlx::query("UPDATE work_items SET priority = ? WHERE external_id = ?")
                        .bind(priority.to_i32())
                        .bind(*id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| backend("Failed to promote work item", e))?;
                    report.promoted += 1;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO work_items (external_id, priority, enqueued_at) VALUES (?, ?, ?)",
                    )
                    .bind(*id)
                    .bind(priority.to_i32())
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| backend("Failed to insert work item", e))?;
                    report.enqueued += 1;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| backend("Failed to commit work items", e))?;

        Ok(report)
    }

    async fn dequeue(&self) -> Result<Option<WorkItem>, QueueDispatchError> {
        let row = sqlx::query_as::<_, WorkItemRow>(
            r#"
            DELETE FROM work_items
            WHERE seq = (
                SELECT seq FROM work_items
                ORDER BY priority DESC, seq ASC
                LIMIT 1
            )
            RETURNING external_id, priority, enqueued_at
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("Failed to dequeue work item", e))?;

        Ok(row.map(WorkItem::from))
    }

    async fn pending_len(&self) -> Result<usize, QueueDispatchError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend("Failed to count work items", e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
