use crate::db::*;
use crate::error::DatabaseError;
use crate::queue::WorkQueue;
use crate::store::CatalogStore;
use tempfile::NamedTempFile;

/// Verify that using the database after closing the pool returns an error
/// rather than hanging or panicking.
#[tokio::test]
async fn test_begin_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db.begin().await;
    assert!(
        matches!(result, Err(DatabaseError::QueryFailed(_))),
        "begin after pool close should fail"
    );
}

#[tokio::test]
async fn test_queue_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue("1", crate::types::PriorityClass::Bulk)
        .await
        .unwrap();
    db.pool().close().await;

    assert!(db.dequeue().await.is_err());
    assert!(db.pending_len().await.is_err());
}
