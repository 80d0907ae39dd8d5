//! Catalog store contract
//!
//! The reconciler never issues queries directly. It talks to a
//! [`CatalogStore`], which hands out a [`CatalogTransaction`] per record so
//! the read-then-write sequence of a reconciliation runs atomically.
//!
//! ## Implementations
//!
//! - [`Database`](crate::db::Database): SQLite through sqlx
//! - [`MemoryCatalog`]: in-process fake with the same transactional behavior,
//!   used by tests and dry runs
//!
//! ## Usage
//!
//! ```
//! use podcast_sync::store::{CatalogStore, MemoryCatalog};
//! use podcast_sync::types::NewPodcast;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryCatalog::new();
//!
//! let mut tx = store.begin().await?;
//! let podcast = tx
//!     .create_podcast(NewPodcast {
//!         authority_id: "123",
//!         podcast_index_id: None,
//!         title: Some("Show A"),
//!         is_public: true,
//!     })
//!     .await?;
//! tx.insert_feed_url(&podcast.id, "http://a.com/feed", true).await?;
//! tx.commit().await?;
//!
//! assert_eq!(store.feed_urls().await.len(), 1);
//! # Ok(())
//! # }
//! ```

mod memory;
mod traits;

pub use memory::MemoryCatalog;
pub use traits::{CatalogStore, CatalogTransaction};
