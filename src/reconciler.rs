//! Authority reconciliation for feed records
//!
//! Given one [`FeedRecord`], the [`AuthorityReconciler`] makes sure the
//! matching [`Podcast`](crate::types::Podcast) exists and that exactly one of
//! its feed URLs, the record's, is flagged as authority. Everything for one
//! record happens inside a single store transaction:
//!
//! 1. Records without an external id are skipped without touching the store.
//! 2. The podcast is looked up by external id and created if missing.
//! 3. The podcast's feed URLs are loaded and an [`AuthorityPlan`] is computed.
//! 4. Demotions are written first, then the promotion or insert, so the
//!    single-authority constraint holds after every statement.
//!
//! Only rows whose flag actually changes are written, which makes a repeated
//! reconciliation of the same record a no-op.

use crate::error::{DatabaseError, ReconciliationError};
use crate::store::{CatalogStore, CatalogTransaction};
use crate::types::{AppliedChanges, FeedRecord, FeedUrl, NewPodcast, ReconcileOutcome};
use crate::utils::same_feed_location;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Flag changes needed to make one URL a podcast's sole authority
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorityPlan {
    /// Rows currently flagged as authority that must lose the flag
    pub demote: Vec<String>,
    /// Existing row with the exact URL that must gain the flag
    pub promote: Option<String>,
    /// Whether no row has the exact URL and one must be inserted as authority
    pub insert: bool,
    /// Rows that differ from the URL only by scheme
    pub scheme_variants: Vec<String>,
}

impl AuthorityPlan {
    /// Whether applying the plan writes anything
    pub fn is_noop(&self) -> bool {
        self.demote.is_empty() && self.promote.is_none() && !self.insert
    }
}

/// Compute the authority changes for making `url` the current feed
///
/// The row whose URL equals `url` exactly is the winner. Every other row
/// flagged as authority is demoted, including rows that only differ by
/// scheme (`http` vs `https`); those are reported in `scheme_variants` since
/// they usually mean the publisher moved protocols. With no exact match a
/// new authority row is inserted.
///
/// # Examples
///
/// ```
/// use podcast_sync::reconciler::plan_authority;
/// use podcast_sync::types::FeedUrl;
///
/// let existing = vec![FeedUrl {
///     id: "f1".into(),
///     podcast_id: "p1".into(),
///     url: "http://a.com/feed".into(),
///     is_authority: true,
/// }];
///
/// let plan = plan_authority(&existing, "http://b.com/feed");
/// assert_eq!(plan.demote, vec!["f1".to_string()]);
/// assert!(plan.insert);
///
/// assert!(plan_authority(&existing, "http://a.com/feed").is_noop());
/// ```
pub fn plan_authority(existing: &[FeedUrl], url: &str) -> AuthorityPlan {
    let winner = existing.iter().find(|row| row.url == url);
    let is_winner = |row: &FeedUrl| winner.is_some_and(|w| w.id == row.id);

    AuthorityPlan {
        demote: existing
            .iter()
            .filter(|row| row.is_authority && !is_winner(*row))
            .map(|row| row.id.clone())
            .collect(),
        promote: winner.filter(|w| !w.is_authority).map(|w| w.id.clone()),
        insert: winner.is_none(),
        scheme_variants: existing
            .iter()
            .filter(|row| !is_winner(*row) && same_feed_location(&row.url, url))
            .map(|row| row.id.clone())
            .collect(),
    }
}

/// Applies feed records to the catalog, one transaction per record
#[derive(Clone)]
pub struct AuthorityReconciler {
    store: Arc<dyn CatalogStore>,
}

impl AuthorityReconciler {
    /// Create a reconciler over a catalog store
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// The underlying catalog store
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Reconcile one record
    ///
    /// Returns [`ReconcileOutcome::Skipped`] for records without an external
    /// id or URL. On any store failure the transaction is rolled back, so a
    /// failed reconciliation leaves no partial state behind.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError`] carrying the record's external id when
    /// the store fails to begin, write, or commit.
    pub async fn reconcile(
        &self,
        record: &FeedRecord,
    ) -> Result<ReconcileOutcome, ReconciliationError> {
        let Some(external_id) = record.eligible_external_id() else {
            debug!(url = %record.url, "skipping record without external id");
            return Ok(ReconcileOutcome::Skipped);
        };
        if record.url.trim().is_empty() {
            debug!(external_id, "skipping record without feed URL");
            return Ok(ReconcileOutcome::Skipped);
        }

        let fail = |source: DatabaseError| ReconciliationError {
            external_id: external_id.to_string(),
            source,
        };

        let mut tx = self.store.begin().await.map_err(fail)?;

        match apply(tx.as_mut(), external_id, record).await {
            Ok(changes) => {
                tx.commit().await.map_err(fail)?;
                if changes.changed() {
                    info!(
                        external_id,
                        podcast_id = %changes.podcast_id,
                        created = changes.podcast_created,
                        inserted = changes.inserted_feed_url.is_some(),
                        promoted = changes.promoted,
                        demoted = changes.demoted,
                        "reconciled feed authority"
                    );
                } else {
                    debug!(external_id, "feed authority already current");
                }
                Ok(ReconcileOutcome::Applied(changes))
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(external_id, error = %rollback_err, "rollback failed");
                }
                Err(fail(e))
            }
        }
    }
}

async fn apply(
    tx: &mut dyn CatalogTransaction,
    external_id: &str,
    record: &FeedRecord,
) -> Result<AppliedChanges, DatabaseError> {
    let (podcast, podcast_created) = match tx.find_podcast_by_authority_id(external_id).await? {
        Some(podcast) => (podcast, false),
        None => {
            let podcast = tx
                .create_podcast(NewPodcast {
                    authority_id: external_id,
                    podcast_index_id: record.directory_id.as_deref(),
                    title: record.title.as_deref(),
                    is_public: true,
                })
                .await?;
            (podcast, true)
        }
    };

    let existing = tx.list_feed_urls(&podcast.id).await?;
    let plan = plan_authority(&existing, &record.url);

    if !plan.scheme_variants.is_empty() {
        debug!(
            external_id,
            url = %record.url,
            variants = plan.scheme_variants.len(),
            "feed URL differs from existing rows only by scheme"
        );
    }

    for id in &plan.demote {
        tx.set_feed_url_authority(id, false).await?;
    }

    if let Some(id) = &plan.promote {
        tx.set_feed_url_authority(id, true).await?;
    }

    let inserted_feed_url = if plan.insert {
        Some(tx.insert_feed_url(&podcast.id, &record.url, true).await?.id)
    } else {
        None
    };

    Ok(AppliedChanges {
        podcast_id: podcast.id,
        podcast_created,
        inserted_feed_url,
        promoted: usize::from(plan.promote.is_some()),
        demoted: plan.demote.len(),
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalog;
    use crate::types::Podcast;

    fn row(id: &str, url: &str, is_authority: bool) -> FeedUrl {
        FeedUrl {
            id: id.into(),
            podcast_id: "p1".into(),
            url: url.into(),
            is_authority,
        }
    }

    fn reconciler() -> (MemoryCatalog, AuthorityReconciler) {
        let store = MemoryCatalog::new();
        let reconciler = AuthorityReconciler::new(Arc::new(store.clone()));
        (store, reconciler)
    }

    async fn only_podcast(store: &MemoryCatalog) -> Podcast {
        let podcasts = store.podcasts().await;
        assert_eq!(podcasts.len(), 1);
        podcasts.into_iter().next().unwrap()
    }

    #[test]
    fn plan_inserts_into_empty_podcast() {
        let plan = plan_authority(&[], "http://a.com/feed");
        assert!(plan.insert);
        assert!(plan.demote.is_empty());
        assert_eq!(plan.promote, None);
    }

    #[test]
    fn plan_promotes_exact_match_and_demotes_current() {
        let existing = vec![
            row("f1", "http://a.com/feed", false),
            row("f2", "http://b.com/feed", true),
        ];
        let plan = plan_authority(&existing, "http://a.com/feed");
        assert_eq!(plan.demote, vec!["f2".to_string()]);
        assert_eq!(plan.promote, Some("f1".to_string()));
        assert!(!plan.insert);
    }

    #[test]
    fn plan_compares_everything_but_scheme_verbatim() {
        let existing = vec![row("f1", "http://a.com/feed", true)];

        let plan = plan_authority(&existing, "http://a.com/feed/");
        assert!(plan.insert);
        assert!(plan.scheme_variants.is_empty());

        let plan = plan_authority(&existing, "http://A.com/feed");
        assert!(plan.insert);

        let plan = plan_authority(&existing, "https://a.com/feed");
        assert!(plan.insert);
        assert_eq!(plan.demote, vec!["f1".to_string()]);
        assert_eq!(plan.scheme_variants, vec!["f1".to_string()]);
    }

    #[test]
    fn plan_demotes_every_stray_authority() {
        let existing = vec![
            row("f1", "http://a.com/feed", true),
            row("f2", "http://b.com/feed", true),
            row("f3", "http://c.com/feed", true),
        ];
        let plan = plan_authority(&existing, "http://b.com/feed");
        assert_eq!(plan.demote, vec!["f1".to_string(), "f3".to_string()]);
        assert_eq!(plan.promote, None);
        assert!(!plan.insert);
    }

    #[tokio::test]
    async fn new_record_creates_podcast_and_authority_url() {
        let (store, reconciler) = reconciler();
        let record = FeedRecord::new("123", "http://a.com/feed").with_title("Show A");

        let outcome = reconciler.reconcile(&record).await.unwrap();
        assert!(outcome.changed());

        let podcast = only_podcast(&store).await;
        assert_eq!(podcast.authority_id, "123");
        assert_eq!(podcast.title.as_deref(), Some("Show A"));
        assert!(podcast.is_public);

        let urls = store.feed_urls().await;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].url, "http://a.com/feed");
        assert!(urls[0].is_authority);
    }

    #[tokio::test]
    async fn changed_url_moves_authority_to_new_row() {
        let (store, reconciler) = reconciler();
        reconciler
            .reconcile(&FeedRecord::new("123", "http://a.com/feed"))
            .await
            .unwrap();

        let outcome = reconciler
            .reconcile(&FeedRecord::new("123", "http://b.com/feed"))
            .await
            .unwrap();

        let ReconcileOutcome::Applied(changes) = outcome else {
            panic!("expected applied outcome");
        };
        assert!(!changes.podcast_created);
        assert_eq!(changes.demoted, 1);
        assert!(changes.inserted_feed_url.is_some());

        let urls = store.feed_urls().await;
        assert_eq!(urls.len(), 2);
        let a = urls.iter().find(|u| u.url == "http://a.com/feed").unwrap();
        let b = urls.iter().find(|u| u.url == "http://b.com/feed").unwrap();
        assert!(!a.is_authority);
        assert!(b.is_authority);
    }

    #[tokio::test]
    async fn record_without_external_id_touches_nothing() {
        let (store, reconciler) = reconciler();
        let record = FeedRecord {
            external_id: None,
            url: "http://a.com/feed".into(),
            ..Default::default()
        };

        let outcome = reconciler.reconcile(&record).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Skipped);
        assert!(store.podcasts().await.is_empty());
        assert!(store.feed_urls().await.is_empty());
    }

    #[tokio::test]
    async fn reconciling_twice_changes_nothing_the_second_time() {
        let (store, reconciler) = reconciler();
        let record = FeedRecord::new("123", "http://a.com/feed");

        assert!(reconciler.reconcile(&record).await.unwrap().changed());
        let after_first = store.feed_urls().await;

        assert!(!reconciler.reconcile(&record).await.unwrap().changed());
        assert_eq!(store.feed_urls().await, after_first);
        assert_eq!(store.podcasts().await.len(), 1);
    }

    #[tokio::test]
    async fn any_sequence_leaves_exactly_one_authority() {
        let (store, reconciler) = reconciler();
        let urls = [
            "http://a.com/feed",
            "http://b.com/feed",
            "https://b.com/feed",
            "http://a.com/feed",
            "http://c.com/feed",
            "http://b.com/feed",
            "http://b.com/feed",
        ];

        for url in urls {
            reconciler
                .reconcile(&FeedRecord::new("42", url))
                .await
                .unwrap();

            let podcast = only_podcast(&store).await;
            let authorities = store.authorities(&podcast.id).await;
            assert_eq!(authorities.len(), 1, "after reconciling {}", url);
            assert_eq!(authorities[0].url, url);
        }

        // one row per distinct URL, never duplicated
        assert_eq!(store.feed_urls().await.len(), 4);
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_demotion() {
        let (store, reconciler) = reconciler();
        reconciler
            .reconcile(&FeedRecord::new("123", "http://a.com/feed"))
            .await
            .unwrap();
        store.fail_inserts_for("http://b.com/feed").await;

        let err = reconciler
            .reconcile(&FeedRecord::new("123", "http://b.com/feed"))
            .await
            .unwrap_err();
        assert_eq!(err.external_id, "123");

        let podcast = only_podcast(&store).await;
        let authorities = store.authorities(&podcast.id).await;
        assert_eq!(authorities.len(), 1);
        assert_eq!(authorities[0].url, "http://a.com/feed");

        // other records are unaffected
        reconciler
            .reconcile(&FeedRecord::new("456", "http://c.com/feed"))
            .await
            .unwrap();
        assert_eq!(store.podcasts().await.len(), 2);
    }

    #[tokio::test]
    async fn legacy_double_authority_is_repaired() {
        let (store, reconciler) = reconciler();
        store
            .seed(
                Podcast {
                    id: "p1".into(),
                    authority_id: "7".into(),
                    podcast_index_id: None,
                    title: None,
                    is_public: true,
                },
                vec![
                    row("f1", "http://a.com/feed", true),
                    row("f2", "http://b.com/feed", true),
                ],
            )
            .await;

        let outcome = reconciler
            .reconcile(&FeedRecord::new("7", "http://b.com/feed"))
            .await
            .unwrap();
        assert!(outcome.changed());

        let authorities = store.authorities("p1").await;
        assert_eq!(authorities.len(), 1);
        assert_eq!(authorities[0].id, "f2");
    }

    #[tokio::test]
    async fn concurrent_reconciliations_keep_single_authority() {
        let (store, reconciler) = reconciler();
        let mut handles = Vec::new();
        for i in 0..16 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler
                    .reconcile(&FeedRecord::new("9", format!("http://host{}.com/feed", i % 4)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let podcast = only_podcast(&store).await;
        assert_eq!(store.authorities(&podcast.id).await.len(), 1);
        assert_eq!(store.feed_urls().await.len(), 4);
    }
}
