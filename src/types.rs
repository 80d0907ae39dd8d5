//! Core domain types shared by the directory, reconciliation and queue paths

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue service class for downstream parsing work
///
/// `Urgent` sorts above `Bulk`, so a max-heap pops urgent items first.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    /// Work discovered by bulk reconciliation (0)
    #[default]
    Bulk = 0,
    /// Work reported by the "recently updated" directory poll (1)
    Urgent = 1,
}

impl PriorityClass {
    /// Convert integer priority code to PriorityClass
    pub fn from_i32(priority: i32) -> Self {
        match priority {
            1 => PriorityClass::Urgent,
            _ => PriorityClass::Bulk,
        }
    }

    /// Integer code used for persistence
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Lowercase name, as used in logs and serialized config
    pub fn as_str(self) -> &'static str {
        match self {
            PriorityClass::Bulk => "bulk",
            PriorityClass::Urgent => "urgent",
        }
    }
}

/// A podcast in the internal catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Podcast {
    /// Internal identity
    pub id: String,
    /// External correlation key (the directory's iTunes id)
    pub authority_id: String,
    /// Directory-native id
    pub podcast_index_id: Option<String>,
    /// Display title
    pub title: Option<String>,
    /// Whether the podcast is publicly visible
    pub is_public: bool,
}

/// Fields for creating a podcast
#[derive(Clone, Copy, Debug)]
pub struct NewPodcast<'a> {
    /// External correlation key
    pub authority_id: &'a str,
    /// Directory-native id
    pub podcast_index_id: Option<&'a str>,
    /// Display title
    pub title: Option<&'a str>,
    /// Whether the podcast is publicly visible
    pub is_public: bool,
}

/// One feed URL a podcast has been published under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedUrl {
    /// Internal identity
    pub id: String,
    /// Owning podcast
    pub podcast_id: String,
    /// URL as received, compared verbatim
    pub url: String,
    /// Whether this is the podcast's current feed
    pub is_authority: bool,
}

/// A feed record to reconcile (transient)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedRecord {
    /// External id; records without one are not eligible for reconciliation
    pub external_id: Option<String>,
    /// Feed URL
    pub url: String,
    /// Podcast title
    pub title: Option<String>,
    /// Directory-native id
    pub directory_id: Option<String>,
}

impl FeedRecord {
    /// Create a record with an external id and url
    pub fn new(external_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the directory-native id
    #[must_use]
    pub fn with_directory_id(mut self, directory_id: impl Into<String>) -> Self {
        self.directory_id = Some(directory_id.into());
        self
    }

    /// External id if present and non-blank
    pub fn eligible_external_id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// A pending unit of parsing work (queue-resident)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// External id of the podcast to re-parse
    pub external_id: String,
    /// Service class
    pub priority: PriorityClass,
    /// When the item first became pending
    pub enqueued_at: DateTime<Utc>,
}

/// A directory entry that passed boundary validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecentlyUpdatedFeed {
    /// External id (iTunes id)
    pub external_id: String,
    /// Feed language; absence marks feeds the directory has not finished indexing
    pub language: String,
    /// When the directory last saw the feed change
    pub last_updated: Option<DateTime<Utc>>,
}

/// What a single reconciliation did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record had no external id; nothing was read or written
    Skipped,
    /// The record was applied inside one transaction
    Applied(AppliedChanges),
}

impl ReconcileOutcome {
    /// Whether any catalog state changed
    pub fn changed(&self) -> bool {
        match self {
            ReconcileOutcome::Skipped => false,
            ReconcileOutcome::Applied(changes) => changes.changed(),
        }
    }
}

/// Catalog changes made by one reconciliation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    /// Podcast the record was reconciled into
    pub podcast_id: String,
    /// Whether the podcast was created by this reconciliation
    pub podcast_created: bool,
    /// Id of the feed URL row inserted, if any
    pub inserted_feed_url: Option<String>,
    /// Existing rows that became authority
    pub promoted: usize,
    /// Existing rows that stopped being authority
    pub demoted: usize,
}

impl AppliedChanges {
    /// Whether any row was created or flipped
    pub fn changed(&self) -> bool {
        self.podcast_created
            || self.inserted_feed_url.is_some()
            || self.promoted > 0
            || self.demoted > 0
    }
}

/// Result of handing one batch to the work queue
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Distinct ids in the batch
    pub offered: usize,
    /// Ids that became new pending items
    pub enqueued: usize,
    /// Ids that already had a pending item at the same or higher class
    pub already_pending: usize,
    /// Pending bulk items raised to urgent
    pub promoted: usize,
}

impl DispatchReport {
    /// Add another batch's counts into this one
    pub fn merge(&mut self, other: &DispatchReport) {
        self.offered += other.offered;
        self.enqueued += other.enqueued;
        self.already_pending += other.already_pending;
        self.promoted += other.promoted;
    }
}

/// Counters for one bulk ingestion run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows pulled from the source (including malformed ones)
    pub processed: usize,
    /// Records whose reconciliation changed catalog state
    pub changed: usize,
    /// Records that were already reconciled
    pub unchanged: usize,
    /// Records without an external id
    pub skipped: usize,
    /// Malformed rows
    pub parse_failures: usize,
    /// Records whose reconciliation failed and was rolled back
    pub reconcile_failures: usize,
    /// Changed records handed to the queue as bulk work
    pub dispatched: usize,
    /// Changed records whose dispatch failed
    pub dispatch_failures: usize,
}

/// Result of one "recently updated" cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Unique eligible ids returned by the directory
    pub fetched: usize,
    /// Ids left after the optional known-podcast filter
    pub eligible: usize,
    /// Queue outcome, when dispatch succeeded
    pub dispatch: Option<DispatchReport>,
    /// Ids dropped because dispatch failed
    pub dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_sorts_above_bulk() {
        assert!(PriorityClass::Urgent > PriorityClass::Bulk);
        assert_eq!(PriorityClass::default(), PriorityClass::Bulk);
    }

    #[test]
    fn priority_round_trips_through_i32() {
        for class in [PriorityClass::Bulk, PriorityClass::Urgent] {
            assert_eq!(PriorityClass::from_i32(class.to_i32()), class);
        }
        assert_eq!(PriorityClass::from_i32(42), PriorityClass::Bulk);
    }

    #[test]
    fn blank_external_id_is_not_eligible() {
        let mut record = FeedRecord::new("  ", "http://a.com/feed");
        assert_eq!(record.eligible_external_id(), None);

        record.external_id = None;
        assert_eq!(record.eligible_external_id(), None);

        record.external_id = Some(" 123 ".into());
        assert_eq!(record.eligible_external_id(), Some("123"));
    }

    #[test]
    fn skipped_outcome_never_counts_as_change() {
        assert!(!ReconcileOutcome::Skipped.changed());
        assert!(!ReconcileOutcome::Applied(AppliedChanges::default()).changed());
        assert!(
            ReconcileOutcome::Applied(AppliedChanges {
                demoted: 1,
                ..Default::default()
            })
            .changed()
        );
    }
}
