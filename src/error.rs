//! Error types for podcast-sync
//!
//! This module provides the error taxonomy for both synchronization paths:
//! - [`DirectoryFetchError`] - contacting the directory service (cycle-fatal)
//! - [`RecordParseError`] - a malformed bulk-dump row (per-record, recoverable)
//! - [`ReconciliationError`] - a store failure while reconciling one record (per-record)
//! - [`QueueDispatchError`] - an enqueue failure for one batch (per-batch)
//! - [`DatabaseError`] - persistence failures underneath the store contract
//!
//! Only [`Error::is_cycle_fatal`] errors should end a scheduled cycle; everything
//! else is logged and skipped by the component that encountered it.

use thiserror::Error;

/// Result type alias for podcast-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podcast-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "directory.auth_key")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// The directory service could not be reached or answered badly
    #[error("directory fetch error: {0}")]
    DirectoryFetch(#[from] DirectoryFetchError),

    /// A bulk-dump row could not be parsed
    #[error("record parse error: {0}")]
    RecordParse(#[from] RecordParseError),

    /// A store write failed while reconciling one record
    #[error("reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    /// A batch could not be handed to the work queue
    #[error("queue dispatch error: {0}")]
    QueueDispatch(#[from] QueueDispatchError),

    /// The bulk source cannot be used at all (missing file, missing columns)
    #[error("invalid bulk source: {0}")]
    InvalidSource(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error ends the current cycle instead of being skipped.
    ///
    /// Directory failures abort a "recently updated" cycle; configuration and
    /// bulk-source failures mean the cycle cannot start. Record, reconciliation
    /// and dispatch errors are per-item and must never stop a run.
    pub fn is_cycle_fatal(&self) -> bool {
        match self {
            Error::DirectoryFetch(_)
            | Error::Config { .. }
            | Error::InvalidSource(_)
            | Error::Database(_)
            | Error::Other(_) => true,

            Error::RecordParse(_) | Error::Reconciliation(_) | Error::QueueDispatch(_) => false,
        }
    }

    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::DirectoryFetch(e) => match e {
                DirectoryFetchError::InvalidBaseUrl(_) => "directory_invalid_url",
                DirectoryFetchError::Timeout { .. } => "directory_timeout",
                DirectoryFetchError::Request { .. } => "directory_request_failed",
                DirectoryFetchError::Status { .. } => "directory_bad_status",
                DirectoryFetchError::Decode(_) => "directory_bad_payload",
            },
            Error::RecordParse(_) => "record_parse_error",
            Error::Reconciliation(_) => "reconciliation_error",
            Error::QueueDispatch(e) => match e {
                QueueDispatchError::Full { .. } => "queue_full",
                QueueDispatchError::Backend(_) => "queue_backend_error",
            },
            Error::InvalidSource(_) => "invalid_source",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key, second authority row)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The transaction was already committed or rolled back
    #[error("transaction already finished")]
    TransactionClosed,
}

impl DatabaseError {
    /// Map a sqlx error into a query failure, keeping constraint violations distinct
    pub(crate) fn query(context: &str, error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &error
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return DatabaseError::ConstraintViolation(format!("{}: {}", context, error));
        }
        DatabaseError::QueryFailed(format!("{}: {}", context, error))
    }
}

/// Failures contacting the external directory service
///
/// Any of these aborts the current "recently updated" cycle; nothing partial
/// is returned to the caller.
#[derive(Debug, Error)]
pub enum DirectoryFetchError {
    /// The configured base URL cannot be turned into a request URL
    #[error("invalid directory base URL: {0}")]
    InvalidBaseUrl(String),

    /// The request did not complete within the configured timeout
    #[error("directory request to {url} timed out")]
    Timeout {
        /// The request URL (without credentials)
        url: String,
    },

    /// Connection, TLS, or protocol failure
    #[error("directory request to {url} failed: {source}")]
    Request {
        /// The request URL (without credentials)
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The directory answered with a non-success status
    #[error("directory returned HTTP {status} for {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// The request URL (without credentials)
        url: String,
    },

    /// The response body was not the expected JSON shape
    #[error("failed to decode directory response: {0}")]
    Decode(String),
}

impl DirectoryFetchError {
    /// Classify a reqwest error, surfacing timeouts separately
    pub(crate) fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DirectoryFetchError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_decode() {
            DirectoryFetchError::Decode(error.to_string())
        } else {
            DirectoryFetchError::Request {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// A bulk-source row that cannot become a feed record
#[derive(Debug, Error)]
pub struct RecordParseError {
    /// 1-based line number in the source, when known
    pub line: Option<u64>,
    /// What was wrong with the row
    pub reason: String,
}

impl std::fmt::Display for RecordParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.reason),
            None => write!(f, "unknown line: {}", self.reason),
        }
    }
}

impl RecordParseError {
    /// Create a parse error for a given line
    pub fn new(line: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// A store failure while reconciling a single record
///
/// The record's transaction is rolled back; other records are unaffected.
#[derive(Debug, Error)]
#[error("failed to reconcile podcast {external_id}: {source}")]
pub struct ReconciliationError {
    /// External id of the record being reconciled
    pub external_id: String,
    /// The store failure
    #[source]
    pub source: DatabaseError,
}

/// Failure handing a batch of identifiers to the work queue
///
/// The batch is dropped as a whole; catalog state is never affected.
#[derive(Debug, Error)]
pub enum QueueDispatchError {
    /// Accepting the batch would exceed the queue's capacity
    #[error("queue full: {pending} pending of {capacity}, batch needs {requested} more")]
    Full {
        /// Maximum number of pending items
        capacity: usize,
        /// Items pending before the batch
        pending: usize,
        /// New items the batch would add
        requested: usize,
    },

    /// The queue backend failed
    #[error("queue backend failed: {0}")]
    Backend(String),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, bool, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "missing key".into(),
                    key: Some("directory.auth_key".into()),
                },
                true,
                "config_error",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("boom".into())),
                true,
                "database_error",
            ),
            (
                Error::DirectoryFetch(DirectoryFetchError::Timeout {
                    url: "https://example.com".into(),
                }),
                true,
                "directory_timeout",
            ),
            (
                Error::DirectoryFetch(DirectoryFetchError::Status {
                    status: 401,
                    url: "https://example.com".into(),
                }),
                true,
                "directory_bad_status",
            ),
            (
                Error::DirectoryFetch(DirectoryFetchError::Decode("eof".into())),
                true,
                "directory_bad_payload",
            ),
            (
                Error::RecordParse(RecordParseError::new(Some(3), "missing url")),
                false,
                "record_parse_error",
            ),
            (
                Error::Reconciliation(ReconciliationError {
                    external_id: "123".into(),
                    source: DatabaseError::QueryFailed("disk full".into()),
                }),
                false,
                "reconciliation_error",
            ),
            (
                Error::QueueDispatch(QueueDispatchError::Full {
                    capacity: 10,
                    pending: 10,
                    requested: 1,
                }),
                false,
                "queue_full",
            ),
            (
                Error::QueueDispatch(QueueDispatchError::Backend("closed".into())),
                false,
                "queue_backend_error",
            ),
            (
                Error::InvalidSource("no url column".into()),
                true,
                "invalid_source",
            ),
            (
                Error::Other("dump reader task failed".into()),
                true,
                "internal_error",
            ),
        ]
    }

    #[test]
    fn only_directory_and_setup_errors_are_cycle_fatal() {
        for (error, fatal, _) in all_error_variants() {
            assert_eq!(
                error.is_cycle_fatal(),
                fatal,
                "unexpected fatality for {:?}",
                error
            );
        }
    }

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        for (error, _, code) in all_error_variants() {
            assert_eq!(error.error_code(), code, "wrong code for {:?}", error);
        }
    }

    #[test]
    fn record_parse_error_mentions_line() {
        let err = RecordParseError::new(Some(42), "missing url");
        assert_eq!(err.to_string(), "line 42: missing url");

        let err = RecordParseError::new(None, "bad utf-8");
        assert_eq!(err.to_string(), "unknown line: bad utf-8");
    }

    #[test]
    fn reconciliation_error_exposes_source() {
        use std::error::Error as _;

        let err = ReconciliationError {
            external_id: "999".into(),
            source: DatabaseError::ConstraintViolation("two authorities".into()),
        };

        assert!(err.to_string().contains("999"));
        assert!(err.source().is_some());
    }

    #[test]
    fn queue_full_reports_counts() {
        let err = QueueDispatchError::Full {
            capacity: 5,
            pending: 4,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "queue full: 4 pending of 5, batch needs 2 more"
        );
    }
}
