//! Streaming reader for bulk feed dumps
//!
//! A dump is a CSV file with at least the columns `id`, `title`, `url` and
//! `itunes_id`. Rows are parsed on a blocking thread and passed through a
//! bounded channel, so a slow consumer (the paced ingestor) holds back the
//! reader instead of buffering the whole file.

use crate::error::{Error, RecordParseError, Result};
use crate::types::FeedRecord;
use csv::{ReaderBuilder, StringRecord, Trim};
use futures::Stream;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Columns every dump must have
pub const REQUIRED_COLUMNS: [&str; 4] = ["id", "title", "url", "itunes_id"];

/// Rows parsed ahead of the consumer
const READ_AHEAD: usize = 64;

/// One dump row as written by the directory
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DumpRow {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    itunes_id: Option<String>,
}

/// Lazy, finite, non-restartable stream of dump rows
///
/// Created by [`open_dump`]. Dropping the stream stops the reader thread at
/// its next row.
pub struct DumpSource {
    path: PathBuf,
    rows: ReceiverStream<std::result::Result<FeedRecord, RecordParseError>>,
}

impl DumpSource {
    /// Path of the dump being read
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DumpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Stream for DumpSource {
    type Item = std::result::Result<FeedRecord, RecordParseError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rows).poll_next(cx)
    }
}

/// Open a dump and start streaming its rows
///
/// # Errors
///
/// Returns [`Error::InvalidSource`] if the file cannot be opened, has no
/// readable header row, or lacks one of [`REQUIRED_COLUMNS`].
pub async fn open_dump(path: impl AsRef<Path>) -> Result<DumpSource> {
    let path = path.as_ref().to_path_buf();

    let (reader, headers) = tokio::task::spawn_blocking({
        let path = path.clone();
        move || open_reader(&path)
    })
    .await
    .map_err(|e| Error::Other(format!("dump reader task failed: {}", e)))??;

    let (tx, rx) = mpsc::channel(READ_AHEAD);
    let reader_path = path.clone();
    tokio::task::spawn_blocking(move || read_rows(reader, &headers, &tx, &reader_path));

    debug!(path = %path.display(), "opened feed dump");
    Ok(DumpSource {
        path,
        rows: ReceiverStream::new(rx),
    })
}

fn open_reader(path: &Path) -> Result<(csv::Reader<File>, StringRecord)> {
    let invalid = |e: csv::Error| Error::InvalidSource(format!("{}: {}", path.display(), e));

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(invalid)?;
    let headers = reader.headers().map_err(invalid)?.clone();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidSource(format!(
            "{}: missing columns {}",
            path.display(),
            missing.join(", ")
        )));
    }

    Ok((reader, headers))
}

fn read_rows(
    mut reader: csv::Reader<File>,
    headers: &StringRecord,
    tx: &mpsc::Sender<std::result::Result<FeedRecord, RecordParseError>>,
    path: &Path,
) {
    let mut record = StringRecord::new();
    loop {
        let (item, last) = match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => (to_feed_record(&record, headers), false),
            Err(e) => {
                let line = e.position().map(|p| p.line());
                let last = matches!(e.kind(), csv::ErrorKind::Io(_));
                if last {
                    warn!(path = %path.display(), error = %e, "dump read failed, ending stream");
                }
                (Err(RecordParseError::new(line, e.to_string())), last)
            }
        };

        if tx.blocking_send(item).is_err() {
            debug!(path = %path.display(), "dump consumer went away");
            break;
        }
        if last {
            break;
        }
    }
}

fn to_feed_record(
    record: &StringRecord,
    headers: &StringRecord,
) -> std::result::Result<FeedRecord, RecordParseError> {
    let line = record.position().map(|p| p.line());
    let row: DumpRow = record
        .deserialize(Some(headers))
        .map_err(|e| RecordParseError::new(line, e.to_string()))?;

    let url = non_blank(row.url).ok_or_else(|| RecordParseError::new(line, "missing url"))?;

    Ok(FeedRecord {
        external_id: non_blank(row.itunes_id),
        url,
        title: non_blank(row.title),
        directory_id: non_blank(row.id),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
