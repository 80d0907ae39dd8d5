//! Common test utilities for podcast-sync integration tests

#![allow(dead_code)]

use podcast_sync::{Config, PodcastSync, QueueBackend, WorkQueue};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration pointing at a mock directory and a catalog under `dir`
pub fn test_config(base_url: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.directory.base_url = base_url.to_string();
    config.directory.auth_key = "test-key".into();
    config.directory.secret_key = "test-secret".into();
    config.directory.request_timeout = Duration::from_secs(5);
    config.persistence.database_path = dir.join("catalog.db");
    config.queue.backend = QueueBackend::Database;
    config.ingest.records_per_second = 1000.0;
    config.ingest.burst = 1000;
    config
}

/// A sync service over a fresh SQLite catalog
pub async fn create_test_sync(server: &MockServer) -> (PodcastSync, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let sync = PodcastSync::new(test_config(&server.uri(), temp_dir.path()))
        .await
        .unwrap();
    (sync, temp_dir)
}

/// Mount a "recently updated" response listing `ids`
pub async fn mount_recently_updated(server: &MockServer, ids: &[&str]) {
    let feeds: Vec<_> = ids
        .iter()
        .map(|id| json!({ "itunesId": id, "language": "en", "lastUpdateTime": 1_700_000_000 }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/podcasts/updated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "feeds": feeds })))
        .mount(server)
        .await;
}

/// Write a dump with the given data rows under the standard header
pub fn write_dump(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,title,url,itunes_id").unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Pop every pending item as (external_id, priority name)
pub async fn drain(queue: &dyn WorkQueue) -> Vec<(String, &'static str)> {
    let mut out = Vec::new();
    while let Some(item) = queue.dequeue().await.unwrap() {
        out.push((item.external_id, item.priority.as_str()));
    }
    out
}
