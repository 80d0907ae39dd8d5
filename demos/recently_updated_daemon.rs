//! Recently updated daemon example
//!
//! Polls the directory on the configured interval and enqueues changed
//! feeds as urgent work until SIGTERM or Ctrl+C.
//!
//! Credentials come from the environment:
//!
//! ```bash
//! PODCAST_INDEX_AUTH_KEY=... PODCAST_INDEX_SECRET_KEY=... \
//! RUST_LOG=podcast_sync=debug cargo run --example recently_updated_daemon
//! ```

use podcast_sync::{Config, PodcastSync, RecentlyUpdatedScheduler, run_until_signal};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let sync = Arc::new(PodcastSync::new(config).await?);

    println!(
        "Polling every {:?} (queue: {})",
        sync.config().schedule.recently_updated_interval,
        sync.queue().name()
    );

    run_until_signal(RecentlyUpdatedScheduler::from_config(sync.clone())).await;

    println!("Pending work items: {}", sync.queue().pending_len().await?);
    Ok(())
}
