//! Dump backfill example
//!
//! Reconciles every row of a directory dump into the catalog and prints the
//! run's counters. No directory credentials are needed.
//!
//! ```bash
//! INGEST_RECORDS_PER_SECOND=50 cargo run --example dump_backfill -- podcasts.csv
//! ```

use podcast_sync::{Config, PodcastSync};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: dump_backfill <dump.csv>");
        std::process::exit(2);
    };

    let sync = PodcastSync::for_backfill(Config::from_env()?).await?;
    let report = sync.sync_from_dump(&path).await?;

    println!("Processed:          {}", report.processed);
    println!("Changed:            {}", report.changed);
    println!("Unchanged:          {}", report.unchanged);
    println!("Skipped (no id):    {}", report.skipped);
    println!("Malformed rows:     {}", report.parse_failures);
    println!("Reconcile failures: {}", report.reconcile_failures);
    println!("Dispatched:         {}", report.dispatched);
    println!("Dispatch failures:  {}", report.dispatch_failures);
    Ok(())
}
