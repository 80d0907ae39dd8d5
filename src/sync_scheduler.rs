//! Periodic "recently updated" polling
//!
//! [`RecentlyUpdatedScheduler`] runs [`PodcastSync::sync_recently_updated`]
//! on a fixed interval until its cancellation token fires. A failed cycle is
//! logged and the next one runs on schedule; nothing is retried in between.
//!
//! # Example
//!
//! ```no_run
//! use podcast_sync::{Config, PodcastSync};
//! use podcast_sync::sync_scheduler::RecentlyUpdatedScheduler;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sync = Arc::new(PodcastSync::new(Config::from_env()?).await?);
//! let scheduler = RecentlyUpdatedScheduler::from_config(sync);
//!
//! let cancel = CancellationToken::new();
//! let handle = tokio::spawn(scheduler.run(cancel.clone()));
//!
//! // later
//! cancel.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

use crate::sync::PodcastSync;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the "recently updated" cycle on a fixed interval
pub struct RecentlyUpdatedScheduler {
    sync: Arc<PodcastSync>,
    interval: Duration,
}

impl RecentlyUpdatedScheduler {
    /// Create a scheduler with an explicit interval
    pub fn new(sync: Arc<PodcastSync>, interval: Duration) -> Self {
        Self { sync, interval }
    }

    /// Create a scheduler using `schedule.recently_updated_interval`
    pub fn from_config(sync: Arc<PodcastSync>) -> Self {
        let interval = sync.config().schedule.recently_updated_interval;
        Self::new(sync, interval)
    }

    /// Interval between cycle starts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `cancel` fires
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// delays the next one instead of triggering a burst. Cancellation is
    /// checked between cycles, and an in-flight cycle is abandoned when the
    /// token fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "recently updated scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("abandoning in-flight recently updated cycle");
                    break;
                }
                result = self.sync.sync_recently_updated() => match result {
                    Ok(report) if report.dropped > 0 => {
                        warn!(dropped = report.dropped, "recently updated cycle dropped its batch");
                    }
                    Ok(_) => {}
                    Err(e) if e.is_cycle_fatal() => {
                        error!(error = %e, code = e.error_code(), "recently updated cycle failed");
                    }
                    Err(e) => {
                        warn!(error = %e, code = e.error_code(), "recently updated cycle incomplete");
                    }
                },
            }
        }

        info!("recently updated scheduler shutting down");
    }
}
