//! Stale-claim reaper.
//!
//! Scans the pending-entry table on a schedule and takes over claims
//! whose age exceeds the visibility timeout — the recovery path for
//! workers that crashed mid-processing. Reclaimed entries run through
//! the normal pipeline; the fencing check decides whether any work is
//! left to do, and the delivery-attempt ceiling stops eternal redelivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use super::{Worker, WorkerContext};

/// Entries taken per scan.
const REAP_BATCH: usize = 16;

pub struct Reaper {
    worker: Worker,
    interval: Duration,
    visibility_timeout: Duration,
}

impl Reaper {
    pub fn new(ctx: Arc<WorkerContext>, consumer_id: String) -> Self {
        let visibility_timeout = ctx.visibility_timeout;
        // Scan at half the timeout so a stale claim waits at most ~1.5x
        // the configured visibility window.
        let interval = (visibility_timeout / 2).max(Duration::from_secs(1));
        Self {
            worker: Worker::new(ctx, consumer_id),
            interval,
            visibility_timeout,
        }
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(consumer = %self.worker.consumer_id(), interval = ?self.interval, "reaper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.sweep().await {
                error!(error = %e, "reaper sweep failed");
            }
        }
        info!(consumer = %self.worker.consumer_id(), "reaper stopped");
    }

    /// One scan: reclaim everything stale, process each reclaimed entry.
    pub async fn sweep(&self) -> Result<usize, super::WorkerError> {
        let reclaimed = self
            .worker
            .ctx()
            .queue
            .reclaim_stale(
                self.worker.consumer_id(),
                self.visibility_timeout,
                REAP_BATCH,
            )
            .await?;
        let count = reclaimed.len();
        if count > 0 {
            info!(count, "reclaimed stale entries");
        }
        for delivery in reclaimed {
            if let Err(e) = self.worker.process_delivery(delivery).await {
                error!(error = %e, "failed to process reclaimed entry");
            }
        }
        Ok(count)
    }
}
