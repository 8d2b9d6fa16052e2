//! Single worker claim/process/finalize loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::model::JobOutcome;
use crate::parser::ParserKind;
use crate::queue::{Delivery, QueueEntry};

use super::{WorkerContext, WorkerError};

/// Pause after an infrastructure failure before the next claim attempt.
const BACKOFF_AFTER_ERROR: Duration = Duration::from_secs(5);

/// One consumer-group member. Stateless between claims.
pub struct Worker {
    ctx: Arc<WorkerContext>,
    consumer_id: String,
}

impl Worker {
    pub fn new(ctx: Arc<WorkerContext>, consumer_id: String) -> Self {
        Self { ctx, consumer_id }
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub(crate) fn ctx(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Claim loop. Exits between claims once `shutdown` flips to `true`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(consumer = %self.consumer_id, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self
                .ctx
                .queue
                .claim(&self.consumer_id, self.ctx.claim_block)
                .await
            {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.process_delivery(delivery).await {
                        // Infrastructure failure: leave the entry unacked so
                        // redelivery retries it, do not crash the loop.
                        error!(consumer = %self.consumer_id, error = %e, "processing failed");
                        tokio::time::sleep(BACKOFF_AFTER_ERROR).await;
                    }
                }
                Ok(None) => {} // poll timeout, re-check shutdown
                Err(e) => {
                    error!(consumer = %self.consumer_id, error = %e, "claim failed");
                    tokio::time::sleep(BACKOFF_AFTER_ERROR).await;
                }
            }
        }
        info!(consumer = %self.consumer_id, "worker stopped");
    }

    /// Drive one delivery to acknowledgment.
    ///
    /// Acknowledgment happens strictly after the terminal store write, so
    /// a crash in between causes a reclaim that the fencing check turns
    /// into an ack-and-skip, never a second result.
    pub async fn process_delivery(&self, delivery: Delivery) -> Result<(), WorkerError> {
        let job_id = delivery.entry.job_id.clone();
        debug!(consumer = %self.consumer_id, job_id, entry = %delivery.id, attempts = delivery.attempts, "claimed entry");

        if delivery.attempts > self.ctx.max_delivery_attempts {
            let message = format!(
                "processing abandoned after {} delivery attempts",
                delivery.attempts - 1
            );
            warn!(job_id, "{message}");
            self.ctx
                .store
                .finalize(
                    &job_id,
                    &JobOutcome::Error { message },
                    self.ctx.job_ttl,
                )
                .await?;
            self.ctx.queue.ack(&delivery.id).await?;
            self.cleanup_spool(&delivery.entry.source_location).await;
            return Ok(());
        }

        let Some(record) = self.ctx.store.fetch(&job_id).await? else {
            warn!(job_id, "job record missing or expired, dropping entry");
            self.ctx.queue.ack(&delivery.id).await?;
            self.cleanup_spool(&delivery.entry.source_location).await;
            return Ok(());
        };

        // Fencing: a finalized job means this is a stale redelivery of an
        // entry whose owner crashed between write and ack. Skip without
        // side effects.
        if record.status.is_terminal() {
            debug!(job_id, status = %record.status, "stale redelivery of finalized job");
            self.ctx.queue.ack(&delivery.id).await?;
            self.cleanup_spool(&delivery.entry.source_location).await;
            return Ok(());
        }

        if !self.ctx.store.mark_processing(&job_id).await? {
            // Lost the race to a concurrent finalizer.
            self.ctx.queue.ack(&delivery.id).await?;
            return Ok(());
        }

        let outcome = self.execute_isolated(&delivery.entry).await;
        match &outcome {
            JobOutcome::Done { pages, .. } => {
                info!(job_id, pages = pages.len(), "job done");
            }
            JobOutcome::Error { message } => {
                warn!(job_id, error = %message, "job failed");
            }
        }

        let wrote = self
            .ctx
            .store
            .finalize(&job_id, &outcome, self.ctx.job_ttl)
            .await?;
        if !wrote {
            debug!(job_id, "job finalized by a superseding claim");
        }
        self.ctx.queue.ack(&delivery.id).await?;
        self.cleanup_spool(&delivery.entry.source_location).await;
        Ok(())
    }

    /// Run the parse/summarize stages in a separate task so a panic in a
    /// strategy converts to a job error instead of taking the loop down.
    async fn execute_isolated(&self, entry: &QueueEntry) -> JobOutcome {
        let ctx = self.ctx.clone();
        let entry = entry.clone();
        match tokio::spawn(async move { execute(ctx, entry).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) => JobOutcome::Error {
                message: format!("processing aborted: {join_error}"),
            },
        }
    }

    async fn cleanup_spool(&self, source_location: &str) {
        if self.ctx.keep_tmp_files {
            debug!(source_location, "keeping spool file");
            return;
        }
        match tokio::fs::remove_file(source_location).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(source_location, error = %e, "failed to remove spool file"),
        }
    }
}

/// The parse -> summarize pipeline. Strategy failures of any shape fold
/// into a terminal error outcome; nothing escapes.
async fn execute(ctx: Arc<WorkerContext>, entry: QueueEntry) -> JobOutcome {
    let Some(kind) = ParserKind::from_tag(&entry.parser) else {
        return JobOutcome::Error {
            message: format!("unknown parser: {}", entry.parser),
        };
    };
    let Some(parser) = ctx.parsers.get(kind) else {
        return JobOutcome::Error {
            message: format!("no strategy registered for parser: {kind}"),
        };
    };

    let parsed = match parser.parse(Path::new(&entry.source_location)).await {
        Ok(parsed) => parsed,
        Err(e) => {
            return JobOutcome::Error {
                message: format!("parsing failed: {e}"),
            }
        }
    };

    match ctx.summarizer.summarize(&parsed.pages).await {
        Ok(summary_md) => JobOutcome::Done {
            pages: parsed.pages,
            summary_md,
        },
        Err(e) => JobOutcome::Error {
            message: format!("summarization failed: {e}"),
        },
    }
}
