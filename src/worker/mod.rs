//! Worker pool: claims queue entries and drives jobs to a terminal state.
//!
//! Workers are stateless between claims; all coordination goes through
//! the queue's single-owner delivery and the store's compare-and-set.
//! A pool runs N claim loops plus one reaper that rescues entries whose
//! owner stopped acknowledging.

mod reaper;
mod runner;

pub use reaper::Reaper;
pub use runner::Worker;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::parser::ParserSet;
use crate::queue::{JobQueue, QueueError};
use crate::store::{JobStore, StoreError};
use crate::summarize::Summarize;

/// Infrastructure failures inside the worker loop. Strategy failures are
/// not errors here: they finalize the job instead.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared dependencies and tuning for all workers in a process.
pub struct WorkerContext {
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn JobStore>,
    pub parsers: Arc<ParserSet>,
    pub summarizer: Arc<dyn Summarize>,
    pub job_ttl: Duration,
    pub claim_block: Duration,
    pub visibility_timeout: Duration,
    pub max_delivery_attempts: u64,
    pub keep_tmp_files: bool,
}

impl WorkerContext {
    pub fn new(
        settings: &Settings,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        parsers: Arc<ParserSet>,
        summarizer: Arc<dyn Summarize>,
    ) -> Self {
        Self {
            queue,
            store,
            parsers,
            summarizer,
            job_ttl: settings.job_ttl,
            claim_block: settings.claim_block,
            visibility_timeout: settings.visibility_timeout,
            max_delivery_attempts: settings.max_delivery_attempts,
            keep_tmp_files: settings.keep_tmp_files,
        }
    }
}

/// A set of worker tasks plus the reaper, sharing one context.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(ctx: Arc<WorkerContext>, workers: usize) -> Self {
        Self {
            ctx,
            workers: workers.max(1),
        }
    }

    /// Run until the shutdown signal flips to `true`. In-flight jobs run
    /// to their terminal write before the loops exit.
    pub async fn run_until_shutdown(self, shutdown: watch::Receiver<bool>) {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        let nonce = Uuid::new_v4().simple().to_string();
        let nonce = &nonce[..8];

        let mut tasks = JoinSet::new();
        for i in 0..self.workers {
            let worker = Worker::new(
                self.ctx.clone(),
                format!("{host}-{nonce}-worker-{i}"),
            );
            let shutdown = shutdown.clone();
            tasks.spawn(async move { worker.run(shutdown).await });
        }

        let reaper = Reaper::new(self.ctx.clone(), format!("{host}-{nonce}-reaper"));
        let reaper_shutdown = shutdown.clone();
        tasks.spawn(async move { reaper.run(reaper_shutdown).await });

        info!(workers = self.workers, "worker pool started");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task aborted");
            }
        }
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::llm::GeminiClient;
    use crate::model::{JobOutcome, JobRecord, JobStatus, PageContent};
    use crate::queue::{MemoryQueue, QueueEntry};
    use crate::store::MemoryStore;
    use crate::summarize::SummarizeError;

    struct StubSummarizer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubSummarizer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Summarize for StubSummarizer {
        async fn summarize(&self, _pages: &[PageContent]) -> Result<String, SummarizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SummarizeError::EmptyDocument)
            } else {
                Ok("**Summary**".to_string())
            }
        }
    }

    struct Fixture {
        queue: Arc<MemoryQueue>,
        store: Arc<MemoryStore>,
        summarizer: Arc<StubSummarizer>,
        worker: Worker,
        _spool: tempfile::TempDir,
    }

    fn fixture(summarizer_fails: bool) -> Fixture {
        let queue = Arc::new(MemoryQueue::new("jobs", "workers"));
        let store = Arc::new(MemoryStore::new());
        let summarizer = StubSummarizer::new(summarizer_fails);
        let client = GeminiClient::new(None, "gemini-2.0-flash", Duration::from_secs(5));
        let settings = Settings::default();
        let ctx = Arc::new(WorkerContext::new(
            &settings,
            queue.clone(),
            store.clone(),
            Arc::new(ParserSet::new(client)),
            summarizer.clone(),
        ));
        Fixture {
            queue,
            store,
            summarizer,
            worker: Worker::new(ctx, "test-worker".to_string()),
            _spool: tempfile::tempdir().unwrap(),
        }
    }

    /// Create the spool file, record, and queue entry for a job, then
    /// claim and return the delivery.
    async fn enqueue_and_claim(fx: &Fixture, job_id: &str, parser: &str, body: &[u8]) -> crate::queue::Delivery {
        let path = fx._spool.path().join(format!("{job_id}.bin"));
        std::fs::write(&path, body).unwrap();
        let source_location = path.display().to_string();

        fx.store
            .create(&JobRecord::pending(job_id, parser, "doc.txt", &source_location))
            .await
            .unwrap();
        fx.queue
            .append(&QueueEntry {
                job_id: job_id.to_string(),
                parser: parser.to_string(),
                source_location,
            })
            .await
            .unwrap();
        fx.queue
            .claim("test-worker", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn simple_job_reaches_done_with_pages_in_order() {
        let fx = fixture(false);
        let delivery = enqueue_and_claim(&fx, "job1", "simple", b"one\x0ctwo\x0cthree").await;

        fx.worker.process_delivery(delivery).await.unwrap();

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.page_count, Some(3));
        let pages = record.per_page_markdown.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages.iter().map(|p| p.page).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(record.summary_md.as_deref(), Some("**Summary**"));
        assert!(record.ttl_expires_at.is_some());
        assert_eq!(fx.summarizer.calls(), 1);
        // Entry acknowledged.
        assert!(fx.queue.ownership(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn placeholder_job_errors_without_summarizer_dispatch() {
        let fx = fixture(false);
        let delivery = enqueue_and_claim(&fx, "job1", "placeholder", b"content").await;

        fx.worker.process_delivery(delivery).await.unwrap();

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("not implemented"));
        assert_eq!(fx.summarizer.calls(), 0);
        assert!(fx.queue.ownership(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tag_errors_without_any_dispatch() {
        let fx = fixture(false);
        let delivery = enqueue_and_claim(&fx, "job1", "pypdf", b"content").await;

        fx.worker.process_delivery(delivery).await.unwrap();

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("unknown parser"));
        assert_eq!(fx.summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn summarizer_failure_is_a_terminal_error() {
        let fx = fixture(true);
        let delivery = enqueue_and_claim(&fx, "job1", "simple", b"content").await;

        fx.worker.process_delivery(delivery).await.unwrap();

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("summarization failed"));
        assert_eq!(fx.summarizer.calls(), 1);
    }

    #[tokio::test]
    async fn stale_redelivery_of_finalized_job_is_skipped() {
        let fx = fixture(false);
        let delivery = enqueue_and_claim(&fx, "job1", "simple", b"content").await;

        // First owner finalized but crashed before acking.
        fx.store
            .finalize(
                "job1",
                &JobOutcome::Done {
                    pages: vec![PageContent {
                        page: 1,
                        content_md: "original".to_string(),
                    }],
                    summary_md: "original summary".to_string(),
                },
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        fx.worker.process_delivery(delivery).await.unwrap();

        // No second terminal write, no strategy dispatch, entry acked.
        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.summary_md.as_deref(), Some("original summary"));
        assert_eq!(fx.summarizer.calls(), 0);
        assert!(fx.queue.ownership(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn crashed_claim_is_reclaimed_and_finalized_once() {
        let fx = fixture(false);
        // Original owner claims and crashes: delivery dropped unprocessed.
        let _abandoned = enqueue_and_claim(&fx, "job1", "simple", b"content").await;

        let reclaimed = fx
            .queue
            .reclaim_stale("rescuer", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 2);

        fx.worker
            .process_delivery(reclaimed.into_iter().next().unwrap())
            .await
            .unwrap();

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(fx.summarizer.calls(), 1);
        assert!(fx.queue.ownership(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_attempt_ceiling_force_finalizes() {
        let fx = fixture(false);
        let mut delivery = enqueue_and_claim(&fx, "job1", "simple", b"content").await;
        delivery.attempts = fx.worker.ctx().max_delivery_attempts + 1;

        fx.worker.process_delivery(delivery).await.unwrap();

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("delivery attempts"));
        // No strategy ran.
        assert_eq!(fx.summarizer.calls(), 0);
        assert!(fx.queue.ownership(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_record_drops_the_entry() {
        let fx = fixture(false);
        let delivery = enqueue_and_claim(&fx, "job1", "simple", b"content").await;
        fx.store.delete("job1").await.unwrap();

        fx.worker.process_delivery(delivery).await.unwrap();
        assert!(fx.queue.ownership(10).await.unwrap().is_empty());
        assert_eq!(fx.summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn reaper_sweep_rescues_abandoned_entries() {
        let fx = fixture(false);
        let _abandoned = enqueue_and_claim(&fx, "job1", "simple", b"content").await;

        let mut settings = Settings::default();
        settings.visibility_timeout = Duration::ZERO;
        let client = GeminiClient::new(None, "gemini-2.0-flash", Duration::from_secs(5));
        let ctx = Arc::new(WorkerContext::new(
            &settings,
            fx.queue.clone(),
            fx.store.clone(),
            Arc::new(ParserSet::new(client)),
            fx.summarizer.clone(),
        ));
        let reaper = Reaper::new(ctx, "test-reaper".to_string());

        let reclaimed = reaper.sweep().await.unwrap();
        assert_eq!(reclaimed, 1);

        let record = fx.store.fetch("job1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
    }
}
