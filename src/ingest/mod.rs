//! Ingestion gateway: turn an upload into a pending job and a queue entry.
//!
//! `submit` returns a job id without waiting for processing. The record
//! is persisted before the queue append; if the append fails the record
//! is rolled back so a job never exists without a corresponding queue
//! entry having been attempted.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::JobRecord;
use crate::parser::ParserKind;
use crate::queue::{JobQueue, QueueEntry, QueueError};
use crate::store::{JobStore, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    /// Rejected synchronously; no job was created.
    #[error("{0}")]
    Validation(String),
    #[error("queue unavailable: {0}")]
    Queue(#[from] QueueError),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("could not spool upload: {0}")]
    Spool(#[from] std::io::Error),
}

/// Creates job records and queue entries for uploaded documents.
pub struct IngestGateway {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobStore>,
    spool_dir: PathBuf,
    max_upload_bytes: u64,
}

impl IngestGateway {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        spool_dir: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            queue,
            store,
            spool_dir,
            max_upload_bytes,
        }
    }

    /// Validate an upload without creating anything. Also used by the
    /// batch endpoint to report per-file errors inline.
    pub fn validate(&self, bytes: &[u8], parser_tag: &str, filename: &str) -> Result<(), IngestError> {
        if filename.trim().is_empty() {
            return Err(IngestError::Validation("no filename provided".to_string()));
        }
        if bytes.is_empty() {
            return Err(IngestError::Validation("file is empty".to_string()));
        }
        if bytes.len() as u64 > self.max_upload_bytes {
            let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
            let limit_mb = self.max_upload_bytes / (1024 * 1024);
            return Err(IngestError::Validation(format!(
                "file size ({size_mb:.1}MB) exceeds maximum allowed size ({limit_mb}MB)"
            )));
        }
        if ParserKind::from_tag(parser_tag).is_none() {
            return Err(IngestError::Validation(format!(
                "unknown parser: {parser_tag}"
            )));
        }
        // Binary container formats we cannot extract from are rejected up
        // front; anything infer cannot classify is treated as text.
        if let Some(detected) = infer::get(bytes) {
            if detected.mime_type() != "application/pdf" {
                return Err(IngestError::Validation(format!(
                    "unsupported document type: {}",
                    detected.mime_type()
                )));
            }
        }
        Ok(())
    }

    /// Create a pending job for the upload and enqueue it. Returns the
    /// new job id immediately.
    pub async fn submit(
        &self,
        bytes: &[u8],
        parser_tag: &str,
        filename: &str,
    ) -> Result<String, IngestError> {
        self.validate(bytes, parser_tag, filename)?;

        let job_id = Uuid::new_v4().simple().to_string();
        let spool_path = self.spool_dir.join(format!("{job_id}.bin"));

        tokio::fs::create_dir_all(&self.spool_dir).await?;
        tokio::fs::write(&spool_path, bytes).await?;
        let source_location = spool_path.display().to_string();

        let record = JobRecord::pending(&job_id, parser_tag, filename, &source_location);
        self.store.create(&record).await?;

        let entry = QueueEntry {
            job_id: job_id.clone(),
            parser: parser_tag.to_string(),
            source_location,
        };
        if let Err(e) = self.queue.append(&entry).await {
            // Roll back: a job must never linger without a queue entry.
            error!(job_id, error = %e, "queue append failed, rolling back job record");
            if let Err(cleanup) = self.store.delete(&job_id).await {
                warn!(job_id, error = %cleanup, "rollback of job record failed");
            }
            if let Err(cleanup) = tokio::fs::remove_file(&spool_path).await {
                warn!(job_id, error = %cleanup, "rollback of spool file failed");
            }
            return Err(e.into());
        }

        info!(job_id, parser = parser_tag, filename, size = bytes.len(), "accepted upload");
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use crate::queue::MemoryQueue;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn gateway() -> (IngestGateway, Arc<MemoryQueue>, Arc<MemoryStore>) {
        let queue = Arc::new(MemoryQueue::new("jobs", "workers"));
        let store = Arc::new(MemoryStore::new());
        let spool = tempfile::tempdir().unwrap().keep();
        let gateway = IngestGateway::new(queue.clone(), store.clone(), spool, 1024 * 1024);
        (gateway, queue, store)
    }

    #[tokio::test]
    async fn submit_creates_pending_record_and_entry() {
        let (gateway, queue, store) = gateway();

        let job_id = gateway
            .submit(b"page one\x0cpage two", "simple", "doc.txt")
            .await
            .unwrap();

        let record = store.fetch(&job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.parser, "simple");
        assert_eq!(record.filename, "doc.txt");

        let delivery = queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.entry.job_id, job_id);
        assert_eq!(delivery.entry.parser, "simple");
        assert!(std::path::Path::new(&delivery.entry.source_location).exists());
    }

    #[tokio::test]
    async fn unknown_parser_is_rejected_without_a_job() {
        let (gateway, _queue, store) = gateway();

        let result = gateway.submit(b"content", "pypdf", "doc.txt").await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
        assert_eq!(store.total_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn placeholder_tag_is_accepted_at_ingestion() {
        let (gateway, _queue, store) = gateway();

        let job_id = gateway
            .submit(b"content", "placeholder", "doc.txt")
            .await
            .unwrap();
        assert!(store.fetch(&job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_and_oversized_files_are_rejected() {
        let (gateway, _queue, _store) = gateway();

        assert!(matches!(
            gateway.submit(b"", "simple", "doc.txt").await,
            Err(IngestError::Validation(_))
        ));

        let oversized = vec![0x20u8; 2 * 1024 * 1024];
        let result = gateway.submit(&oversized, "simple", "doc.txt").await;
        match result {
            Err(IngestError::Validation(message)) => {
                assert!(message.contains("exceeds maximum"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_document_binary_is_rejected() {
        let (gateway, _queue, _store) = gateway();

        // PNG magic bytes.
        let png = b"\x89PNG\r\n\x1a\n0000000000";
        let result = gateway.submit(png, "simple", "image.png").await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[tokio::test]
    async fn pdf_magic_is_accepted() {
        let (gateway, _queue, _store) = gateway();

        let pdf = b"%PDF-1.7 fake body for validation";
        let result = gateway.submit(pdf, "simple", "doc.pdf").await;
        assert!(result.is_ok());
    }
}
