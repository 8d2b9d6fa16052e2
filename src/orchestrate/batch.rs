//! Batch upload: N independent ingestion calls, per-file outcomes.

use serde::Serialize;
use tracing::info;

use crate::ingest::IngestGateway;

/// One file in a batch request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Per-file outcome: a job id on success, an inline error otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub total_files: usize,
    pub results: Vec<BatchItem>,
}

/// Submit every file with the same parser tag. Failures stay inline in
/// the result list; successful submissions are never rolled back because
/// a sibling failed.
pub async fn upload_batch(
    gateway: &IngestGateway,
    files: Vec<UploadFile>,
    parser_tag: &str,
) -> BatchOutcome {
    let total_files = files.len();
    let mut results = Vec::with_capacity(total_files);

    for file in files {
        let item = match gateway.submit(&file.bytes, parser_tag, &file.filename).await {
            Ok(job_id) => BatchItem {
                filename: file.filename,
                job_id: Some(job_id),
                error: None,
            },
            Err(e) => BatchItem {
                filename: file.filename,
                job_id: None,
                error: Some(e.to_string()),
            },
        };
        results.push(item);
    }

    let accepted = results.iter().filter(|r| r.job_id.is_some()).count();
    info!(total_files, accepted, parser = parser_tag, "batch upload processed");
    BatchOutcome {
        total_files,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::store::{JobStore, MemoryStore};
    use std::sync::Arc;

    fn gateway() -> (IngestGateway, Arc<MemoryStore>) {
        let queue = Arc::new(MemoryQueue::new("jobs", "workers"));
        let store = Arc::new(MemoryStore::new());
        let spool = tempfile::tempdir().unwrap().keep();
        (
            IngestGateway::new(queue, store.clone(), spool, 1024 * 1024),
            store,
        )
    }

    fn file(name: &str, bytes: &[u8]) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn one_malformed_file_fails_inline_without_a_job() {
        let (gateway, store) = gateway();
        let files = vec![
            file("a.txt", b"alpha"),
            file("bad.txt", b""),
            file("c.txt", b"gamma"),
        ];

        let outcome = upload_batch(&gateway, files, "simple").await;
        assert_eq!(outcome.total_files, 3);

        let job_ids: Vec<_> = outcome.results.iter().filter_map(|r| r.job_id.clone()).collect();
        assert_eq!(job_ids.len(), 2);

        let failed = &outcome.results[1];
        assert_eq!(failed.filename, "bad.txt");
        assert!(failed.job_id.is_none());
        assert!(failed.error.as_deref().unwrap().contains("empty"));

        // Only the accepted files have job records.
        assert_eq!(store.total_jobs().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_valid_noop() {
        let (gateway, _store) = gateway();
        let outcome = upload_batch(&gateway, Vec::new(), "simple").await;
        assert_eq!(outcome.total_files, 0);
        assert!(outcome.results.is_empty());
    }
}
