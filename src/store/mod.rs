//! Job state store: one TTL-bearing record per job id.
//!
//! The store is the second shared resource besides the queue, and the one
//! that makes processing exactly-once-effective: `mark_processing` and
//! `finalize` are compare-and-set operations that refuse to touch a
//! terminal record, so a stale redelivery can never overwrite a finalized
//! result.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{JobOutcome, JobRecord, JobStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("job {0} already exists")]
    Duplicate(String),
    #[error("corrupt job record {0}: {1}")]
    Corrupt(String, String),
}

/// Keyed record store for job status and results.
///
/// Implementations must support atomic single-record compare-and-set so
/// the worker's fencing check is correct under concurrent redelivery.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a fresh pending record. Fails on duplicate `job_id`.
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError>;

    async fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// CAS transition to `processing`. Succeeds from `pending` (or an
    /// already-`processing` record left by a superseded claim); returns
    /// `false` when the record is terminal or missing, in which case the
    /// caller must skip processing.
    async fn mark_processing(&self, job_id: &str) -> Result<bool, StoreError>;

    /// Atomically write all terminal fields, set `ttl_expires_at`, and
    /// start the TTL clock. Returns `false` without writing anything when
    /// the record is already terminal.
    async fn finalize(
        &self,
        job_id: &str,
        outcome: &JobOutcome,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove a record outright. Rollback path for the ingestion gateway;
    /// removing a missing record is a no-op.
    async fn delete(&self, job_id: &str) -> Result<(), StoreError>;

    async fn status_counts(&self) -> Result<HashMap<JobStatus, u64>, StoreError>;

    async fn total_jobs(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
