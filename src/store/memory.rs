//! In-memory job store for single-process operation.
//!
//! One mutex-guarded map; TTL expiry is applied lazily on read. Matches
//! the Redis backend's CAS semantics exactly so tests exercise the same
//! fencing behavior production sees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{JobOutcome, JobRecord, JobStatus};

use super::{JobStore, StoreError};

/// In-memory job record store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn expired(record: &JobRecord) -> bool {
        record
            .ttl_expires_at
            .is_some_and(|expires| expires <= Utc::now())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(&record.job_id) {
            if !Self::expired(existing) {
                return Err(StoreError::Duplicate(record.job_id.clone()));
            }
        }
        jobs.insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.read().await;
        match jobs.get(job_id) {
            Some(record) if !Self::expired(record) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    async fn mark_processing(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(job_id) else {
            return Ok(false);
        };
        if Self::expired(record) || record.status.is_terminal() {
            return Ok(false);
        }
        record.status = JobStatus::Processing;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn finalize(
        &self,
        job_id: &str,
        outcome: &JobOutcome,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(job_id) else {
            return Ok(false);
        };
        if Self::expired(record) || record.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        record.status = outcome.status();
        record.updated_at = now;
        record.ttl_expires_at = Some(now + chrono::Duration::from_std(ttl).unwrap_or_default());
        match outcome {
            JobOutcome::Done { pages, summary_md } => {
                record.page_count = Some(pages.len() as u32);
                record.per_page_markdown = Some(pages.clone());
                record.summary_md = Some(summary_md.clone());
            }
            JobOutcome::Error { message } => {
                record.error_message = Some(message.clone());
            }
        }
        Ok(true)
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.jobs.write().await.remove(job_id);
        Ok(())
    }

    async fn status_counts(&self) -> Result<HashMap<JobStatus, u64>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut counts = HashMap::new();
        for record in jobs.values().filter(|r| !Self::expired(r)) {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn total_jobs(&self) -> Result<u64, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|r| !Self::expired(r)).count() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
