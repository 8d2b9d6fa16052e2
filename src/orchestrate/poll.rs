//! Status polling helper.
//!
//! A client-side convenience: repeatedly read a job's status until it is
//! terminal or the attempt ceiling is reached. Callers pick the interval
//! and ceiling; nothing here blocks on the queue or external services.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::model::JobRecord;
use crate::store::{JobStore, StoreError};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 120,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("job {0} not found")]
    NotFound(String),
    /// The job outlived the poll budget; carries the last snapshot seen.
    #[error("job {job_id} did not reach a terminal state within {attempts} polls")]
    TimedOut {
        job_id: String,
        attempts: u32,
        last: Box<JobRecord>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Poll until the job is terminal, up to `settings.max_attempts` reads.
pub async fn poll_until_terminal(
    store: &Arc<dyn JobStore>,
    job_id: &str,
    settings: &PollSettings,
) -> Result<JobRecord, PollError> {
    let max_attempts = settings.max_attempts.max(1);
    let mut last: Option<JobRecord> = None;
    for attempt in 0..max_attempts {
        let record = store
            .fetch(job_id)
            .await?
            .ok_or_else(|| PollError::NotFound(job_id.to_string()))?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        last = Some(record);
        if attempt + 1 < max_attempts {
            tokio::time::sleep(settings.interval).await;
        }
    }
    Err(PollError::TimedOut {
        job_id: job_id.to_string(),
        attempts: max_attempts,
        last: Box::new(last.expect("at least one poll ran")),
    })
}
