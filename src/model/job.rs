//! Job records, status state machine, and processing results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// Transitions are monotonic: `pending -> processing -> {done | error}`.
/// There is no transition out of a terminal state; the store enforces this
/// with a compare-and-set on every terminal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Markdown content for a single document page. Page numbers are 1-based
/// and the sequence preserves document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub page: u32,
    pub content_md: String,
}

/// Output of a parser strategy: ordered per-page markdown.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub pages: Vec<PageContent>,
}

impl ParsedDocument {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }
}

/// The terminal result of one worker iteration over a job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Done {
        pages: Vec<PageContent>,
        summary_md: String,
    },
    Error {
        message: String,
    },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Done { .. } => JobStatus::Done,
            JobOutcome::Error { .. } => JobStatus::Error,
        }
    }
}

/// One document-processing request tracked end-to-end.
///
/// Exactly one record exists per `job_id`. Result fields are populated only
/// on success, `error_message` only on failure, `ttl_expires_at` only once
/// the record is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    /// Parser strategy tag chosen at ingestion, resolved at claim time.
    pub parser: String,
    pub filename: String,
    /// Spool file path the queue entry references.
    pub source_location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_md: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page_markdown: Option<Vec<PageContent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_expires_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a fresh pending record at ingestion time.
    pub fn pending(job_id: &str, parser: &str, filename: &str, source_location: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Pending,
            parser: parser.to_string(),
            filename: filename.to_string(),
            source_location: source_location.to_string(),
            created_at: now,
            updated_at: now,
            page_count: None,
            summary_md: None,
            per_page_markdown: None,
            error_message: None,
            ttl_expires_at: None,
        }
    }
}

/// Serializable view of a job without the per-page payload. Returned by
/// `status` queries and comparison results; the full record is available
/// through `result` once the job is done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub parser: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_md: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&JobRecord> for JobSnapshot {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            parser: record.parser.clone(),
            filename: record.filename.clone(),
            page_count: record.page_count,
            summary_md: record.summary_md.clone(),
            error_message: record.error_message.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Error,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("queued"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }

    #[test]
    fn pending_record_has_no_result_fields() {
        let record = JobRecord::pending("abc", "simple", "doc.pdf", "/tmp/abc.bin");
        assert_eq!(record.status, JobStatus::Pending);
        assert!(record.page_count.is_none());
        assert!(record.summary_md.is_none());
        assert!(record.error_message.is_none());
        assert!(record.ttl_expires_at.is_none());
    }
}
