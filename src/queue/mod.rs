//! Durable job queue with consumer-group delivery tracking.
//!
//! A single append-only stream feeds a named consumer group; each entry is
//! delivered to exactly one group member at a time. Delivery is
//! at-least-once: a claimed entry that is never acknowledged becomes
//! eligible for reclaim once its claim age exceeds the visibility timeout.
//! Exactly-once *effect* is the worker's job (fencing against the job
//! store), not the queue's.
//!
//! Two backends share the trait: `MemoryQueue` for tests and
//! single-process deployments, `RedisQueue` (streams + consumer groups)
//! for distributed operation.

mod memory;
mod redis;

pub use memory::MemoryQueue;
pub use redis::RedisQueue;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("malformed queue entry {0}: {1}")]
    Malformed(String, String),
}

/// Position of an entry in the stream. Monotonically increasing with
/// arrival order; never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntryId(pub String);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload appended at ingestion. Not mutated after append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: String,
    pub parser: String,
    pub source_location: String,
}

/// One delivery of an entry to a consumer. `attempts` counts deliveries
/// including this one, so a fresh claim carries `attempts == 1`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: EntryId,
    pub entry: QueueEntry,
    pub attempts: u64,
}

/// Claim bookkeeping for an in-flight entry. Exists only while the entry
/// is claimed and unacknowledged; superseded (not duplicated) on reclaim.
#[derive(Debug, Clone, Serialize)]
pub struct OwnershipRecord {
    pub entry_id: EntryId,
    pub consumer_id: String,
    /// Unix milliseconds of the most recent claim.
    pub claimed_at_ms: i64,
    pub delivery_attempts: u64,
}

/// Point-in-time queue figures for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub stream: String,
    pub group: String,
    pub stream_len: u64,
    pub pending_entries: u64,
}

/// A durable, ordered work queue shared by the ingestion gateway and all
/// workers. Implementations must be safe for concurrent use from any
/// number of processes; the single-owner delivery invariant is the only
/// mutual exclusion the workers rely on besides the store's CAS.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an entry to the stream and return its log position.
    async fn append(&self, entry: &QueueEntry) -> Result<EntryId, QueueError>;

    /// Claim the next undelivered entry for `consumer`, blocking up to
    /// `block` while the stream is empty. Returns `None` on timeout.
    async fn claim(&self, consumer: &str, block: Duration)
        -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivered entry, removing its ownership record.
    /// Idempotent: acking an already-acked entry is a no-op.
    async fn ack(&self, id: &EntryId) -> Result<(), QueueError>;

    /// Transfer ownership of entries idle for at least `min_idle` to
    /// `consumer`, incrementing their delivery attempt count. Returns the
    /// reclaimed deliveries, at most `limit`.
    async fn reclaim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        limit: usize,
    ) -> Result<Vec<Delivery>, QueueError>;

    /// Snapshot of the pending-entry table, at most `limit` records.
    async fn ownership(&self, limit: usize) -> Result<Vec<OwnershipRecord>, QueueError>;

    /// Liveness check against the backend.
    async fn ping(&self) -> Result<(), QueueError>;

    async fn metrics(&self) -> Result<QueueMetrics, QueueError>;
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
