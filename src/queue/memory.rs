//! In-memory queue backend for single-process operation.
//!
//! Implements the same consumer-group semantics as the Redis backend
//! (single-owner delivery, visibility-timeout reclaim, attempt counting)
//! behind one mutex. State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{
    now_ms, Delivery, EntryId, JobQueue, OwnershipRecord, QueueEntry, QueueError, QueueMetrics,
};

struct QueueInner {
    /// Append-only log in arrival order.
    log: Vec<(EntryId, QueueEntry)>,
    /// Entry lookup for reclaim.
    by_id: HashMap<EntryId, QueueEntry>,
    /// Group delivery cursor into `log`.
    cursor: usize,
    /// Pending-entry table: claimed and unacknowledged.
    pending: HashMap<EntryId, OwnershipRecord>,
    next_seq: u64,
}

/// In-memory job queue with consumer-group delivery tracking.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Mutex<QueueInner>>,
    notify: Arc<Notify>,
    stream: String,
    group: String,
}

impl MemoryQueue {
    pub fn new(stream: &str, group: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                log: Vec::new(),
                by_id: HashMap::new(),
                cursor: 0,
                pending: HashMap::new(),
                next_seq: 1,
            })),
            notify: Arc::new(Notify::new()),
            stream: stream.to_string(),
            group: group.to_string(),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn append(&self, entry: &QueueEntry) -> Result<EntryId, QueueError> {
        let id = {
            let mut inner = self.inner.lock().await;
            let id = EntryId(format!("{}-0", inner.next_seq));
            inner.next_seq += 1;
            inner.log.push((id.clone(), entry.clone()));
            inner.by_id.insert(id.clone(), entry.clone());
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn claim(
        &self,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            // Register for wakeup before checking, so an append between the
            // check and the wait is not missed.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.cursor < inner.log.len() {
                    let (id, entry) = inner.log[inner.cursor].clone();
                    inner.cursor += 1;
                    inner.pending.insert(
                        id.clone(),
                        OwnershipRecord {
                            entry_id: id.clone(),
                            consumer_id: consumer.to_string(),
                            claimed_at_ms: now_ms(),
                            delivery_attempts: 1,
                        },
                    );
                    return Ok(Some(Delivery {
                        id,
                        entry,
                        attempts: 1,
                    }));
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn ack(&self, id: &EntryId) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(id);
        Ok(())
    }

    async fn reclaim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        limit: usize,
    ) -> Result<Vec<Delivery>, QueueError> {
        let cutoff = now_ms() - min_idle.as_millis() as i64;
        let mut inner = self.inner.lock().await;
        let mut stale: Vec<EntryId> = inner
            .pending
            .values()
            .filter(|rec| rec.claimed_at_ms <= cutoff)
            .map(|rec| rec.entry_id.clone())
            .collect();
        // Deterministic reclaim order: oldest log position first.
        stale.sort_by(|a, b| {
            let seq = |id: &EntryId| {
                id.0.split('-')
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0)
            };
            seq(a).cmp(&seq(b))
        });
        stale.truncate(limit);

        let mut reclaimed = Vec::with_capacity(stale.len());
        for id in stale {
            let entry = match inner.by_id.get(&id) {
                Some(entry) => entry.clone(),
                None => continue,
            };
            let record = inner
                .pending
                .get_mut(&id)
                .ok_or_else(|| QueueError::Backend("pending record vanished".to_string()))?;
            record.consumer_id = consumer.to_string();
            record.claimed_at_ms = now_ms();
            record.delivery_attempts += 1;
            let attempts = record.delivery_attempts;
            reclaimed.push(Delivery {
                id,
                entry,
                attempts,
            });
        }
        Ok(reclaimed)
    }

    async fn ownership(&self, limit: usize) -> Result<Vec<OwnershipRecord>, QueueError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<OwnershipRecord> = inner.pending.values().cloned().collect();
        records.sort_by(|a, b| a.claimed_at_ms.cmp(&b.claimed_at_ms));
        records.truncate(limit);
        Ok(records)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
        let inner = self.inner.lock().await;
        Ok(QueueMetrics {
            stream: self.stream.clone(),
            group: self.group.clone(),
            stream_len: inner.log.len() as u64,
            pending_entries: inner.pending.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(job_id: &str) -> QueueEntry {
        QueueEntry {
            job_id: job_id.to_string(),
            parser: "simple".to_string(),
            source_location: format!("/tmp/{job_id}.bin"),
        }
    }

    #[tokio::test]
    async fn claim_returns_none_on_empty_queue() {
        let queue = MemoryQueue::new("jobs", "workers");
        let claimed = queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn entries_delivered_in_log_order() {
        let queue = MemoryQueue::new("jobs", "workers");
        queue.append(&entry("a")).await.unwrap();
        queue.append(&entry("b")).await.unwrap();

        let first = queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        let second = queue
            .claim("w2", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.entry.job_id, "a");
        assert_eq!(second.entry.job_id, "b");
        assert_eq!(first.attempts, 1);
    }

    #[tokio::test]
    async fn each_entry_delivered_to_one_consumer() {
        let queue = MemoryQueue::new("jobs", "workers");
        queue.append(&entry("a")).await.unwrap();

        let first = queue.claim("w1", Duration::from_millis(20)).await.unwrap();
        let second = queue.claim("w2", Duration::from_millis(20)).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn blocked_claim_wakes_on_append() {
        let queue = MemoryQueue::new("jobs", "workers");
        let waiter = queue.clone();
        let handle = tokio::spawn(async move {
            waiter.claim("w1", Duration::from_secs(2)).await.unwrap()
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        queue.append(&entry("a")).await.unwrap();
        let claimed = handle.await.unwrap();
        assert_eq!(claimed.unwrap().entry.job_id, "a");
    }

    #[tokio::test]
    async fn ack_removes_ownership() {
        let queue = MemoryQueue::new("jobs", "workers");
        queue.append(&entry("a")).await.unwrap();
        let delivery = queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.ownership(10).await.unwrap().len(), 1);

        queue.ack(&delivery.id).await.unwrap();
        assert!(queue.ownership(10).await.unwrap().is_empty());
        // Acked entries are never reclaimed.
        let reclaimed = queue
            .reclaim_stale("w2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn reclaim_supersedes_ownership_and_counts_attempts() {
        let queue = MemoryQueue::new("jobs", "workers");
        queue.append(&entry("a")).await.unwrap();
        let delivery = queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();

        let reclaimed = queue
            .reclaim_stale("w2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, delivery.id);
        assert_eq!(reclaimed[0].attempts, 2);

        // Superseded, not duplicated: still a single ownership record.
        let records = queue.ownership(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].consumer_id, "w2");
        assert_eq!(records[0].delivery_attempts, 2);
    }

    #[tokio::test]
    async fn fresh_claims_are_not_reclaim_eligible() {
        let queue = MemoryQueue::new("jobs", "workers");
        queue.append(&entry("a")).await.unwrap();
        queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();

        let reclaimed = queue
            .reclaim_stale("w2", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn metrics_track_log_and_pending() {
        let queue = MemoryQueue::new("jobs", "workers");
        queue.append(&entry("a")).await.unwrap();
        queue.append(&entry("b")).await.unwrap();
        queue
            .claim("w1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();

        let metrics = queue.metrics().await.unwrap();
        assert_eq!(metrics.stream_len, 2);
        assert_eq!(metrics.pending_entries, 1);
        assert_eq!(metrics.group, "workers");
    }
}
