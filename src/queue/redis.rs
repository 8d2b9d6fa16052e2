//! Redis Streams queue backend for distributed multi-process operation.
//!
//! One stream key, one consumer group. Claims go through `XREADGROUP`,
//! acknowledgments through `XACK`; the pending-entries list (`XPENDING`)
//! is the durable ownership table and `XCLAIM` performs the
//! visibility-timeout reclaim. Group state survives worker restarts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::{
    now_ms, Delivery, EntryId, JobQueue, OwnershipRecord, QueueEntry, QueueError, QueueMetrics,
};

const FIELD_JOB_ID: &str = "job_id";
const FIELD_PARSER: &str = "parser";
const FIELD_SOURCE: &str = "source_location";

/// Redis Streams-backed job queue.
pub struct RedisQueue {
    conn: ConnectionManager,
    stream: String,
    group: String,
}

impl RedisQueue {
    /// Connect and ensure the stream + consumer group exist.
    pub async fn connect(redis_url: &str, stream: &str, group: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let queue = Self {
            conn,
            stream: stream.to_string(),
            group: group.to_string(),
        };
        queue.ensure_group().await?;
        Ok(queue)
    }

    /// Create the consumer group, tolerating a pre-existing one.
    async fn ensure_group(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;
        match created {
            Ok(()) => {
                debug!(stream = %self.stream, group = %self.group, "created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(QueueError::Backend(e.to_string())),
        }
    }

    fn parse_entry(&self, id: &str, fields: &StreamId) -> Result<QueueEntry, QueueError> {
        let field = |name: &str| -> Result<String, QueueError> {
            fields
                .get::<String>(name)
                .ok_or_else(|| QueueError::Malformed(id.to_string(), format!("missing {name}")))
        };
        Ok(QueueEntry {
            job_id: field(FIELD_JOB_ID)?,
            parser: field(FIELD_PARSER)?,
            source_location: field(FIELD_SOURCE)?,
        })
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn append(&self, entry: &QueueEntry) -> Result<EntryId, QueueError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(
                &self.stream,
                "*",
                &[
                    (FIELD_JOB_ID, entry.job_id.as_str()),
                    (FIELD_PARSER, entry.parser.as_str()),
                    (FIELD_SOURCE, entry.source_location.as_str()),
                ],
            )
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(EntryId(id))
    }

    async fn claim(
        &self,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let options = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(1)
            .block(block.as_millis() as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let first = reply
            .keys
            .into_iter()
            .next()
            .and_then(|key| key.ids.into_iter().next());
        let Some(stream_id) = first else {
            return Ok(None);
        };

        let entry = self.parse_entry(&stream_id.id, &stream_id)?;
        Ok(Some(Delivery {
            id: EntryId(stream_id.id),
            entry,
            attempts: 1,
        }))
    }

    async fn ack(&self, id: &EntryId) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _acked: u64 = conn
            .xack(&self.stream, &self.group, &[&id.0])
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn reclaim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        limit: usize,
    ) -> Result<Vec<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, "-", "+", limit)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let mut attempts_by_id: HashMap<String, u64> = HashMap::new();
        let stale_ids: Vec<String> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| {
                attempts_by_id.insert(p.id.clone(), p.times_delivered as u64);
                p.id.clone()
            })
            .collect();
        if stale_ids.is_empty() {
            return Ok(Vec::new());
        }

        // XCLAIM's own min-idle guard re-checks under the server's clock, so
        // an entry acked or re-claimed since XPENDING is skipped here.
        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.stream,
                &self.group,
                consumer,
                min_idle_ms as usize,
                &stale_ids,
            )
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let mut deliveries = Vec::with_capacity(claimed.ids.len());
        for stream_id in claimed.ids {
            let entry = match self.parse_entry(&stream_id.id, &stream_id) {
                Ok(entry) => entry,
                Err(e) => {
                    // A trimmed/deleted stream entry claims with no payload.
                    warn!(entry_id = %stream_id.id, error = %e, "skipping unreadable reclaimed entry");
                    continue;
                }
            };
            let attempts = attempts_by_id
                .get(&stream_id.id)
                .copied()
                .unwrap_or(1)
                .saturating_add(1);
            deliveries.push(Delivery {
                id: EntryId(stream_id.id),
                entry,
                attempts,
            });
        }
        Ok(deliveries)
    }

    async fn ownership(&self, limit: usize) -> Result<Vec<OwnershipRecord>, QueueError> {
        let mut conn = self.conn.clone();
        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, "-", "+", limit)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let now = now_ms();
        Ok(pending
            .ids
            .into_iter()
            .map(|p| OwnershipRecord {
                entry_id: EntryId(p.id),
                consumer_id: p.consumer,
                claimed_at_ms: now - p.last_delivered_ms as i64,
                delivery_attempts: p.times_delivered as u64,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))
    }

    async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
        let mut conn = self.conn.clone();
        let stream_len: u64 = conn
            .xlen(&self.stream)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        // XPENDING summary reply: [count, min-id, max-id, consumers].
        let summary: redis::Value = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let pending_entries = match &summary {
            redis::Value::Array(items) => items
                .first()
                .and_then(|v| redis::from_redis_value::<i64>(v).ok())
                .unwrap_or(0) as u64,
            _ => 0,
        };

        Ok(QueueMetrics {
            stream: self.stream.clone(),
            group: self.group.clone(),
            stream_len,
            pending_entries,
        })
    }
}

impl Clone for RedisQueue {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            stream: self.stream.clone(),
            group: self.group.clone(),
        }
    }
}
