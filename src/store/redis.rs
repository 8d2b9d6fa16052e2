//! Redis-backed job store.
//!
//! One hash per job under `docmill:job:{id}`. Status transitions go
//! through Lua scripts so the status check and the write are a single
//! atomic step under concurrent workers; the per-page payload is stored
//! as a JSON field inside the hash and the TTL rides on the key itself.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::model::{JobOutcome, JobRecord, JobStatus, PageContent};

use super::{JobStore, StoreError};

/// Key prefix for job hashes.
const KEY_PREFIX: &str = "docmill:job:";

/// CAS insert: refuses to clobber an existing record.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
for i = 1, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;

/// CAS transition to processing; fenced against terminal records.
const MARK_PROCESSING_SCRIPT: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if status == false or status == 'done' or status == 'error' then
    return 0
end
redis.call('HSET', KEYS[1], 'status', 'processing', 'updated_at', ARGV[1])
return 1
"#;

/// Atomic terminal write; fenced against already-terminal records.
/// ARGV[1] is the TTL in seconds, the rest are field/value pairs.
const FINALIZE_SCRIPT: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if status == false or status == 'done' or status == 'error' then
    return 0
end
for i = 2, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
local ttl = tonumber(ARGV[1])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
"#;

/// Redis job record store.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    fn job_key(job_id: &str) -> String {
        format!("{KEY_PREFIX}{job_id}")
    }

    fn parse_record(job_id: &str, fields: HashMap<String, String>) -> Result<JobRecord, StoreError> {
        let corrupt = |what: &str| StoreError::Corrupt(job_id.to_string(), what.to_string());

        let status_raw = fields.get("status").ok_or_else(|| corrupt("missing status"))?;
        let status = JobStatus::from_str(status_raw)
            .ok_or_else(|| corrupt(&format!("unknown status {status_raw}")))?;

        let timestamp = |name: &str| -> Result<DateTime<Utc>, StoreError> {
            let raw = fields.get(name).ok_or_else(|| corrupt(&format!("missing {name}")))?;
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| corrupt(&format!("bad timestamp {name}")))
        };
        let opt_timestamp = |name: &str| -> Option<DateTime<Utc>> {
            fields
                .get(name)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        let per_page_markdown = match fields.get("per_page_json") {
            Some(raw) => Some(
                serde_json::from_str::<Vec<PageContent>>(raw)
                    .map_err(|e| corrupt(&format!("bad per_page_json: {e}")))?,
            ),
            None => None,
        };

        Ok(JobRecord {
            job_id: job_id.to_string(),
            status,
            parser: fields.get("parser").cloned().unwrap_or_default(),
            filename: fields.get("filename").cloned().unwrap_or_default(),
            source_location: fields.get("source_location").cloned().unwrap_or_default(),
            created_at: timestamp("created_at")?,
            updated_at: timestamp("updated_at")?,
            page_count: fields.get("page_count").and_then(|s| s.parse().ok()),
            summary_md: fields.get("summary_md").cloned(),
            per_page_markdown,
            error_message: fields.get("error_message").cloned(),
            ttl_expires_at: opt_timestamp("ttl_expires_at"),
        })
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(CREATE_SCRIPT);
        let created: i64 = script
            .key(Self::job_key(&record.job_id))
            .arg("job_id")
            .arg(&record.job_id)
            .arg("status")
            .arg(record.status.as_str())
            .arg("parser")
            .arg(&record.parser)
            .arg("filename")
            .arg(&record.filename)
            .arg("source_location")
            .arg(&record.source_location)
            .arg("created_at")
            .arg(record.created_at.to_rfc3339())
            .arg("updated_at")
            .arg(record.updated_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if created == 0 {
            return Err(StoreError::Duplicate(record.job_id.clone()));
        }
        Ok(())
    }

    async fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(Self::job_key(job_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if fields.is_empty() {
            return Ok(None);
        }
        Self::parse_record(job_id, fields).map(Some)
    }

    async fn mark_processing(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(MARK_PROCESSING_SCRIPT);
        let transitioned: i64 = script
            .key(Self::job_key(job_id))
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(transitioned == 1)
    }

    async fn finalize(
        &self,
        job_id: &str,
        outcome: &JobOutcome,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_default();

        let script = Script::new(FINALIZE_SCRIPT);
        let mut invocation = script.key(Self::job_key(job_id));
        invocation
            .arg(ttl.as_secs())
            .arg("status")
            .arg(outcome.status().as_str())
            .arg("updated_at")
            .arg(now.to_rfc3339())
            .arg("ttl_expires_at")
            .arg(expires_at.to_rfc3339());

        match outcome {
            JobOutcome::Done { pages, summary_md } => {
                let per_page_json = serde_json::to_string(pages)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                invocation
                    .arg("page_count")
                    .arg(pages.len() as u64)
                    .arg("summary_md")
                    .arg(summary_md)
                    .arg("per_page_json")
                    .arg(per_page_json);
            }
            JobOutcome::Error { message } => {
                invocation.arg("error_message").arg(message);
            }
        }

        let wrote: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(wrote == 1)
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::job_key(job_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn status_counts(&self) -> Result<HashMap<JobStatus, u64>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{KEY_PREFIX}*"))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut counts = HashMap::new();
        for key in keys {
            let status: Option<String> = conn
                .hget(&key, "status")
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if let Some(status) = status.as_deref().and_then(JobStatus::from_str) {
                *counts.entry(status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn total_jobs(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{KEY_PREFIX}*"))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(keys.len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}
