//! Application settings, environment-driven.
//!
//! `.env` loading happens in `main` via dotenvy before `from_env` runs,
//! so both plain environment variables and an `.env` file work. Malformed
//! numeric values are a startup error, never a silent default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Queue + job store endpoint.
    pub redis_url: String,
    /// Queue stream key.
    pub stream_name: String,
    /// Consumer group name.
    pub stream_group: String,
    /// Summarizer / AI parser credential. Unset disables both.
    pub gemini_api_key: Option<String>,
    pub gemini_model_id: String,
    /// Deadline for a single external model call.
    pub gemini_timeout: Duration,
    /// Upload size ceiling in megabytes.
    pub max_upload_mb: u64,
    /// TTL applied to a job record when it turns terminal.
    pub job_ttl: Duration,
    /// Claim age after which an unacked entry becomes reclaim-eligible.
    pub visibility_timeout: Duration,
    /// Deliveries after which an entry is force-finalized as a job error.
    pub max_delivery_attempts: u64,
    /// How long a queue claim blocks waiting for new entries.
    pub claim_block: Duration,
    /// Directory uploaded documents are spooled into.
    pub spool_dir: PathBuf,
    /// Retain spool files after the terminal write (debugging).
    pub keep_tmp_files: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            stream_name: "docmill_jobs".to_string(),
            stream_group: "docmill_workers".to_string(),
            gemini_api_key: None,
            gemini_model_id: "gemini-2.0-flash".to_string(),
            gemini_timeout: Duration::from_secs(120),
            max_upload_mb: 25,
            job_ttl: Duration::from_secs(86_400),
            visibility_timeout: Duration::from_secs(90),
            max_delivery_attempts: 5,
            claim_block: Duration::from_secs(5),
            spool_dir: env::temp_dir().join("docmill"),
            keep_tmp_files: false,
        }
    }
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            redis_url: env_string("REDIS_URL", &defaults.redis_url),
            stream_name: env_string("STREAM_NAME", &defaults.stream_name),
            stream_group: env_string("STREAM_GROUP", &defaults.stream_group),
            gemini_api_key: env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            gemini_model_id: env_string("GEMINI_MODEL_ID", &defaults.gemini_model_id),
            gemini_timeout: Duration::from_secs(env_parse(
                "GEMINI_TIMEOUT_SECONDS",
                defaults.gemini_timeout.as_secs(),
            )?),
            max_upload_mb: env_parse("MAX_UPLOAD_MB", defaults.max_upload_mb)?,
            job_ttl: Duration::from_secs(env_parse(
                "JOB_TTL_SECONDS",
                defaults.job_ttl.as_secs(),
            )?),
            visibility_timeout: Duration::from_secs(env_parse(
                "VISIBILITY_TIMEOUT_SECONDS",
                defaults.visibility_timeout.as_secs(),
            )?),
            max_delivery_attempts: env_parse(
                "MAX_DELIVERY_ATTEMPTS",
                defaults.max_delivery_attempts,
            )?,
            claim_block: Duration::from_secs(env_parse(
                "CLAIM_BLOCK_SECONDS",
                defaults.claim_block.as_secs(),
            )?),
            spool_dir: env::var("SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.spool_dir),
            keep_tmp_files: env_flag("KEEP_TMP_FILES"),
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    /// Whether the external model credential is configured.
    pub fn summarizer_available(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).ok().unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}
