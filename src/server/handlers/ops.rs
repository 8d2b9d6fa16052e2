//! Health and statistics endpoints.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::queue::QueueMetrics;
use crate::server::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue_connected: bool,
    pub summarizer_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// GET /health - subsystem flags are reported independently so a
/// summarizer outage does not mask queue health.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_connected = state.queue.ping().await.is_ok();
    let summarizer_available = state.settings.summarizer_available();

    Json(HealthResponse {
        status: if queue_connected { "healthy" } else { "unhealthy" },
        queue_connected,
        summarizer_available,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct ConfigEcho {
    pub max_upload_mb: u64,
    pub job_ttl_seconds: u64,
    pub visibility_timeout_seconds: u64,
    pub max_delivery_attempts: u64,
    pub stream_name: String,
    pub stream_group: String,
    pub summarizer_model: String,
    pub summarizer_available: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_jobs: u64,
    pub jobs_by_status: HashMap<String, u64>,
    pub queue_metrics: QueueMetrics,
    pub config: ConfigEcho,
}

/// GET /api/v1/stats - operational snapshot of the store and the queue.
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let total_jobs = state.store.total_jobs().await?;
    let jobs_by_status = state
        .store
        .status_counts()
        .await?
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();
    let queue_metrics = state.queue.metrics().await?;

    let settings = &state.settings;
    Ok(Json(StatsResponse {
        total_jobs,
        jobs_by_status,
        queue_metrics,
        config: ConfigEcho {
            max_upload_mb: settings.max_upload_mb,
            job_ttl_seconds: settings.job_ttl.as_secs(),
            visibility_timeout_seconds: settings.visibility_timeout.as_secs(),
            max_delivery_attempts: settings.max_delivery_attempts,
            stream_name: settings.stream_name.clone(),
            stream_group: settings.stream_group.clone(),
            summarizer_model: settings.gemini_model_id.clone(),
            summarizer_available: settings.summarizer_available(),
        },
    }))
}
