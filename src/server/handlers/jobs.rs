//! Upload, status, and result endpoints.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{JobStatus, PageContent};
use crate::server::{ApiError, AppState};

use super::{next_field, read_file_field, read_text_field, UploadedFile};

const DEFAULT_PARSER: &str = "simple";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub message: String,
}

/// POST /api/v1/upload - accept a document for asynchronous processing.
///
/// Multipart fields: `file` (required), `parser` (optional tag, defaults
/// to the local strategy). Returns the job id immediately.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<UploadedFile> = None;
    let mut parser = DEFAULT_PARSER.to_string();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => file = Some(read_file_field(field).await?),
            "parser" => parser = read_text_field(field).await?,
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("no file provided".to_string()))?;
    let job_id = state
        .gateway
        .submit(&file.bytes, &parser, &file.filename)
        .await?;

    Ok(Json(UploadResponse {
        message: format!("File uploaded successfully. Job ID: {job_id}"),
        job_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub parser: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /api/v1/status/:job_id - pure store read, never blocks on the
/// queue or external services.
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let record = state
        .store
        .fetch(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(job_id.clone()))?;

    Ok(Json(StatusResponse {
        job_id: record.job_id,
        status: record.status,
        parser: record.parser,
        filename: record.filename,
        page_count: record.page_count,
        error_message: record.error_message,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub job_id: String,
    pub parser: String,
    pub page_count: u32,
    pub summary_md: String,
    pub per_page_markdown: Vec<PageContent>,
}

/// GET /api/v1/result/:job_id - populated content once the job is done;
/// 202 while pending/processing, 422 with the stored message on error.
pub async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let record = state
        .store
        .fetch(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(job_id.clone()))?;

    match record.status {
        JobStatus::Error => Err(ApiError::JobFailed {
            job_id: record.job_id,
            message: record
                .error_message
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
        JobStatus::Pending | JobStatus::Processing => Err(ApiError::NotReady {
            job_id: record.job_id,
            status: record.status.to_string(),
        }),
        JobStatus::Done => {
            let per_page_markdown = record.per_page_markdown.unwrap_or_default();
            Ok(Json(ResultResponse {
                job_id: record.job_id,
                parser: record.parser,
                page_count: record.page_count.unwrap_or(per_page_markdown.len() as u32),
                summary_md: record.summary_md.unwrap_or_default(),
                per_page_markdown,
            }))
        }
    }
}
