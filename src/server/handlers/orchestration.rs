//! Batch upload and parser comparison endpoints.

use axum::extract::{Multipart, State};
use axum::Json;

use crate::orchestrate::{self, BatchOutcome, CompareOutcome, UploadFile};
use crate::server::{ApiError, AppState};

use super::{next_field, read_file_field, read_text_field, UploadedFile};

/// POST /api/v1/upload/batch - N independent submissions, one parser tag.
///
/// Multipart fields: repeated `files`, one `parser`. Per-file failures
/// come back inline; accepted files are never rolled back.
pub async fn upload_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchOutcome>, ApiError> {
    let mut files: Vec<UploadFile> = Vec::new();
    let mut parser = "simple".to_string();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let UploadedFile { filename, bytes } = read_file_field(field).await?;
                files.push(UploadFile { filename, bytes });
            }
            "parser" => parser = read_text_field(field).await?,
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::Validation("no files provided".to_string()));
    }

    let outcome = orchestrate::upload_batch(&state.gateway, files, &parser).await;
    Ok(Json(outcome))
}

/// POST /api/v1/compare - run one document through several strategies.
///
/// Multipart fields: `file`, plus `parsers` as a comma-separated list or
/// repeated fields. Requires at least two distinct parsers.
pub async fn compare(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CompareOutcome>, ApiError> {
    let mut file: Option<UploadedFile> = None;
    let mut parsers: Vec<String> = Vec::new();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => file = Some(read_file_field(field).await?),
            "parsers" => {
                let raw = read_text_field(field).await?;
                parsers.extend(
                    raw.split(',')
                        .map(|tag| tag.trim().to_string())
                        .filter(|tag| !tag.is_empty()),
                );
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("no file provided".to_string()))?;
    let outcome = orchestrate::compare(
        &state.gateway,
        &state.store,
        &file.bytes,
        &file.filename,
        &parsers,
        &state.poll,
    )
    .await?;
    Ok(Json(outcome))
}
