//! HTTP request handlers for the API server.

mod jobs;
mod ops;
mod orchestration;

pub use jobs::{result, status, upload};
pub use ops::{health, stats};
pub use orchestration::{compare, upload_batch};

use axum::extract::multipart::{Field, Multipart};

use super::ApiError;

/// One uploaded file pulled out of a multipart field.
pub(crate) struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub(crate) async fn read_file_field(field: Field<'_>) -> Result<UploadedFile, ApiError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::Validation(format!("could not read uploaded file: {e}")))?;
    Ok(UploadedFile {
        filename,
        bytes: bytes.to_vec(),
    })
}

pub(crate) async fn read_text_field(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("could not read form field: {e}")))
}

pub(crate) async fn next_field<'a>(
    multipart: &'a mut Multipart,
) -> Result<Option<Field<'a>>, ApiError> {
    multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart request: {e}")))
}
